use bson::{doc, oid::ObjectId};
use serde_json::Value;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::seed::SeededCrew;

fn stripe_signature(secret: &str, timestamp: &str, payload: &[u8]) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{timestamp}.{}", String::from_utf8_lossy(payload)).as_bytes());
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

async fn post_webhook(app: &TestApp, secret: &str, event: &Value) -> reqwest::Response {
    let body = event.to_string();
    let header = stripe_signature(secret, "1700000000", body.as_bytes());
    app.client
        .post(app.url("/stripe/webhook"))
        .header("stripe-signature", header)
        .body(body)
        .send()
        .await
        .expect("Webhook request failed")
}

/// Puts a subscription snapshot on the team, as a completed checkout would.
async fn prime_subscription(app: &TestApp, crew: &SeededCrew, active: bool, failed: bool) {
    app.db
        .collection::<bson::Document>("teams")
        .update_one(
            doc! { "_id": ObjectId::parse_str(&crew.team_id).unwrap() },
            doc! { "$set": {
                "is_subscription_active": active,
                "is_payment_failed": failed,
                "stripe_subscription": {
                    "id": "sub_test_1",
                    "status": "active",
                    "current_period_end": 1700000000_i64,
                    "canceled_at": bson::Bson::Null,
                },
            } },
        )
        .await
        .unwrap();
}

async fn team_doc(app: &TestApp, crew: &SeededCrew) -> bson::Document {
    app.db
        .collection::<bson::Document>("teams")
        .find_one(doc! { "_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap()
        .expect("Team missing")
}

#[tokio::test]
async fn the_webhook_rejects_missing_and_bad_signatures() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .post(app.url("/stripe/webhook"))
        .body(r#"{"type":"ping","data":{"object":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);

    let resp = app
        .client
        .post(app.url("/stripe/webhook"))
        .header("stripe-signature", "t=1700000000,v1=deadbeef")
        .body(r#"{"type":"ping","data":{"object":{}}}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn a_signed_event_of_an_unhandled_type_is_acknowledged() {
    let app = TestApp::spawn().await;

    let resp = post_webhook(
        &app,
        "whsec_test",
        &serde_json::json!({ "type": "charge.succeeded", "data": { "object": {} } }),
    )
    .await;

    assert!(resp.status().is_success());
    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["received"], true);
}

#[tokio::test]
async fn the_webhook_secret_comes_from_settings() {
    let app = TestApp::spawn_with_settings(|settings| {
        settings.stripe.webhook_secret = "whsec_other".to_string();
    })
    .await;
    let event = serde_json::json!({ "type": "charge.succeeded", "data": { "object": {} } });

    let resp = post_webhook(&app, "whsec_test", &event).await;
    assert_eq!(resp.status().as_u16(), 401);

    let resp = post_webhook(&app, "whsec_other", &event).await;
    assert!(resp.status().is_success());
}

#[tokio::test]
async fn subscription_updates_sync_the_snapshot() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("synced").await;
    prime_subscription(&app, &crew, true, false).await;

    let resp = post_webhook(
        &app,
        "whsec_test",
        &serde_json::json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "id": "sub_test_1",
                "status": "past_due",
                "current_period_end": 1800000000_i64,
            } },
        }),
    )
    .await;
    assert!(resp.status().is_success());

    let team = team_doc(&app, &crew).await;
    let sub = team.get_document("stripe_subscription").unwrap();
    assert_eq!(sub.get_str("status").unwrap(), "past_due");
    assert_eq!(sub.get_i64("current_period_end").unwrap(), 1800000000);
}

#[tokio::test]
async fn a_deleted_subscription_deactivates_the_team() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("lapsed").await;
    prime_subscription(&app, &crew, true, false).await;

    let resp = post_webhook(
        &app,
        "whsec_test",
        &serde_json::json!({
            "type": "customer.subscription.deleted",
            "data": { "object": { "id": "sub_test_1", "canceled_at": 1750000000_i64 } },
        }),
    )
    .await;
    assert!(resp.status().is_success());

    let team = team_doc(&app, &crew).await;
    assert_eq!(team.get_bool("is_subscription_active").unwrap(), false);
    let sub = team.get_document("stripe_subscription").unwrap();
    assert_eq!(sub.get_str("status").unwrap(), "canceled");
    assert_eq!(sub.get_i64("canceled_at").unwrap(), 1750000000);
}

#[tokio::test]
async fn payment_failure_redelivery_is_ignored() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("resilient").await;
    // Already handled once: payment marked failed, subscription inactive
    prime_subscription(&app, &crew, false, true).await;

    let resp = post_webhook(
        &app,
        "whsec_test",
        &serde_json::json!({
            "type": "invoice.payment_failed",
            "data": { "object": { "subscription": "sub_test_1" } },
        }),
    )
    .await;
    assert!(resp.status().is_success());

    let team = team_doc(&app, &crew).await;
    assert_eq!(team.get_bool("is_subscription_active").unwrap(), false);
    assert_eq!(team.get_bool("is_payment_failed").unwrap(), true);
}

#[tokio::test]
async fn payment_failure_for_an_unknown_subscription_is_acknowledged() {
    let app = TestApp::spawn().await;

    let resp = post_webhook(
        &app,
        "whsec_test",
        &serde_json::json!({
            "type": "invoice.payment_failed",
            "data": { "object": { "subscription": "sub_nobody" } },
        }),
    )
    .await;

    assert!(resp.status().is_success());
}

#[tokio::test]
async fn checkout_and_cancellation_are_leader_only() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("billed").await;

    for path in [
        "/api/stripe/checkout/subscription",
        "/api/stripe/checkout/setup",
        "/api/stripe/subscription/cancel",
    ] {
        let resp = app
            .auth_post(path, &crew.member.access_token)
            .json(&serde_json::json!({ "team_id": crew.team_id }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status().as_u16(), 403, "{} not leader-gated", path);
    }
}

#[tokio::test]
async fn cancelling_without_a_subscription_is_a_bad_request() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("unsubscribed").await;

    let resp = app
        .auth_post("/api/stripe/subscription/cancel", &crew.leader.access_token)
        .json(&serde_json::json!({ "team_id": crew.team_id }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 400);
}

#[tokio::test]
async fn invoices_are_leader_only_and_empty_without_a_customer() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("invoiced").await;
    let path = format!("/api/stripe/invoices?team_id={}", crew.team_id);

    let resp = app
        .auth_get(&path, &crew.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let invoices: Vec<Value> = app
        .auth_get(&path, &crew.leader.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(invoices.is_empty());
}
