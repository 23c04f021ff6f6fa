use bson::{DateTime, doc, oid::ObjectId};
use serde_json::Value;

use crate::fixtures::test_app::TestApp;

async fn invite(app: &TestApp, team_id: &str, token: &str, email: &str) -> reqwest::Response {
    app.auth_post(&format!("/api/team/{}/invitation", team_id), token)
        .json(&serde_json::json!({ "email": email }))
        .send()
        .await
        .expect("Invitation request failed")
}

/// The token never appears in API responses, only in the emailed link;
/// tests read it straight from the collection.
async fn stored_token(app: &TestApp, team_id: &str) -> String {
    app.db
        .collection::<bson::Document>("invitations")
        .find_one(doc! { "team_id": ObjectId::parse_str(team_id).unwrap() })
        .await
        .unwrap()
        .expect("Invitation missing")
        .get_str("token")
        .unwrap()
        .to_string()
}

#[tokio::test]
async fn inviting_is_leader_only() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("closed").await;

    let resp = invite(
        &app,
        &crew.team_id,
        &crew.member.access_token,
        "friend@example.test",
    )
    .await;
    assert_eq!(resp.status().as_u16(), 403);
}

#[tokio::test]
async fn invalid_addresses_are_rejected() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("picky").await;

    let resp = invite(&app, &crew.team_id, &crew.leader.access_token, "not-an-email").await;
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn inviting_an_existing_member_is_rejected() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("redundant").await;

    let resp = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        &crew.member.email,
    )
    .await;
    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn repeat_invitations_reuse_the_token() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("patient").await;

    let first: Value = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "recruit@example.test",
    )
    .await
    .json()
    .await
    .unwrap();
    let first_token = stored_token(&app, &crew.team_id).await;

    let second: Value = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "recruit@example.test",
    )
    .await
    .json()
    .await
    .unwrap();

    assert_eq!(first["id"], second["id"]);
    assert_eq!(first_token, stored_token(&app, &crew.team_id).await);

    let count = app
        .db
        .collection::<bson::Document>("invitations")
        .count_documents(doc! { "team_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn the_leader_can_list_and_revoke() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("tidy").await;
    let path = format!("/api/team/{}/invitation", crew.team_id);

    let created: Value = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "recruit@example.test",
    )
    .await
    .json()
    .await
    .unwrap();

    let resp = app.auth_get(&path, &crew.member.access_token).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let listed: Vec<Value> = app
        .auth_get(&path, &crew.leader.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0]["email"], "recruit@example.test");

    let resp = app
        .auth_delete(
            &format!("{}/{}", path, created["id"].as_str().unwrap()),
            &crew.leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let listed: Vec<Value> = app
        .auth_get(&path, &crew.leader.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(listed.is_empty());
}

#[tokio::test]
async fn accepting_via_magic_link_joins_the_team() {
    let app = TestApp::spawn_no_redirect().await;
    let crew = app.seed_crew("welcoming").await;

    let resp = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "recruit@example.test",
    )
    .await;
    assert!(resp.status().is_success());
    let invitation_token = stored_token(&app, &crew.team_id).await;

    let (uid, token) = app
        .mint_login_link("recruit@example.test", Some(&invitation_token))
        .await;
    let resp = app
        .client
        .get(app.url(&format!("/auth/logged_in?token={}&uid={}", token, uid)))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_redirection());
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(location, format!("/team/{}", crew.team_slug));

    let team = app
        .db
        .collection::<bson::Document>("teams")
        .find_one(doc! { "_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap()
        .unwrap();
    let member_ids = team.get_array("member_ids").unwrap();
    assert!(member_ids.iter().any(|id| {
        id.as_object_id() == Some(ObjectId::parse_str(&uid).unwrap())
    }));

    // Consumed on acceptance
    let count = app
        .db
        .collection::<bson::Document>("invitations")
        .count_documents(doc! { "team_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap();
    assert_eq!(count, 0);

    // The joined team became the recruit's default
    let recruit = app.seed_user("recruit@example.test").await;
    let me: Value = app
        .auth_get("/api/me", &recruit.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["default_team_slug"], crew.team_slug.as_str());
}

#[tokio::test]
async fn the_invitation_is_bound_to_the_address() {
    let app = TestApp::spawn_no_redirect().await;
    let crew = app.seed_crew("vigilant").await;

    let resp = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "intended@example.test",
    )
    .await;
    assert!(resp.status().is_success());
    let invitation_token = stored_token(&app, &crew.team_id).await;

    // Someone else redeeming the link still signs in, but does not join
    let (uid, token) = app
        .mint_login_link("sneaky@example.test", Some(&invitation_token))
        .await;
    let resp = app
        .client
        .get(app.url(&format!("/auth/logged_in?token={}&uid={}", token, uid)))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_redirection());
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(location, "/onboarding");

    let team = app
        .db
        .collection::<bson::Document>("teams")
        .find_one(doc! { "_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.get_array("member_ids").unwrap().len(), 2);
}

/// The whole membership arc: invited, logged in, posting, removed.
#[tokio::test]
async fn a_recruit_joins_posts_and_is_later_removed() {
    let app = TestApp::spawn_no_redirect().await;
    let leader = app.seed_user("leader@acme.test").await;

    let team: Value = app
        .auth_post("/api/team", &leader.access_token)
        .json(&serde_json::json!({ "name": "Acme" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(team["slug"], "acme");
    let team_id = team["id"].as_str().unwrap().to_string();

    let discussion: Value = app
        .auth_post(&format!("/api/team/{}/discussion", team_id), &leader.access_token)
        .json(&serde_json::json!({ "name": "standup" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let discussion_id = discussion["id"].as_str().unwrap().to_string();

    let resp = invite(&app, &team_id, &leader.access_token, "bob@acme.test").await;
    assert!(resp.status().is_success());
    let invitation_token = stored_token(&app, &team_id).await;

    let (uid, token) = app
        .mint_login_link("bob@acme.test", Some(&invitation_token))
        .await;
    let resp = app
        .client
        .get(app.url(&format!("/auth/logged_in?token={}&uid={}", token, uid)))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_redirection());

    let bob = app.seed_user("bob@acme.test").await;
    let me: Value = app
        .auth_get("/api/me", &bob.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(me["default_team_slug"], "acme");

    let pending = app
        .db
        .collection::<bson::Document>("invitations")
        .count_documents(doc! { "team_id": ObjectId::parse_str(&team_id).unwrap() })
        .await
        .unwrap();
    assert_eq!(pending, 0);

    // Pull Bob into the discussion so he can post
    let resp = app
        .auth_put(
            &format!("/api/team/{}/discussion/{}", team_id, discussion_id),
            &leader.access_token,
        )
        .json(&serde_json::json!({ "member_ids": [bob.id] }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let post: Value = app
        .auth_post(
            &format!("/api/discussion/{}/post", discussion_id),
            &bob.access_token,
        )
        .json(&serde_json::json!({ "content": "First day, reporting in." }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(post["is_edited"], false);

    let resp = app
        .auth_delete(
            &format!("/api/team/{}/member/{}", team_id, bob.id),
            &leader.access_token,
        )
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    // Bob is out: team reads and discussion posts both refuse him
    let resp = app
        .auth_get(&format!("/api/team/{}", team_id), &bob.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", discussion_id),
            &bob.access_token,
        )
        .json(&serde_json::json!({ "content": "Hello?" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn expired_invitations_cannot_be_redeemed() {
    let app = TestApp::spawn_no_redirect().await;
    let crew = app.seed_crew("expired").await;

    let resp = invite(
        &app,
        &crew.team_id,
        &crew.leader.access_token,
        "late@example.test",
    )
    .await;
    assert!(resp.status().is_success());
    let invitation_token = stored_token(&app, &crew.team_id).await;

    app.db
        .collection::<bson::Document>("invitations")
        .update_one(
            doc! { "team_id": ObjectId::parse_str(&crew.team_id).unwrap() },
            doc! { "$set": { "expires_at": DateTime::from_millis(0) } },
        )
        .await
        .unwrap();

    let (uid, token) = app
        .mint_login_link("late@example.test", Some(&invitation_token))
        .await;
    let resp = app
        .client
        .get(app.url(&format!("/auth/logged_in?token={}&uid={}", token, uid)))
        .send()
        .await
        .unwrap();

    assert!(resp.status().is_redirection());
    let location = resp
        .headers()
        .get("location")
        .and_then(|v| v.to_str().ok())
        .unwrap();
    assert_eq!(location, "/onboarding");

    let team = app
        .db
        .collection::<bson::Document>("teams")
        .find_one(doc! { "_id": ObjectId::parse_str(&crew.team_id).unwrap() })
        .await
        .unwrap()
        .unwrap();
    assert_eq!(team.get_array("member_ids").unwrap().len(), 2);
}
