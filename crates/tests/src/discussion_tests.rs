use bson::{doc, oid::ObjectId};
use serde_json::Value;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn creating_a_discussion_includes_the_creator() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("creator").await;

    // Any team member can start a discussion, not just the leader
    let json: Value = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "name": "Side Project" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["name"], "Side Project");
    assert_eq!(json["slug"], "side-project");
    assert_eq!(json["created_user_id"], crew.member.id);
    assert_eq!(json["member_ids"], serde_json::json!([crew.member.id]));
    assert_eq!(json["notification_type"], "default");
}

#[tokio::test]
async fn discussion_members_must_belong_to_the_team() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("strict").await;
    let outsider = app.seed_user("outsider@example.test").await;

    let resp = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({
            "name": "Leaky",
            "member_ids": [outsider.id],
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn listing_shows_only_my_discussions() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("filtered").await;

    let resp = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "name": "Leadership" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let listed: Vec<Value> = app
        .auth_get(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let names: Vec<&str> = listed.iter().filter_map(|d| d["name"].as_str()).collect();
    assert_eq!(names, vec!["general"]);

    let listed: Vec<Value> = app
        .auth_get(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.leader.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.len(), 2);
}

#[tokio::test]
async fn slugs_are_unique_per_team_only() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("slugs").await;

    let mut slugs = Vec::new();
    for _ in 0..2 {
        let json: Value = app
            .auth_post(
                &format!("/api/team/{}/discussion", crew.team_id),
                &crew.leader.access_token,
            )
            .json(&serde_json::json!({ "name": "Weekly Sync" }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        slugs.push(json["slug"].as_str().unwrap().to_string());
    }
    assert_eq!(slugs, vec!["weekly-sync", "weekly-sync-1"]);

    // The same name in another team starts from the unsuffixed slug
    let other_team: Value = app
        .auth_post("/api/team", &crew.leader.access_token)
        .json(&serde_json::json!({ "name": "Other" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let json: Value = app
        .auth_post(
            &format!("/api/team/{}/discussion", other_team["id"].as_str().unwrap()),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "name": "Weekly Sync" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["slug"], "weekly-sync");
}

#[tokio::test]
async fn renames_keep_the_slug() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("renamed").await;

    let json: Value = app
        .auth_put(
            &format!("/api/team/{}/discussion/{}", crew.team_id, crew.discussion_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "name": "General Chatter" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["name"], "General Chatter");
    assert_eq!(json["slug"], crew.discussion_slug);
}

#[tokio::test]
async fn member_updates_replace_the_list_but_keep_the_editor() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("edited").await;

    let json: Value = app
        .auth_put(
            &format!("/api/team/{}/discussion/{}", crew.team_id, crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "member_ids": [] }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["member_ids"], serde_json::json!([crew.member.id]));
}

#[tokio::test]
async fn any_member_can_delete_and_posts_go_with_it() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("swept").await;
    let discussion_oid = ObjectId::parse_str(&crew.discussion_id).unwrap();

    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "content": "parting words" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let resp = app
        .auth_delete(
            &format!("/api/team/{}/discussion/{}", crew.team_id, crew.discussion_id),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let posts = app
        .db
        .collection::<bson::Document>("posts")
        .count_documents(doc! { "discussion_id": discussion_oid })
        .await
        .unwrap();
    assert_eq!(posts, 0);
}

#[tokio::test]
async fn reads_are_gated_by_discussion_membership() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("private").await;

    // Leader-only discussion: on the team is not enough to read it
    let private: Value = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "name": "Leadership" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let private_id = private["id"].as_str().unwrap();

    let resp = app
        .auth_get(
            &format!("/api/team/{}/discussion/{}", crew.team_id, private_id),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_get(
            &format!("/api/team/{}/discussion/slug/{}", crew.team_id, "leadership"),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let json: Value = app
        .auth_get(
            &format!(
                "/api/team/{}/discussion/slug/{}",
                crew.team_id, crew.discussion_slug
            ),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["id"], crew.discussion_id.as_str());
}

#[tokio::test]
async fn notification_type_round_trips() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("notified").await;

    let json: Value = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({
            "name": "Announcements",
            "notification_type": "email",
        }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["notification_type"], "email");

    let json: Value = app
        .auth_put(
            &format!(
                "/api/team/{}/discussion/{}",
                crew.team_id,
                json["id"].as_str().unwrap()
            ),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "notification_type": "default" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["notification_type"], "default");
}
