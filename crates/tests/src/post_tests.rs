use serde_json::Value;
use std::time::Duration;

use crate::fixtures::test_app::TestApp;

#[tokio::test]
async fn posting_renders_markdown() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("writer").await;

    let json: Value = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "content": "Hello **world**" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["content"], "Hello **world**");
    assert!(
        json["html_content"]
            .as_str()
            .unwrap()
            .contains("<strong>world</strong>"),
        "Markdown not rendered: {}",
        json["html_content"]
    );
    assert_eq!(json["is_edited"], false);
    assert_eq!(json["created_user_id"], crew.member.id);
}

#[tokio::test]
async fn empty_posts_are_rejected() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("empty").await;

    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "content": "   " }))
        .send()
        .await
        .unwrap();

    assert_eq!(resp.status().as_u16(), 422);
}

#[tokio::test]
async fn editing_stamps_the_post() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("editor").await;

    let created: Value = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "content": "draft" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let json: Value = app
        .auth_put(
            &format!(
                "/api/discussion/{}/post/{}",
                crew.discussion_id,
                created["id"].as_str().unwrap()
            ),
            &crew.member.access_token,
        )
        .json(&serde_json::json!({ "content": "*final*" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["content"], "*final*");
    assert!(json["html_content"].as_str().unwrap().contains("<em>final</em>"));
    assert_eq!(json["is_edited"], true);
}

#[tokio::test]
async fn only_the_author_can_edit_or_delete() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("owned").await;

    let created: Value = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.leader.access_token,
        )
        .json(&serde_json::json!({ "content": "mine" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let path = format!(
        "/api/discussion/{}/post/{}",
        crew.discussion_id,
        created["id"].as_str().unwrap()
    );

    let resp = app
        .auth_put(&path, &crew.member.access_token)
        .json(&serde_json::json!({ "content": "not yours" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_delete(&path, &crew.member.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_delete(&path, &crew.leader.access_token)
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let listed: Value = app
        .auth_get(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.leader.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed["total"], 0);
}

#[tokio::test]
async fn pagination_walks_in_chronological_order() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("paged").await;

    for i in 0..12 {
        let resp = app
            .auth_post(
                &format!("/api/discussion/{}/post", crew.discussion_id),
                &crew.member.access_token,
            )
            .json(&serde_json::json!({ "content": format!("post-{}", i) }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());
        // created_at has millisecond resolution; space the writes so the
        // order is well-defined
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let page: Value = app
        .auth_get(
            &format!(
                "/api/discussion/{}/post?page=1&per_page=5",
                crew.discussion_id
            ),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 12);
    assert_eq!(page["per_page"], 5);
    assert_eq!(page["total_pages"], 3);
    assert_eq!(page["items"].as_array().unwrap().len(), 5);
    // Oldest first
    assert_eq!(page["items"][0]["content"], "post-0");

    let page: Value = app
        .auth_get(
            &format!(
                "/api/discussion/{}/post?page=3&per_page=5",
                crew.discussion_id
            ),
            &crew.member.access_token,
        )
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["items"].as_array().unwrap().len(), 2);
    assert_eq!(page["items"][0]["content"], "post-10");
}

#[tokio::test]
async fn outsiders_cannot_read_or_post() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("sealed").await;
    let outsider = app.seed_user("outsider@example.test").await;
    let path = format!("/api/discussion/{}/post", crew.discussion_id);

    let resp = app
        .auth_get(&path, &outsider.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);

    let resp = app
        .auth_post(&path, &outsider.access_token)
        .json(&serde_json::json!({ "content": "knock knock" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 403);
}
