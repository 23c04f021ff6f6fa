use std::{sync::Arc, time::Duration};

use crewdeck_client::{ApiClient, ClientError, SocketClient, Store, UploadKind};
use crewdeck_db::models::NotificationType;
use serde_json::json;

use crate::fixtures::test_app::TestApp;
use crate::fixtures::ws;

async fn logged_in_client(app: &TestApp, email: &str) -> Arc<ApiClient> {
    let api = Arc::new(ApiClient::new(app.base_url.as_str(), Arc::new(Store::new())).unwrap());
    let (uid, token) = app.mint_login_link(email, None).await;
    api.login_with_link(&uid, &token).await.expect("Login failed");
    api
}

/// Polls the store until the condition holds; realtime convergence has
/// no completion signal to await.
async fn wait_for(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while tokio::time::Instant::now() < deadline {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("Timed out waiting for {what}");
}

#[tokio::test]
async fn logging_in_with_a_link_fills_the_profile() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "pat@client.test").await;

    let user = api.store().user().expect("Profile not mirrored");
    assert_eq!(user.email, "pat@client.test");
    assert_eq!(user.display_name, "pat");
    assert!(api.token().is_some());
}

#[tokio::test]
async fn a_bad_login_link_is_an_api_error() {
    let app = TestApp::spawn().await;
    let api = ApiClient::new(app.base_url.as_str(), Arc::new(Store::new())).unwrap();
    let (uid, _) = app.mint_login_link("mallory@client.test", None).await;

    let err = api
        .login_with_link(&uid, &"0".repeat(64))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 401, .. }));
}

#[tokio::test]
async fn mutations_mirror_into_the_store() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "owner@client.test").await;
    let store = api.store();

    let team = api.create_team("Mirror Makers", None).await.unwrap();
    assert_eq!(team.slug, "mirror-makers");
    assert_eq!(store.teams().len(), 1);

    let discussion = api
        .create_discussion(&team.id, "standup", &[], None)
        .await
        .unwrap();
    assert_eq!(store.discussions(&team.id).len(), 1);

    let post = api
        .create_post(&discussion.id, "alpha **beta**")
        .await
        .unwrap();
    assert!(post.html_content.contains("<strong>beta</strong>"));
    assert_eq!(store.posts(&discussion.id).len(), 1);

    let edited = api
        .update_post(&discussion.id, &post.id, "gamma")
        .await
        .unwrap();
    assert!(edited.is_edited);
    let mirrored = store.posts(&discussion.id);
    assert_eq!(mirrored.len(), 1);
    assert_eq!(mirrored[0].content, "gamma");

    api.delete_post(&discussion.id, &post.id).await.unwrap();
    assert!(store.posts(&discussion.id).is_empty());

    api.delete_team(&team.id).await.unwrap();
    assert!(store.teams().is_empty());
}

#[tokio::test]
async fn loads_hydrate_a_fresh_store() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("hydrated").await;
    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.leader.access_token,
        )
        .json(&json!({ "content": "welcome aboard" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());

    let api = logged_in_client(&app, &crew.member.email).await;
    let store = api.store();
    api.load_teams().await.unwrap();
    api.load_discussions(&crew.team_id).await.unwrap();
    api.load_posts(&crew.discussion_id).await.unwrap();

    assert_eq!(store.teams().len(), 1);
    assert_eq!(store.team(&crew.team_id).unwrap().slug, crew.team_slug);
    let discussions = store.discussions(&crew.team_id);
    assert_eq!(discussions.len(), 1);
    assert_eq!(discussions[0].name, "general");
    assert_eq!(
        store.discussion(&crew.discussion_id).unwrap().slug,
        crew.discussion_slug
    );
    let posts = store.posts(&crew.discussion_id);
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].content, "welcome aboard");
}

#[tokio::test]
async fn teammate_changes_converge_through_the_socket() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("converged").await;

    let api = logged_in_client(&app, &crew.leader.email).await;
    let store = api.store();
    api.load_teams().await.unwrap();
    api.load_discussions(&crew.team_id).await.unwrap();
    api.load_posts(&crew.discussion_id).await.unwrap();

    let socket = SocketClient::connect(format!("ws://{}/ws", app.addr), api.clone())
        .await
        .unwrap();
    socket.join_team_room(&crew.team_id);
    socket.join_discussion_room(&crew.discussion_id);
    // Joins carry no acknowledgement; give the server a moment
    tokio::time::sleep(Duration::from_millis(300)).await;

    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&json!({ "content": "from a teammate" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    wait_for("the teammate's post to arrive", || {
        store
            .posts(&crew.discussion_id)
            .iter()
            .any(|post| post.content == "from a teammate")
    })
    .await;

    let resp = app
        .auth_post(
            &format!("/api/team/{}/discussion", crew.team_id),
            &crew.member.access_token,
        )
        .json(&json!({ "name": "offsite", "member_ids": [crew.leader.id] }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    wait_for("the new discussion to arrive", || {
        store
            .discussions(&crew.team_id)
            .iter()
            .any(|discussion| discussion.name == "offsite")
    })
    .await;

    // After leaving the rooms the stream goes quiet
    socket.ping();
    socket.leave_discussion_room(&crew.discussion_id);
    socket.leave_team_room(&crew.team_id);
    tokio::time::sleep(Duration::from_millis(200)).await;

    let resp = app
        .auth_post(
            &format!("/api/discussion/{}/post", crew.discussion_id),
            &crew.member.access_token,
        )
        .json(&json!({ "content": "into the void" }))
        .send()
        .await
        .unwrap();
    assert!(resp.status().is_success());
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(
        !store
            .posts(&crew.discussion_id)
            .iter()
            .any(|post| post.content == "into the void")
    );

    socket.close();
}

#[tokio::test]
async fn own_mutations_apply_exactly_once() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("echoless").await;

    let api = logged_in_client(&app, &crew.leader.email).await;
    let store = api.store();
    api.load_teams().await.unwrap();
    api.load_discussions(&crew.team_id).await.unwrap();
    api.load_posts(&crew.discussion_id).await.unwrap();

    let socket = SocketClient::connect(format!("ws://{}/ws", app.addr), api.clone())
        .await
        .unwrap();
    socket.join_discussion_room(&crew.discussion_id);
    tokio::time::sleep(Duration::from_millis(300)).await;

    // A second socket in the room proves the event still fans out
    let (mut member_ws, _) = ws::connect(&app, &crew.member.access_token).await;
    ws::join_and_settle(
        &mut member_ws,
        json!({ "type": "joinDiscussionRoom", "data": { "discussion_id": crew.discussion_id } }),
    )
    .await;

    api.create_post(&crew.discussion_id, "just once").await.unwrap();
    assert_eq!(store.posts(&crew.discussion_id).len(), 1);

    let frame = ws::next_json(&mut member_ws).await;
    assert_eq!(frame["type"], "postEvent");
    assert_eq!(frame["data"]["entity"]["content"], "just once");

    // The fan-out has been observed; any echo would have landed by now
    tokio::time::sleep(Duration::from_millis(200)).await;
    let posts = store.posts(&crew.discussion_id);
    assert_eq!(posts.len(), 1);
    assert!(!posts[0].is_edited);

    socket.close();
}

#[tokio::test]
async fn the_leader_runs_the_team_through_the_client() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "boss@sdk.test").await;

    let team = api.create_team("Night Shift", None).await.unwrap();
    let team = api
        .update_team(&team.id, Some("Day Shift"), None, true)
        .await
        .unwrap();
    assert_eq!(team.name, "Day Shift");
    assert_eq!(team.slug, "day-shift");
    assert_eq!(api.store().team(&team.id).unwrap().name, "Day Shift");

    let by_slug = api.fetch_team_by_slug("day-shift").await.unwrap();
    assert_eq!(by_slug.id, team.id);
    assert_eq!(api.fetch_team(&team.id).await.unwrap().slug, "day-shift");

    let members = api.team_members(&team.id).await.unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0].email, "boss@sdk.test");

    let invitation = api
        .invite_member(&team.id, "recruit@sdk.test")
        .await
        .unwrap();
    assert_eq!(invitation.email, "recruit@sdk.test");
    assert_eq!(api.list_invitations(&team.id).await.unwrap().len(), 1);

    api.revoke_invitation(&team.id, &invitation.id).await.unwrap();
    assert!(api.list_invitations(&team.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn removing_a_member_updates_the_mirrored_roster() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("roster").await;

    let api = logged_in_client(&app, &crew.leader.email).await;
    api.load_teams().await.unwrap();

    let team = api
        .remove_member(&crew.team_id, &crew.member.id)
        .await
        .unwrap();
    assert!(!team.member_ids.contains(&crew.member.id));
    assert_eq!(
        api.store().team(&crew.team_id).unwrap().member_ids,
        vec![crew.leader.id.clone()]
    );
}

#[tokio::test]
async fn profile_edits_mirror_into_the_store() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "editor@sdk.test").await;

    let user = api
        .update_profile(Some("Editor in Chief"), None)
        .await
        .unwrap();
    assert_eq!(user.display_name, "Editor in Chief");
    assert_eq!(api.store().user().unwrap().display_name, "Editor in Chief");
}

#[tokio::test]
async fn discussions_run_their_course_through_the_client() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "host@sdk.test").await;
    let team = api.create_team("Research", None).await.unwrap();

    let discussion = api
        .create_discussion(&team.id, "ideas", &[], None)
        .await
        .unwrap();
    let updated = api
        .update_discussion(
            &team.id,
            &discussion.id,
            Some("plans"),
            None,
            Some(NotificationType::Email),
        )
        .await
        .unwrap();
    assert_eq!(updated.name, "plans");
    // A rename keeps the original slug
    assert_eq!(updated.slug, "ideas");
    assert_eq!(updated.notification_type, NotificationType::Email);

    let fetched = api.fetch_discussion(&team.id, &discussion.id).await.unwrap();
    assert_eq!(fetched.name, "plans");
    let by_slug = api
        .fetch_discussion_by_slug(&team.id, "ideas")
        .await
        .unwrap();
    assert_eq!(by_slug.id, discussion.id);

    api.delete_discussion(&team.id, &discussion.id).await.unwrap();
    assert!(api.store().discussions(&team.id).is_empty());
}

#[tokio::test]
async fn older_pages_merge_beneath_the_live_tail() {
    let app = TestApp::spawn().await;
    let writer = logged_in_client(&app, "chronicler@sdk.test").await;
    let team = writer.create_team("Archive", None).await.unwrap();
    let discussion = writer
        .create_discussion(&team.id, "log", &[], None)
        .await
        .unwrap();
    for i in 0..28 {
        writer
            .create_post(&discussion.id, &format!("note {i:02}"))
            .await
            .unwrap();
    }

    let reader = logged_in_client(&app, "chronicler@sdk.test").await;
    let store = reader.store();
    reader.load_teams().await.unwrap();
    reader.load_discussions(&team.id).await.unwrap();
    reader.load_posts(&discussion.id).await.unwrap();
    assert_eq!(store.posts(&discussion.id).len(), 25);

    let page = reader.load_more_posts(&discussion.id, 2).await.unwrap();
    assert_eq!(page.total, 28);
    assert_eq!(page.total_pages, 2);
    assert_eq!(page.items.len(), 3);

    let posts = store.posts(&discussion.id);
    assert_eq!(posts.len(), 28);
    assert_eq!(posts.first().unwrap().content, "note 00");
    assert_eq!(posts.last().unwrap().content, "note 27");
}

#[tokio::test]
async fn billing_denials_come_back_typed() {
    let app = TestApp::spawn().await;
    let crew = app.seed_crew("metered").await;

    let member = logged_in_client(&app, &crew.member.email).await;
    let err = member
        .start_subscription_checkout(&crew.team_id)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 403, .. }));
    let err = member.start_setup_checkout(&crew.team_id).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 403, .. }));

    let leader = logged_in_client(&app, &crew.leader.email).await;
    let err = leader.cancel_subscription(&crew.team_id).await.unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 400, .. }));
    assert!(leader.invoices(&crew.team_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn uploads_are_presigned_through_the_client() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "uploader@sdk.test").await;

    let upload = api
        .presign_upload(UploadKind::Avatar, "Profile Photo!.png")
        .await
        .unwrap();
    assert!(
        upload
            .upload_url
            .starts_with("http://localhost:9000/crewdeck-test-avatars/")
    );
    assert!(upload.upload_url.contains("X-Amz-Signature="));
    assert!(upload.asset_url.contains("bucket=crewdeck-test-avatars"));
    // Spaces and punctuation are dropped from the object key
    assert!(upload.asset_url.contains("ProfilePhoto.png"));
}

#[tokio::test]
async fn login_links_are_not_minted_for_garbage_addresses() {
    let app = TestApp::spawn().await;
    let api = ApiClient::new(app.base_url.as_str(), Arc::new(Store::new())).unwrap();

    api.request_login_link("fresh@sdk.test", None).await.unwrap();

    let err = api
        .request_login_link("not-an-address", None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Api { status: 422, .. }));
}

#[tokio::test]
async fn logging_out_clears_the_mirror() {
    let app = TestApp::spawn().await;
    let api = logged_in_client(&app, "brief@client.test").await;
    api.create_team("Fleeting", None).await.unwrap();
    assert_eq!(api.store().teams().len(), 1);

    api.logout().await.unwrap();
    assert!(api.token().is_none());
    assert!(api.store().user().is_none());
    assert!(api.store().teams().is_empty());
}
