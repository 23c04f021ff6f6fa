use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::{doc, oid::ObjectId};
use crewdeck_db::models::NotificationType;
use crewdeck_realtime::{ActionType, PostDto};
use crewdeck_services::dao::base::PaginationParams;
use serde::Deserialize;
use tracing::warn;

use super::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState, ws::dispatcher};

#[derive(Debug, Deserialize)]
pub struct CreatePostRequest {
    pub content: String,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdatePostRequest {
    pub content: String,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub socket_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(discussion_id): Path<String>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let discussion_id = parse_oid(&discussion_id, "discussion_id")?;
    let result = state
        .posts
        .find_in_discussion(discussion_id, auth.user_id, &params)
        .await?;

    let items: Vec<PostDto> = result.items.iter().map(PostDto::from).collect();
    Ok(Json(serde_json::json!({
        "items": items,
        "total": result.total,
        "page": result.page,
        "per_page": result.per_page,
        "total_pages": result.total_pages,
    })))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(discussion_id): Path<String>,
    Json(body): Json<CreatePostRequest>,
) -> Result<Json<PostDto>, ApiError> {
    let discussion_id = parse_oid(&discussion_id, "discussion_id")?;
    let post = state
        .posts
        .create(discussion_id, auth.user_id, body.content)
        .await?;

    dispatcher::emit_post(&state, ActionType::Added, &post, body.socket_id.as_deref()).await;

    // Notifications are best-effort; the post stands either way
    if let Err(e) = notify_discussion_members(&state, discussion_id, auth.user_id).await {
        warn!(?e, "Failed to send new-post notifications");
    }

    Ok(Json(PostDto::from(&post)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_discussion_id, post_id)): Path<(String, String)>,
    Json(body): Json<UpdatePostRequest>,
) -> Result<Json<PostDto>, ApiError> {
    let post_id = parse_oid(&post_id, "post_id")?;
    let post = state
        .posts
        .update_content(post_id, auth.user_id, body.content)
        .await?;

    dispatcher::emit_post(&state, ActionType::Edited, &post, body.socket_id.as_deref()).await;
    Ok(Json(PostDto::from(&post)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_discussion_id, post_id)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let post_id = parse_oid(&post_id, "post_id")?;
    let (post, file_refs) = state.posts.delete(post_id, auth.user_id).await?;

    // Storage cleanup is best-effort; the record is already gone
    state.storage.delete_files(&file_refs).await;
    dispatcher::emit_post(&state, ActionType::Deleted, &post, params.socket_id.as_deref()).await;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// Mails the other discussion members when the discussion has e-mail
/// notifications turned on.
async fn notify_discussion_members(
    state: &AppState,
    discussion_id: ObjectId,
    author_id: ObjectId,
) -> Result<(), ApiError> {
    let discussion = state.discussions.base.find_by_id(discussion_id).await?;
    if discussion.notification_type != NotificationType::Email {
        return Ok(());
    }

    let author = state.users.base.find_by_id(author_id).await?;
    let team = state.teams.base.find_by_id(discussion.team_id).await?;
    let link = format!(
        "{}/team/{}/discussion/{}",
        state.settings.app.base_url, team.slug, discussion.slug
    );

    let recipients = state
        .users
        .base
        .find_many(doc! { "_id": { "$in": &discussion.member_ids } }, None)
        .await?;

    for user in recipients {
        if user.id == Some(author_id) {
            continue;
        }
        if let Err(e) = state
            .email
            .send_new_post_notification(
                &user.email,
                &author.display_name,
                &team.name,
                &discussion.name,
                &link,
            )
            .await
        {
            warn!(to = %user.email, ?e, "Failed to send new-post notification");
        }
    }

    Ok(())
}
