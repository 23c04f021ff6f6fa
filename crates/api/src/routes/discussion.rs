use axum::{
    Json,
    extract::{Path, Query, State},
};
use bson::oid::ObjectId;
use crewdeck_db::models::NotificationType;
use crewdeck_realtime::{ActionType, DiscussionDto};
use serde::Deserialize;

use super::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState, ws::dispatcher};

#[derive(Debug, Deserialize)]
pub struct CreateDiscussionRequest {
    pub name: String,
    #[serde(default)]
    pub member_ids: Vec<String>,
    pub notification_type: Option<NotificationType>,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDiscussionRequest {
    pub name: Option<String>,
    pub member_ids: Option<Vec<String>>,
    pub notification_type: Option<NotificationType>,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub socket_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<DiscussionDto>>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let discussions = state.discussions.find_by_team(team_id, auth.user_id).await?;
    Ok(Json(discussions.iter().map(DiscussionDto::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
    Json(body): Json<CreateDiscussionRequest>,
) -> Result<Json<DiscussionDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let member_ids = parse_member_ids(&body.member_ids)?;

    let discussion = state
        .discussions
        .create(
            team_id,
            auth.user_id,
            body.name,
            member_ids,
            body.notification_type.unwrap_or(NotificationType::Default),
        )
        .await?;

    dispatcher::emit_discussion(
        &state,
        ActionType::Added,
        &discussion,
        body.socket_id.as_deref(),
    )
    .await;
    Ok(Json(DiscussionDto::from(&discussion)))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_team_id, discussion_id)): Path<(String, String)>,
) -> Result<Json<DiscussionDto>, ApiError> {
    let discussion_id = parse_oid(&discussion_id, "discussion_id")?;
    let discussion = state
        .discussions
        .find_for_member(discussion_id, auth.user_id)
        .await?;
    Ok(Json(DiscussionDto::from(&discussion)))
}

pub async fn get_by_slug(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, slug)): Path<(String, String)>,
) -> Result<Json<DiscussionDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let discussion = state
        .discussions
        .find_by_slug(team_id, &slug, auth.user_id)
        .await?;
    Ok(Json(DiscussionDto::from(&discussion)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_team_id, discussion_id)): Path<(String, String)>,
    Json(body): Json<UpdateDiscussionRequest>,
) -> Result<Json<DiscussionDto>, ApiError> {
    let discussion_id = parse_oid(&discussion_id, "discussion_id")?;
    let member_ids = body
        .member_ids
        .as_deref()
        .map(parse_member_ids)
        .transpose()?;

    let discussion = state
        .discussions
        .update(
            discussion_id,
            auth.user_id,
            body.name,
            member_ids,
            body.notification_type,
        )
        .await?;

    dispatcher::emit_discussion(
        &state,
        ActionType::Edited,
        &discussion,
        body.socket_id.as_deref(),
    )
    .await;
    Ok(Json(DiscussionDto::from(&discussion)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_team_id, discussion_id)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let discussion_id = parse_oid(&discussion_id, "discussion_id")?;
    let (discussion, file_refs) = state
        .discussions
        .delete(discussion_id, auth.user_id)
        .await?;

    // Storage cleanup is best-effort; the records are already gone
    state.storage.delete_files(&file_refs).await;
    dispatcher::emit_discussion(
        &state,
        ActionType::Deleted,
        &discussion,
        params.socket_id.as_deref(),
    )
    .await;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

fn parse_member_ids(ids: &[String]) -> Result<Vec<ObjectId>, ApiError> {
    ids.iter()
        .map(|id| ObjectId::parse_str(id))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| ApiError::BadRequest("Invalid member_ids".to_string()))
}
