use axum::{
    Json,
    extract::{Path, Query, State},
};
use crewdeck_realtime::{ActionType, TeamDto, UserDto};
use serde::Deserialize;

use super::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState, ws::dispatcher};

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    pub name: String,
    pub avatar_url: Option<String>,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub regenerate_slug: bool,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    pub socket_id: Option<String>,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<TeamDto>>, ApiError> {
    let teams = state.teams.find_user_teams(auth.user_id).await?;
    Ok(Json(teams.iter().map(TeamDto::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateTeamRequest>,
) -> Result<Json<TeamDto>, ApiError> {
    let team = state
        .teams
        .create(body.name, body.avatar_url, auth.user_id)
        .await?;

    dispatcher::emit_team(&state, ActionType::Added, &team, body.socket_id.as_deref()).await;
    Ok(Json(TeamDto::from(&team)))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<TeamDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let team = state.teams.ensure_member(team_id, auth.user_id).await?;
    Ok(Json(TeamDto::from(&team)))
}

pub async fn get_by_slug(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(slug): Path<String>,
) -> Result<Json<TeamDto>, ApiError> {
    let team = state.teams.find_by_slug(&slug).await?;
    if !team.member_ids.contains(&auth.user_id) {
        return Err(ApiError::Forbidden("Not a team member".to_string()));
    }
    Ok(Json(TeamDto::from(&team)))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
    Json(body): Json<UpdateTeamRequest>,
) -> Result<Json<TeamDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let team = state
        .teams
        .update(
            team_id,
            auth.user_id,
            body.name,
            body.avatar_url,
            body.regenerate_slug,
        )
        .await?;

    dispatcher::emit_team(&state, ActionType::Edited, &team, body.socket_id.as_deref()).await;
    Ok(Json(TeamDto::from(&team)))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let (team, file_refs) = state.teams.delete(team_id, auth.user_id).await?;

    // Storage cleanup is best-effort; the records are already gone
    state.storage.delete_files(&file_refs).await;
    dispatcher::emit_team(&state, ActionType::Deleted, &team, params.socket_id.as_deref()).await;

    Ok(Json(serde_json::json!({ "deleted": true })))
}

pub async fn members(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<UserDto>>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let users = state.teams.find_members(team_id, auth.user_id).await?;
    Ok(Json(users.iter().map(UserDto::from).collect()))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((team_id, member_id)): Path<(String, String)>,
    Query(params): Query<DeleteParams>,
) -> Result<Json<TeamDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let member_id = parse_oid(&member_id, "member_id")?;

    let team = state
        .teams
        .remove_member(team_id, auth.user_id, member_id)
        .await?;

    dispatcher::emit_team(&state, ActionType::Edited, &team, params.socket_id.as_deref()).await;
    Ok(Json(TeamDto::from(&team)))
}
