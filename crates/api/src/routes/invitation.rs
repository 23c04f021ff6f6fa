use axum::{
    Json,
    extract::{Path, State},
};
use bson::oid::ObjectId;
use crewdeck_db::models::Invitation;
use crewdeck_realtime::InvitationDto;
use serde::Deserialize;
use tracing::warn;

use super::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState};

#[derive(Debug, Deserialize)]
pub struct CreateInvitationRequest {
    pub email: String,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<InvitationDto>>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let invitations = state.invitations.list_for_team(team_id, auth.user_id).await?;
    Ok(Json(invitations.iter().map(InvitationDto::from).collect()))
}

pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(team_id): Path<String>,
    Json(body): Json<CreateInvitationRequest>,
) -> Result<Json<InvitationDto>, ApiError> {
    let team_id = parse_oid(&team_id, "team_id")?;
    let invitation = state
        .invitations
        .create(team_id, auth.user_id, &body.email)
        .await?;

    // The e-mail is best-effort; the invitation stands either way
    if let Err(e) = send_invitation_email(&state, &invitation, auth.user_id).await {
        warn!(?e, "Failed to send invitation e-mail");
    }

    Ok(Json(InvitationDto::from(&invitation)))
}

pub async fn revoke(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((_team_id, invitation_id)): Path<(String, String)>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let invitation_id = parse_oid(&invitation_id, "invitation_id")?;
    state.invitations.revoke(invitation_id, auth.user_id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

async fn send_invitation_email(
    state: &AppState,
    invitation: &Invitation,
    inviter_id: ObjectId,
) -> Result<(), ApiError> {
    let inviter = state.users.base.find_by_id(inviter_id).await?;
    let team = state.teams.base.find_by_id(invitation.team_id).await?;
    // The login page carries the token into whichever sign-in method the
    // invitee picks
    let link = format!(
        "{}/login?invitation_token={}",
        state.settings.app.base_url, invitation.token
    );

    state
        .email
        .send_invitation(&invitation.email, &inviter.display_name, &team.name, &link)
        .await?;
    Ok(())
}
