use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, header},
    response::Redirect,
};
use crewdeck_db::models::User;
use crewdeck_services::auth::login_token::generate_login_token;
use serde::Deserialize;
use tracing::{info, warn};

use super::parse_oid;
use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct GoogleRedirectParams {
    pub invitation_token: Option<String>,
}

/// Starts the Google OAuth dance. An invitation token rides along inside
/// the signed `state` parameter so it survives the provider round-trip.
pub async fn google_redirect(
    State(state): State<AppState>,
    Query(params): Query<GoogleRedirectParams>,
) -> Result<Redirect, ApiError> {
    let state_token = state.auth.generate_state_token(params.invitation_token)?;
    Ok(Redirect::to(&state.google.authorize_url(&state_token)))
}

#[derive(Debug, Deserialize)]
pub struct GoogleCallbackParams {
    pub code: String,
    pub state: String,
}

pub async fn google_callback(
    State(state): State<AppState>,
    Query(params): Query<GoogleCallbackParams>,
) -> Result<(HeaderMap, Redirect), ApiError> {
    let state_claims = state.auth.verify_state_token(&params.state)?;
    let access_token = state.google.exchange_code(&params.code).await?;
    let profile = state.google.fetch_profile(&access_token).await?;

    let user = state
        .users
        .ensure_by_google(
            &profile.id,
            &profile.email,
            &profile.name,
            profile.picture.as_deref(),
        )
        .await?;

    // A completed Google sign-in supersedes any emailed link still in flight
    state.login_tokens.invalidate(user.id.unwrap()).await?;

    finish_login(&state, user, state_claims.invitation_token).await
}

#[derive(Debug, Deserialize)]
pub struct EmailLoginRequest {
    pub email: String,
    pub invitation_token: Option<String>,
}

/// Mails a single-use login link, creating the account on first contact.
pub async fn email_login_link(
    State(state): State<AppState>,
    Json(body): Json<EmailLoginRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = state.users.ensure_by_email(&body.email).await?;
    let user_id = user.id.unwrap();

    let token = generate_login_token();
    state
        .login_tokens
        .store_or_update(user_id, &token, body.invitation_token)
        .await?;

    let link = format!(
        "{}/auth/logged_in?token={}&uid={}",
        state.settings.app.base_url,
        token,
        user_id.to_hex()
    );
    state
        .email
        .send_login_link(&user.email, &user.display_name, &link)
        .await?;

    Ok(Json(serde_json::json!({ "sent": true })))
}

#[derive(Debug, Deserialize)]
pub struct LoggedInParams {
    pub token: String,
    pub uid: String,
}

/// Redeems a magic-link (uid, token) pair. Single use, one-hour window.
pub async fn logged_in(
    State(state): State<AppState>,
    Query(params): Query<LoggedInParams>,
) -> Result<(HeaderMap, Redirect), ApiError> {
    let user_id = parse_oid(&params.uid, "uid")?;

    let record = state
        .login_tokens
        .authenticate(user_id, &params.token)
        .await?
        .ok_or_else(|| {
            ApiError::Unauthorized("Login link is invalid or has expired".to_string())
        })?;

    let user = state.users.base.find_by_id(user_id).await?;
    finish_login(&state, user, record.invitation_token).await
}

/// Clears the session cookie.
pub async fn logout() -> (HeaderMap, Json<serde_json::Value>) {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        "access_token=; HttpOnly; Path=/; SameSite=Lax; Max-Age=0"
            .parse()
            .unwrap(),
    );
    (headers, Json(serde_json::json!({ "logged_out": true })))
}

/// Shared login tail for both flows: consume any invitation, send the
/// welcome mail exactly once, set the session cookie and pick the
/// landing page (invited team first, else default team, else onboarding).
async fn finish_login(
    state: &AppState,
    user: User,
    invitation_token: Option<String>,
) -> Result<(HeaderMap, Redirect), ApiError> {
    let user_id = user.id.unwrap();

    let mut landing_slug: Option<String> = None;
    if let Some(token) = invitation_token {
        match state.invitations.accept(&token, &user).await {
            Ok(team) => landing_slug = Some(team.slug),
            Err(e) => warn!(?user_id, ?e, "Could not accept invitation at login"),
        }
    }

    if state.users.mark_welcome_email_sent(user_id).await? {
        let link = format!("{}/", state.settings.app.base_url);
        if let Err(e) = state
            .email
            .send_welcome(&user.email, &user.display_name, &link)
            .await
        {
            warn!(?user_id, ?e, "Failed to send welcome e-mail");
        }
    }

    let landing = match landing_slug {
        Some(slug) => format!("/team/{slug}"),
        None if user.default_team_slug.is_empty() => "/onboarding".to_string(),
        None => format!("/team/{}", user.default_team_slug),
    };

    let token = state.auth.generate_access_token(user_id, &user.email)?;
    let mut headers = HeaderMap::new();
    let cookie = format!(
        "access_token={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}",
        token.token, token.expires_in
    );
    headers.insert(header::SET_COOKIE, cookie.parse().unwrap());

    info!(?user_id, %landing, "Login completed");
    Ok((headers, Redirect::to(&landing)))
}
