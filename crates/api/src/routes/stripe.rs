use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use crewdeck_realtime::{ActionType, InvoiceDto, TeamDto};
use crewdeck_services::stripe::{CheckoutResponse, StripeEvent, StripeService};
use serde::Deserialize;
use tracing::warn;

use super::parse_oid;
use crate::{error::ApiError, extractors::auth::AuthUser, state::AppState, ws::dispatcher};

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub team_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub team_id: String,
    pub socket_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InvoiceParams {
    pub team_id: String,
}

pub async fn create_subscription_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let team_id = parse_oid(&body.team_id, "team_id")?;
    let team = state.teams.ensure_leader(team_id, auth.user_id).await?;
    let user = state.users.base.find_by_id(auth.user_id).await?;

    let (success_url, cancel_url) = checkout_urls(&state, &team.slug);
    let checkout = state
        .stripe
        .create_subscription_checkout(&state.db, team_id, &user, &success_url, &cancel_url)
        .await?;

    Ok(Json(checkout))
}

pub async fn create_setup_checkout(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>, ApiError> {
    let team_id = parse_oid(&body.team_id, "team_id")?;
    let team = state.teams.ensure_leader(team_id, auth.user_id).await?;
    let user = state.users.base.find_by_id(auth.user_id).await?;

    let (success_url, cancel_url) = checkout_urls(&state, &team.slug);
    let checkout = state
        .stripe
        .create_setup_checkout(&state.db, team_id, &user, &success_url, &cancel_url)
        .await?;

    Ok(Json(checkout))
}

/// Success-redirect landing from Stripe Checkout. Failures bounce the
/// browser back to the billing page with a readable `error` parameter
/// instead of a bare error status.
pub async fn checkout_completed(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Redirect, ApiError> {
    let user = state.users.base.find_by_id(auth.user_id).await?;

    match state
        .stripe
        .complete_checkout(&state.db, &session_id, &user)
        .await
    {
        Ok(team) => {
            dispatcher::emit_team(&state, ActionType::Edited, &team, None).await;
            Ok(Redirect::to(&format!("/team/{}/billing", team.slug)))
        }
        Err(e) => {
            warn!(%session_id, ?e, "Checkout completion failed");
            let message = urlencoding::encode(&e.to_string()).into_owned();
            Ok(Redirect::to(&format!("/billing?error={message}")))
        }
    }
}

pub async fn cancel_subscription(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CancelSubscriptionRequest>,
) -> Result<Json<TeamDto>, ApiError> {
    let team_id = parse_oid(&body.team_id, "team_id")?;
    let user = state.users.base.find_by_id(auth.user_id).await?;

    let team = state
        .stripe
        .cancel_subscription(&state.db, team_id, &user)
        .await?;

    dispatcher::emit_team(&state, ActionType::Edited, &team, body.socket_id.as_deref()).await;
    Ok(Json(TeamDto::from(&team)))
}

pub async fn invoices(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<InvoiceParams>,
) -> Result<Json<Vec<InvoiceDto>>, ApiError> {
    let team_id = parse_oid(&params.team_id, "team_id")?;
    let user = state.users.base.find_by_id(auth.user_id).await?;

    let invoices = state.stripe.list_invoices(&state.db, team_id, &user).await?;
    Ok(Json(invoices.iter().map(InvoiceDto::from).collect()))
}

/// Stripe webhook sink. Signature-verified; processing errors become
/// HTTP errors so Stripe retries delivery.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing Stripe-Signature header".to_string()))?;

    StripeService::verify_signature(&state.settings.stripe.webhook_secret, &body, signature)?;

    let event: StripeEvent = serde_json::from_slice(&body)
        .map_err(|_| ApiError::BadRequest("Malformed webhook payload".to_string()))?;

    state.stripe.handle_webhook_event(&state.db, &event).await?;

    Ok(Json(serde_json::json!({ "received": true })))
}

/// Stripe substitutes the literal `{CHECKOUT_SESSION_ID}` placeholder
/// when redirecting back.
fn checkout_urls(state: &AppState, team_slug: &str) -> (String, String) {
    let base = &state.settings.app.base_url;
    (
        format!("{base}/stripe/checkout-completed/{{CHECKOUT_SESSION_ID}}"),
        format!("{base}/team/{team_slug}/billing"),
    )
}
