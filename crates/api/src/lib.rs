pub mod error;
pub mod extractors;
pub mod routes;
pub mod state;
pub mod ws;

use axum::{
    Router,
    http::HeaderValue,
    routing::{delete, get, post, put},
};
use state::AppState;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings.app.cors_origins);

    // Login routes (cookie-setting browser endpoints, no /api prefix)
    let auth_routes = Router::new()
        .route("/auth/google", get(routes::auth::google_redirect))
        .route("/oauth2callback", get(routes::auth::google_callback))
        .route("/auth/email-login-link", post(routes::auth::email_login_link))
        .route("/auth/logged_in", get(routes::auth::logged_in))
        .route("/auth/logout", post(routes::auth::logout));

    // Profile routes
    let me_routes = Router::new()
        .route("/me", get(routes::user::me))
        .route("/me", put(routes::user::update_profile));

    // Team routes
    let team_routes = Router::new()
        .route("/", get(routes::team::list))
        .route("/", post(routes::team::create))
        .route("/slug/{slug}", get(routes::team::get_by_slug))
        .route("/{team_id}", get(routes::team::get))
        .route("/{team_id}", put(routes::team::update))
        .route("/{team_id}", delete(routes::team::delete))
        .route("/{team_id}/member", get(routes::team::members))
        .route("/{team_id}/member/{member_id}", delete(routes::team::remove_member));

    // Invitation routes (under team)
    let invitation_routes = Router::new()
        .route("/", get(routes::invitation::list))
        .route("/", post(routes::invitation::create))
        .route("/{invitation_id}", delete(routes::invitation::revoke));

    // Discussion routes (under team)
    let discussion_routes = Router::new()
        .route("/", get(routes::discussion::list))
        .route("/", post(routes::discussion::create))
        .route("/slug/{slug}", get(routes::discussion::get_by_slug))
        .route("/{discussion_id}", get(routes::discussion::get))
        .route("/{discussion_id}", put(routes::discussion::update))
        .route("/{discussion_id}", delete(routes::discussion::delete));

    // Post routes (under discussion)
    let post_routes = Router::new()
        .route("/", get(routes::post::list))
        .route("/", post(routes::post::create))
        .route("/{post_id}", put(routes::post::update))
        .route("/{post_id}", delete(routes::post::delete));

    // Billing routes (every operation is leader-gated)
    let stripe_routes = Router::new()
        .route("/checkout/subscription", post(routes::stripe::create_subscription_checkout))
        .route("/checkout/setup", post(routes::stripe::create_setup_checkout))
        .route("/subscription/cancel", post(routes::stripe::cancel_subscription))
        .route("/invoices", get(routes::stripe::invoices));

    // Compose API
    let api = Router::new()
        .merge(me_routes)
        .nest("/team", team_routes)
        .nest("/team/{team_id}/invitation", invitation_routes)
        .nest("/team/{team_id}/discussion", discussion_routes)
        .nest("/discussion/{discussion_id}/post", post_routes)
        .nest("/stripe", stripe_routes)
        .route("/upload", post(routes::upload::presign_upload))
        .route("/file", get(routes::upload::serve_file));

    // Stripe browser endpoints (redirect landing + signature-verified webhook)
    let stripe_browser = Router::new()
        .route(
            "/stripe/checkout-completed/{session_id}",
            get(routes::stripe::checkout_completed),
        )
        .route("/stripe/webhook", post(routes::stripe::webhook));

    // Health check
    let health = Router::new().route("/health", get(health_check));

    Router::new()
        .nest("/api", api)
        .merge(auth_routes)
        .merge(stripe_browser)
        .merge(health)
        .route("/ws", get(ws::handler::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// An empty origin list means a development setup; allow everything.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
