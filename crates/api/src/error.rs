use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use crewdeck_services::auth::AuthError;
use crewdeck_services::auth::google::GoogleAuthError;
use crewdeck_services::dao::base::DaoError;
use crewdeck_services::email::EmailError;
use crewdeck_services::stripe::StripeError;
use serde::Serialize;

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    Internal(String),
    Validation(String),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "unauthorized", msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal", msg),
            ApiError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, "validation", msg),
        };

        let body = ErrorResponse {
            error: error_type.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<DaoError> for ApiError {
    fn from(err: DaoError) -> Self {
        match err {
            DaoError::NotFound => ApiError::NotFound("Resource not found".to_string()),
            DaoError::DuplicateKey(msg) => ApiError::Conflict(msg),
            DaoError::Forbidden(msg) => ApiError::Forbidden(msg),
            DaoError::Validation(msg) => ApiError::Validation(msg),
            DaoError::Mongo(e) => ApiError::Internal(e.to_string()),
            DaoError::BsonSer(e) => ApiError::Internal(e.to_string()),
            DaoError::BsonDe(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::TokenExpired => ApiError::Unauthorized("Token expired".to_string()),
            AuthError::InvalidToken(msg) => ApiError::Unauthorized(msg),
        }
    }
}

impl From<GoogleAuthError> for ApiError {
    fn from(err: GoogleAuthError) -> Self {
        ApiError::Unauthorized(err.to_string())
    }
}

impl From<StripeError> for ApiError {
    fn from(err: StripeError) -> Self {
        match err {
            StripeError::TeamNotFound => ApiError::NotFound("Team not found".to_string()),
            StripeError::NotTeamLeader => {
                ApiError::Forbidden("Only the team leader can manage billing".to_string())
            }
            StripeError::SessionMismatch => {
                ApiError::Forbidden("Checkout session does not belong to this account".to_string())
            }
            StripeError::NoSubscription => {
                ApiError::BadRequest("No subscription to cancel".to_string())
            }
            StripeError::InvalidSignature => {
                ApiError::Unauthorized("Invalid webhook signature".to_string())
            }
            StripeError::ApiError(msg) => ApiError::Internal(msg),
            StripeError::Mongo(e) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<EmailError> for ApiError {
    fn from(err: EmailError) -> Self {
        match err {
            EmailError::Dao(e) => e.into(),
            other => ApiError::Internal(other.to_string()),
        }
    }
}
