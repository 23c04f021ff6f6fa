use bson::oid::ObjectId;

use crate::error::ApiError;

pub mod auth;
pub mod discussion;
pub mod invitation;
pub mod post;
pub mod stripe;
pub mod team;
pub mod upload;
pub mod user;

/// Ids arrive on the wire as hex strings; anything unparseable is a 400.
pub(crate) fn parse_oid(value: &str, field: &str) -> Result<ObjectId, ApiError> {
    ObjectId::parse_str(value).map_err(|_| ApiError::BadRequest(format!("Invalid {field}")))
}
