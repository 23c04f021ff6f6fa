use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Single-use magic-link token. Only the SHA-256 of the emailed token
/// is stored; one live token per user (unique index on `user_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginToken {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub user_id: ObjectId,
    pub token_hash: String,
    /// Invitation token carried through the login redirect, consumed
    /// together with the login.
    pub invitation_token: Option<String>,
    pub created_at: DateTime,
    pub expires_at: DateTime,
}

impl LoginToken {
    pub const COLLECTION: &'static str = "login_tokens";
}
