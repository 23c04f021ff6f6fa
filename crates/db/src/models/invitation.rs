use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Pending invitation of an email address into a team. Unique per
/// (team_id, email); a TTL index on `expires_at` reaps stale ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invitation {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub team_id: ObjectId,
    pub email: String,
    pub token: String,
    pub created_at: DateTime,
    pub expires_at: DateTime,
}

impl Invitation {
    pub const COLLECTION: &'static str = "invitations";
}
