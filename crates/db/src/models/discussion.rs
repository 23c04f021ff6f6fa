use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub team_id: ObjectId,
    pub name: String,
    /// Unique within the team, not globally.
    pub slug: String,
    /// Subset of the team's member_ids; always contains the creator.
    #[serde(default)]
    pub member_ids: Vec<ObjectId>,
    #[serde(default)]
    pub notification_type: NotificationType,
    pub created_user_id: ObjectId,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    #[default]
    Default,
    Email,
}

impl Discussion {
    pub const COLLECTION: &'static str = "discussions";
}
