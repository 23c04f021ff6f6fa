use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

/// Stored mail template, rendered by `{{variable}}` interpolation.
/// Seeded lazily from in-repo defaults the first time a name is used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

impl EmailTemplate {
    pub const COLLECTION: &'static str = "email_templates";
}
