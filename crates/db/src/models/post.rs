use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub discussion_id: ObjectId,
    pub created_user_id: ObjectId,
    /// Markdown source as the author typed it.
    pub content: String,
    /// Rendered server-side; raw inline HTML is escaped, storage image
    /// references become lazy `data-src` tags.
    pub html_content: String,
    #[serde(default)]
    pub is_edited: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
    /// Timestamp shown next to edited posts; equals `created_at` until the
    /// first edit.
    pub last_updated_at: DateTime,
}

impl Post {
    pub const COLLECTION: &'static str = "posts";
}
