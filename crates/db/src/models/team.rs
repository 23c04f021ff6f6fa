use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub name: String,
    pub slug: String,
    pub avatar_url: Option<String>,
    pub leader_id: ObjectId,
    /// Always contains `leader_id`.
    #[serde(default)]
    pub member_ids: Vec<ObjectId>,
    #[serde(default)]
    pub is_subscription_active: bool,
    pub stripe_subscription: Option<StripeSubscription>,
    #[serde(default)]
    pub is_payment_failed: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeSubscription {
    pub id: String,
    pub status: String,
    pub current_period_end: Option<i64>,
    pub canceled_at: Option<i64>,
}

impl Team {
    pub const COLLECTION: &'static str = "teams";
}
