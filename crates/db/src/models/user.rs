use bson::{oid::ObjectId, DateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub email: String,
    pub display_name: String,
    pub slug: String,
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub google_id: Option<String>,
    #[serde(default)]
    pub is_signed_up_via_google: bool,
    /// Slug of the team the app opens after login. Empty until the user
    /// creates or joins their first team.
    #[serde(default)]
    pub default_team_slug: String,
    pub stripe_customer: Option<StripeCustomer>,
    pub stripe_card: Option<StripeCard>,
    #[serde(default)]
    pub has_card_information: bool,
    #[serde(default)]
    pub stripe_invoices: Vec<StripeInvoice>,
    #[serde(default)]
    pub welcome_email_sent: bool,
    pub created_at: DateTime,
    pub updated_at: DateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCustomer {
    pub id: String,
    pub created: Option<i64>,
}

/// Snapshot of the default payment method, enough to render
/// "Visa •••• 4242" without another Stripe round-trip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeCard {
    pub payment_method_id: String,
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StripeInvoice {
    pub id: String,
    pub amount_paid: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub created: i64,
}

impl User {
    pub const COLLECTION: &'static str = "users";
}
