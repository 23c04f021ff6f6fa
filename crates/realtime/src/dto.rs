use bson::oid::ObjectId;
use crewdeck_db::models::{
    Discussion, Invitation, Post, StripeCard, StripeInvoice, Team, User,
};
use serde::{Deserialize, Serialize};

pub use crewdeck_db::models::NotificationType;

/// Wire representations shared by REST responses and realtime events.
/// ObjectIds become hex strings, timestamps become epoch milliseconds.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserDto {
    pub id: String,
    pub email: String,
    pub display_name: String,
    pub slug: String,
    pub avatar_url: Option<String>,
    pub default_team_slug: String,
    pub is_signed_up_via_google: bool,
    pub has_card_information: bool,
    pub card: Option<CardDto>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDto {
    pub brand: String,
    pub last4: String,
    pub exp_month: u8,
    pub exp_year: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamDto {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub avatar_url: Option<String>,
    pub leader_id: String,
    pub member_ids: Vec<String>,
    pub is_subscription_active: bool,
    pub is_payment_failed: bool,
    pub subscription_status: Option<String>,
    pub subscription_period_end: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscussionDto {
    pub id: String,
    pub team_id: String,
    pub name: String,
    pub slug: String,
    pub member_ids: Vec<String>,
    pub notification_type: NotificationType,
    pub created_user_id: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostDto {
    pub id: String,
    pub discussion_id: String,
    pub created_user_id: String,
    pub content: String,
    pub html_content: String,
    pub is_edited: bool,
    pub created_at: i64,
    pub last_updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvitationDto {
    pub id: String,
    pub team_id: String,
    pub email: String,
    pub created_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceDto {
    pub id: String,
    pub amount_paid: i64,
    pub currency: String,
    pub status: Option<String>,
    pub hosted_invoice_url: Option<String>,
    pub created: i64,
}

fn hex(id: &Option<ObjectId>) -> String {
    id.map(|id| id.to_hex()).unwrap_or_default()
}

fn hex_list(ids: &[ObjectId]) -> Vec<String> {
    ids.iter().map(|id| id.to_hex()).collect()
}

impl From<&User> for UserDto {
    fn from(user: &User) -> Self {
        Self {
            id: hex(&user.id),
            email: user.email.clone(),
            display_name: user.display_name.clone(),
            slug: user.slug.clone(),
            avatar_url: user.avatar_url.clone(),
            default_team_slug: user.default_team_slug.clone(),
            is_signed_up_via_google: user.is_signed_up_via_google,
            has_card_information: user.has_card_information,
            card: user.stripe_card.as_ref().map(CardDto::from),
            created_at: user.created_at.timestamp_millis(),
        }
    }
}

impl From<&StripeCard> for CardDto {
    fn from(card: &StripeCard) -> Self {
        Self {
            brand: card.brand.clone(),
            last4: card.last4.clone(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
        }
    }
}

impl From<&Team> for TeamDto {
    fn from(team: &Team) -> Self {
        Self {
            id: hex(&team.id),
            name: team.name.clone(),
            slug: team.slug.clone(),
            avatar_url: team.avatar_url.clone(),
            leader_id: team.leader_id.to_hex(),
            member_ids: hex_list(&team.member_ids),
            is_subscription_active: team.is_subscription_active,
            is_payment_failed: team.is_payment_failed,
            subscription_status: team
                .stripe_subscription
                .as_ref()
                .map(|s| s.status.clone()),
            subscription_period_end: team
                .stripe_subscription
                .as_ref()
                .and_then(|s| s.current_period_end),
            created_at: team.created_at.timestamp_millis(),
        }
    }
}

impl From<&Discussion> for DiscussionDto {
    fn from(discussion: &Discussion) -> Self {
        Self {
            id: hex(&discussion.id),
            team_id: discussion.team_id.to_hex(),
            name: discussion.name.clone(),
            slug: discussion.slug.clone(),
            member_ids: hex_list(&discussion.member_ids),
            notification_type: discussion.notification_type.clone(),
            created_user_id: discussion.created_user_id.to_hex(),
            created_at: discussion.created_at.timestamp_millis(),
        }
    }
}

impl From<&Post> for PostDto {
    fn from(post: &Post) -> Self {
        Self {
            id: hex(&post.id),
            discussion_id: post.discussion_id.to_hex(),
            created_user_id: post.created_user_id.to_hex(),
            content: post.content.clone(),
            html_content: post.html_content.clone(),
            is_edited: post.is_edited,
            created_at: post.created_at.timestamp_millis(),
            last_updated_at: post.last_updated_at.timestamp_millis(),
        }
    }
}

impl From<&Invitation> for InvitationDto {
    fn from(invitation: &Invitation) -> Self {
        Self {
            id: hex(&invitation.id),
            team_id: invitation.team_id.to_hex(),
            email: invitation.email.clone(),
            created_at: invitation.created_at.timestamp_millis(),
            expires_at: invitation.expires_at.timestamp_millis(),
        }
    }
}

impl From<&StripeInvoice> for InvoiceDto {
    fn from(invoice: &StripeInvoice) -> Self {
        Self {
            id: invoice.id.clone(),
            amount_paid: invoice.amount_paid,
            currency: invoice.currency.clone(),
            status: invoice.status.clone(),
            hosted_invoice_url: invoice.hosted_invoice_url.clone(),
            created: invoice.created,
        }
    }
}
