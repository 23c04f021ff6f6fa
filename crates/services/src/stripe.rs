use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_config::StripeSettings;
use crewdeck_db::models::{
    StripeCard, StripeCustomer, StripeInvoice, StripeSubscription, Team, User,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ---- Response / DTO types ------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

// ---- Stripe webhook event (minimal deserialization) ----------------------

#[derive(Debug, Deserialize)]
pub struct StripeEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ---- Error type ----------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum StripeError {
    #[error("Team not found")]
    TeamNotFound,
    #[error("Only the team leader can manage billing")]
    NotTeamLeader,
    #[error("Checkout session does not belong to this account")]
    SessionMismatch,
    #[error("No subscription to cancel")]
    NoSubscription,
    #[error("Stripe API error: {0}")]
    ApiError(String),
    #[error("Invalid webhook signature")]
    InvalidSignature,
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
}

// ---- Service -------------------------------------------------------------

pub struct StripeService {
    settings: StripeSettings,
    client: reqwest::Client,
}

impl StripeService {
    pub fn new(settings: &StripeSettings) -> Self {
        Self {
            settings: settings.clone(),
            client: reqwest::Client::new(),
        }
    }

    // ---- Raw API helpers -------------------------------------------------

    async fn api_post(
        &self,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<serde_json::Value, StripeError> {
        let resp: serde_json::Value = self
            .client
            .post(format!("https://api.stripe.com/v1/{path}"))
            .basic_auth(&self.settings.secret_key, None::<&str>)
            .form(params)
            .send()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?
            .json()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?;
        check_api_error(resp)
    }

    async fn api_get(&self, path: &str) -> Result<serde_json::Value, StripeError> {
        let resp: serde_json::Value = self
            .client
            .get(format!("https://api.stripe.com/v1/{path}"))
            .basic_auth(&self.settings.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?
            .json()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?;
        check_api_error(resp)
    }

    async fn api_delete(&self, path: &str) -> Result<serde_json::Value, StripeError> {
        let resp: serde_json::Value = self
            .client
            .delete(format!("https://api.stripe.com/v1/{path}"))
            .basic_auth(&self.settings.secret_key, None::<&str>)
            .send()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?
            .json()
            .await
            .map_err(|e| StripeError::ApiError(e.to_string()))?;
        check_api_error(resp)
    }

    // ---- Customer --------------------------------------------------------

    /// Returns the user's Stripe customer id, creating and persisting one
    /// on first use.
    async fn ensure_customer(
        &self,
        db: &mongodb::Database,
        user: &User,
    ) -> Result<String, StripeError> {
        if let Some(ref customer) = user.stripe_customer {
            return Ok(customer.id.clone());
        }

        let user_id = user.id.unwrap();
        let resp = self
            .api_post(
                "customers",
                &[
                    ("email", user.email.as_str()),
                    ("metadata[user_id]", &user_id.to_hex()),
                ],
            )
            .await?;

        let id = resp["id"]
            .as_str()
            .ok_or_else(|| StripeError::ApiError("No customer ID in response".to_string()))?
            .to_string();
        let customer = StripeCustomer {
            id: id.clone(),
            created: resp["created"].as_i64(),
        };

        db.collection::<User>(User::COLLECTION)
            .update_one(
                doc! { "_id": user_id },
                doc! { "$set": {
                    "stripe_customer": bson::to_bson(&customer).unwrap_or_default(),
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        info!(customer_id = %id, "Created Stripe customer");
        Ok(id)
    }

    // ---- Checkout --------------------------------------------------------

    /// Subscription-mode checkout for the team plan. Leader-only.
    pub async fn create_subscription_checkout(
        &self,
        db: &mongodb::Database,
        team_id: ObjectId,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutResponse, StripeError> {
        self.team_for_leader(db, team_id, user).await?;
        let customer_id = self.ensure_customer(db, user).await?;

        let team_hex = team_id.to_hex();
        let user_hex = user.id.unwrap().to_hex();
        let params = [
            ("customer", customer_id.as_str()),
            ("mode", "subscription"),
            ("line_items[0][price]", self.settings.price_subscription.as_str()),
            ("line_items[0][quantity]", "1"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[user_id]", user_hex.as_str()),
            ("metadata[team_id]", team_hex.as_str()),
        ];

        let resp = self.api_post("checkout/sessions", &params).await?;
        let url = resp["url"]
            .as_str()
            .ok_or_else(|| StripeError::ApiError("No checkout URL in response".to_string()))?
            .to_string();

        Ok(CheckoutResponse { url })
    }

    /// Setup-mode checkout that saves a card as the customer's default
    /// payment method. Leader-only.
    pub async fn create_setup_checkout(
        &self,
        db: &mongodb::Database,
        team_id: ObjectId,
        user: &User,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutResponse, StripeError> {
        self.team_for_leader(db, team_id, user).await?;
        let customer_id = self.ensure_customer(db, user).await?;

        let team_hex = team_id.to_hex();
        let user_hex = user.id.unwrap().to_hex();
        let params = [
            ("customer", customer_id.as_str()),
            ("mode", "setup"),
            ("payment_method_types[0]", "card"),
            ("success_url", success_url),
            ("cancel_url", cancel_url),
            ("metadata[user_id]", user_hex.as_str()),
            ("metadata[team_id]", team_hex.as_str()),
        ];

        let resp = self.api_post("checkout/sessions", &params).await?;
        let url = resp["url"]
            .as_str()
            .ok_or_else(|| StripeError::ApiError("No checkout URL in response".to_string()))?
            .to_string();

        Ok(CheckoutResponse { url })
    }

    // ---- Checkout completion ---------------------------------------------

    /// Reconciles a finished checkout session once the browser lands on the
    /// success redirect. The session metadata must name a team whose leader
    /// is the signed-in user; the `setup` branch stores the saved card, the
    /// `subscription` branch activates the team and caches its invoices.
    pub async fn complete_checkout(
        &self,
        db: &mongodb::Database,
        session_id: &str,
        user: &User,
    ) -> Result<Team, StripeError> {
        let session = self
            .api_get(&format!("checkout/sessions/{session_id}"))
            .await?;

        let team_hex = session["metadata"]["team_id"].as_str().unwrap_or_default();
        let user_hex = session["metadata"]["user_id"].as_str().unwrap_or_default();
        let team_id =
            ObjectId::parse_str(team_hex).map_err(|_| StripeError::SessionMismatch)?;
        let session_user =
            ObjectId::parse_str(user_hex).map_err(|_| StripeError::SessionMismatch)?;
        if user.id != Some(session_user) {
            return Err(StripeError::SessionMismatch);
        }
        let team = self.team_for_leader(db, team_id, user).await?;

        match session["mode"].as_str().unwrap_or_default() {
            "setup" => self.apply_setup_session(db, &session, user).await?,
            "subscription" => {
                self.apply_subscription_session(db, &session, &team, user)
                    .await?
            }
            other => {
                return Err(StripeError::ApiError(format!(
                    "Unexpected checkout session mode: {other}"
                )));
            }
        }

        db.collection::<Team>(Team::COLLECTION)
            .find_one(doc! { "_id": team_id })
            .await?
            .ok_or(StripeError::TeamNotFound)
    }

    /// `setup` mode: resolve the saved payment method off the setup intent,
    /// make it the customer default and snapshot the card onto the user.
    async fn apply_setup_session(
        &self,
        db: &mongodb::Database,
        session: &serde_json::Value,
        user: &User,
    ) -> Result<(), StripeError> {
        let setup_intent_id = session["setup_intent"]
            .as_str()
            .ok_or_else(|| StripeError::ApiError("No setup intent on session".to_string()))?;
        let intent = self
            .api_get(&format!("setup_intents/{setup_intent_id}"))
            .await?;
        let payment_method_id = intent["payment_method"].as_str().ok_or_else(|| {
            StripeError::ApiError("No payment method on setup intent".to_string())
        })?;

        let customer_id = session["customer"].as_str().unwrap_or_default();
        self.api_post(
            &format!("customers/{customer_id}"),
            &[("invoice_settings[default_payment_method]", payment_method_id)],
        )
        .await?;

        let pm = self
            .api_get(&format!("payment_methods/{payment_method_id}"))
            .await?;
        let card = card_snapshot(payment_method_id, &pm);

        db.collection::<User>(User::COLLECTION)
            .update_one(
                doc! { "_id": user.id.unwrap() },
                doc! { "$set": {
                    "stripe_card": bson::to_bson(&card).unwrap_or_default(),
                    "has_card_information": true,
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        info!(payment_method = %payment_method_id, "Saved default payment method");
        Ok(())
    }

    /// `subscription` mode: snapshot the live subscription onto the team,
    /// mark it active, and cache the fresh invoice list on the paying user.
    async fn apply_subscription_session(
        &self,
        db: &mongodb::Database,
        session: &serde_json::Value,
        team: &Team,
        user: &User,
    ) -> Result<(), StripeError> {
        let subscription_id = session["subscription"]
            .as_str()
            .ok_or_else(|| StripeError::ApiError("No subscription on session".to_string()))?;
        let sub = self
            .api_get(&format!("subscriptions/{subscription_id}"))
            .await?;
        let snapshot = subscription_snapshot(&sub);

        db.collection::<Team>(Team::COLLECTION)
            .update_one(
                doc! { "_id": team.id.unwrap() },
                doc! { "$set": {
                    "is_subscription_active": true,
                    "is_payment_failed": false,
                    "stripe_subscription": bson::to_bson(&snapshot).unwrap_or_default(),
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        let customer_id = session["customer"].as_str().unwrap_or_default();
        self.refresh_invoices(db, customer_id, user).await?;

        info!(
            subscription_id = %subscription_id,
            team = %team.slug,
            "Team subscription activated"
        );
        Ok(())
    }

    // ---- Cancellation ----------------------------------------------------

    /// Cancels the team's subscription at Stripe and deactivates it
    /// locally. Leader-only.
    pub async fn cancel_subscription(
        &self,
        db: &mongodb::Database,
        team_id: ObjectId,
        user: &User,
    ) -> Result<Team, StripeError> {
        let team = self.team_for_leader(db, team_id, user).await?;
        let subscription = team
            .stripe_subscription
            .as_ref()
            .ok_or(StripeError::NoSubscription)?;

        let resp = self
            .api_delete(&format!("subscriptions/{}", subscription.id))
            .await?;
        let snapshot = subscription_snapshot(&resp);

        let collection = db.collection::<Team>(Team::COLLECTION);
        collection
            .update_one(
                doc! { "_id": team_id },
                doc! { "$set": {
                    "is_subscription_active": false,
                    "stripe_subscription": bson::to_bson(&snapshot).unwrap_or_default(),
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        info!(subscription_id = %subscription.id, team = %team.slug, "Subscription canceled");
        collection
            .find_one(doc! { "_id": team_id })
            .await?
            .ok_or(StripeError::TeamNotFound)
    }

    // ---- Invoices --------------------------------------------------------

    /// Re-fetches the leader's invoices from Stripe and refreshes the cached
    /// copy on the user. Without a Stripe customer the list is just empty.
    pub async fn list_invoices(
        &self,
        db: &mongodb::Database,
        team_id: ObjectId,
        user: &User,
    ) -> Result<Vec<StripeInvoice>, StripeError> {
        self.team_for_leader(db, team_id, user).await?;
        let Some(ref customer) = user.stripe_customer else {
            return Ok(Vec::new());
        };
        self.refresh_invoices(db, &customer.id, user).await
    }

    async fn refresh_invoices(
        &self,
        db: &mongodb::Database,
        customer_id: &str,
        user: &User,
    ) -> Result<Vec<StripeInvoice>, StripeError> {
        let resp = self
            .api_get(&format!("invoices?customer={customer_id}&limit=24"))
            .await?;
        let invoices: Vec<StripeInvoice> = resp["data"]
            .as_array()
            .map(|items| items.iter().map(invoice_snapshot).collect())
            .unwrap_or_default();

        db.collection::<User>(User::COLLECTION)
            .update_one(
                doc! { "_id": user.id.unwrap() },
                doc! { "$set": {
                    "stripe_invoices": bson::to_bson(&invoices).unwrap_or_default(),
                    "updated_at": DateTime::now(),
                } },
            )
            .await?;

        Ok(invoices)
    }

    // ---- Webhook processing ----------------------------------------------

    /// Verify the Stripe webhook signature using HMAC-SHA256.
    pub fn verify_signature(
        webhook_secret: &str,
        payload: &[u8],
        sig_header: &str,
    ) -> Result<(), StripeError> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        // Parse the Stripe-Signature header: t=...,v1=...,v0=...
        let mut timestamp = None;
        let mut signatures: Vec<String> = Vec::new();

        for part in sig_header.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t.to_string());
            } else if let Some(v1) = part.strip_prefix("v1=") {
                signatures.push(v1.to_string());
            }
        }

        let timestamp = timestamp.ok_or(StripeError::InvalidSignature)?;
        if signatures.is_empty() {
            return Err(StripeError::InvalidSignature);
        }

        // Build the signed payload: "{timestamp}.{body}"
        let signed_payload = format!("{timestamp}.{}", String::from_utf8_lossy(payload));

        let mut mac = Hmac::<Sha256>::new_from_slice(webhook_secret.as_bytes())
            .map_err(|_| StripeError::InvalidSignature)?;
        mac.update(signed_payload.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());

        if signatures.iter().any(|s| s == &expected) {
            Ok(())
        } else {
            Err(StripeError::InvalidSignature)
        }
    }

    /// Handle a verified webhook event, reconciling team billing state.
    /// Errors propagate to the HTTP response so Stripe retries delivery.
    pub async fn handle_webhook_event(
        &self,
        db: &mongodb::Database,
        event: &StripeEvent,
    ) -> Result<(), StripeError> {
        let obj = &event.data.object;

        match event.event_type.as_str() {
            "invoice.payment_failed" => {
                let subscription_id = obj["subscription"].as_str().unwrap_or_default();
                if subscription_id.is_empty() {
                    warn!("invoice.payment_failed without a subscription id");
                    return Ok(());
                }

                let collection = db.collection::<Team>(Team::COLLECTION);
                let Some(team) = collection
                    .find_one(doc! {
                        "stripe_subscription.id": subscription_id,
                        "is_subscription_active": true,
                        "is_payment_failed": false,
                    })
                    .await?
                else {
                    // Unknown subscription, or a redelivery of an event we
                    // already handled.
                    info!(
                        subscription_id = %subscription_id,
                        "Payment-failed event matched no active team"
                    );
                    return Ok(());
                };

                let resp = self
                    .api_delete(&format!("subscriptions/{subscription_id}"))
                    .await?;
                let snapshot = subscription_snapshot(&resp);

                collection
                    .update_one(
                        doc! { "_id": team.id.unwrap() },
                        doc! { "$set": {
                            "is_subscription_active": false,
                            "is_payment_failed": true,
                            "stripe_subscription": bson::to_bson(&snapshot).unwrap_or_default(),
                            "updated_at": DateTime::now(),
                        } },
                    )
                    .await?;

                warn!(
                    subscription_id = %subscription_id,
                    team = %team.slug,
                    "Invoice payment failed, subscription canceled"
                );
            }

            "customer.subscription.updated" => {
                let subscription_id = obj["id"].as_str().unwrap_or_default();
                let status = obj["status"].as_str().unwrap_or_default();

                let mut update = doc! {
                    "stripe_subscription.status": status,
                    "updated_at": DateTime::now(),
                };
                if let Some(period_end) = obj["current_period_end"].as_i64() {
                    update.insert("stripe_subscription.current_period_end", period_end);
                }

                db.collection::<Team>(Team::COLLECTION)
                    .update_one(
                        doc! { "stripe_subscription.id": subscription_id },
                        doc! { "$set": update },
                    )
                    .await?;

                info!(
                    subscription_id = %subscription_id,
                    status = %status,
                    "Subscription updated"
                );
            }

            "customer.subscription.deleted" => {
                let subscription_id = obj["id"].as_str().unwrap_or_default();

                db.collection::<Team>(Team::COLLECTION)
                    .update_one(
                        doc! { "stripe_subscription.id": subscription_id },
                        doc! { "$set": {
                            "is_subscription_active": false,
                            "stripe_subscription.status": "canceled",
                            "stripe_subscription.canceled_at": obj["canceled_at"].as_i64().unwrap_or_default(),
                            "updated_at": DateTime::now(),
                        } },
                    )
                    .await?;

                info!(subscription_id = %subscription_id, "Subscription deleted");
            }

            other => {
                info!(event_type = %other, "Unhandled Stripe webhook event");
            }
        }

        Ok(())
    }

    // ---- Helpers ---------------------------------------------------------

    async fn team_for_leader(
        &self,
        db: &mongodb::Database,
        team_id: ObjectId,
        user: &User,
    ) -> Result<Team, StripeError> {
        let team = db
            .collection::<Team>(Team::COLLECTION)
            .find_one(doc! { "_id": team_id })
            .await?
            .ok_or(StripeError::TeamNotFound)?;
        if user.id != Some(team.leader_id) {
            return Err(StripeError::NotTeamLeader);
        }
        Ok(team)
    }
}

fn check_api_error(resp: serde_json::Value) -> Result<serde_json::Value, StripeError> {
    if let Some(err) = resp.get("error") {
        return Err(StripeError::ApiError(
            err["message"]
                .as_str()
                .unwrap_or("Unknown Stripe error")
                .to_string(),
        ));
    }
    Ok(resp)
}

fn subscription_snapshot(sub: &serde_json::Value) -> StripeSubscription {
    StripeSubscription {
        id: sub["id"].as_str().unwrap_or_default().to_string(),
        status: sub["status"].as_str().unwrap_or_default().to_string(),
        current_period_end: sub["current_period_end"].as_i64(),
        canceled_at: sub["canceled_at"].as_i64(),
    }
}

fn invoice_snapshot(invoice: &serde_json::Value) -> StripeInvoice {
    StripeInvoice {
        id: invoice["id"].as_str().unwrap_or_default().to_string(),
        amount_paid: invoice["amount_paid"].as_i64().unwrap_or_default(),
        currency: invoice["currency"].as_str().unwrap_or_default().to_string(),
        status: invoice["status"].as_str().map(String::from),
        hosted_invoice_url: invoice["hosted_invoice_url"].as_str().map(String::from),
        created: invoice["created"].as_i64().unwrap_or_default(),
    }
}

fn card_snapshot(payment_method_id: &str, pm: &serde_json::Value) -> StripeCard {
    StripeCard {
        payment_method_id: payment_method_id.to_string(),
        brand: pm["card"]["brand"].as_str().unwrap_or("unknown").to_string(),
        last4: pm["card"]["last4"].as_str().unwrap_or_default().to_string(),
        exp_month: pm["card"]["exp_month"].as_u64().unwrap_or_default() as u8,
        exp_year: pm["card"]["exp_year"].as_u64().unwrap_or_default() as u16,
    }
}
