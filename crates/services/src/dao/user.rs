use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_db::models::User;
use mongodb::Database;
use validator::ValidateEmail;

use super::base::{BaseDao, DaoError, DaoResult};
use super::slug::slugify;

pub struct UserDao {
    pub base: BaseDao<User>,
}

impl UserDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, User::COLLECTION),
        }
    }

    /// Finds the account for an e-mail address, creating one on first login.
    /// New accounts take their display name from the address local part.
    pub async fn ensure_by_email(&self, email: &str) -> DaoResult<User> {
        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(DaoError::Validation(
                "A valid e-mail address is required".to_string(),
            ));
        }
        if let Some(user) = self.base.find_one(doc! { "email": &email }).await? {
            return Ok(user);
        }

        let display_name = email.split('@').next().unwrap_or("user").to_string();
        self.create(&email, &display_name, None, None, false).await
    }

    /// Resolves a Google sign-in to an account: by google_id first, then by
    /// e-mail (linking the Google identity), creating the account last.
    pub async fn ensure_by_google(
        &self,
        google_id: &str,
        email: &str,
        display_name: &str,
        avatar_url: Option<&str>,
    ) -> DaoResult<User> {
        let email = normalize_email(email);

        if let Some(user) = self
            .base
            .find_one(doc! { "google_id": google_id })
            .await?
        {
            let id = user.id.unwrap();
            let mut set = doc! {};
            if !display_name.is_empty() {
                set.insert("display_name", display_name);
            }
            if let Some(url) = avatar_url {
                set.insert("avatar_url", url);
            }
            if set.is_empty() {
                return Ok(user);
            }
            self.base.update_by_id(id, doc! { "$set": set }).await?;
            return self.base.find_by_id(id).await;
        }

        if let Some(user) = self.base.find_one(doc! { "email": &email }).await? {
            // Link the Google identity to the existing account
            let id = user.id.unwrap();
            let mut set = doc! { "google_id": google_id };
            if !display_name.is_empty() {
                set.insert("display_name", display_name);
            }
            if let Some(url) = avatar_url {
                set.insert("avatar_url", url);
            }
            self.base.update_by_id(id, doc! { "$set": set }).await?;
            return self.base.find_by_id(id).await;
        }

        self.create(&email, display_name, Some(google_id), avatar_url, true)
            .await
    }

    async fn create(
        &self,
        email: &str,
        display_name: &str,
        google_id: Option<&str>,
        avatar_url: Option<&str>,
        via_google: bool,
    ) -> DaoResult<User> {
        let slug = self.unique_slug(display_name).await?;
        let now = DateTime::now();
        let user = User {
            id: None,
            email: email.to_string(),
            display_name: display_name.to_string(),
            slug,
            avatar_url: avatar_url.map(|s| s.to_string()),
            google_id: google_id.map(|s| s.to_string()),
            is_signed_up_via_google: via_google,
            default_team_slug: String::new(),
            stripe_customer: None,
            stripe_card: None,
            has_card_information: false,
            stripe_invoices: Vec::new(),
            welcome_email_sent: false,
            created_at: now,
            updated_at: now,
        };

        let id = self.base.insert_one(&user).await?;
        self.base.find_by_id(id).await
    }

    pub async fn update_profile(
        &self,
        user_id: ObjectId,
        display_name: Option<String>,
        avatar_url: Option<String>,
    ) -> DaoResult<User> {
        let mut set = doc! {};
        if let Some(name) = display_name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DaoError::Validation(
                    "Display name cannot be empty".to_string(),
                ));
            }
            set.insert("display_name", name);
        }
        if let Some(url) = avatar_url {
            set.insert("avatar_url", url);
        }

        if !set.is_empty() {
            self.base.update_by_id(user_id, doc! { "$set": set }).await?;
        }
        self.base.find_by_id(user_id).await
    }

    /// Returns true only when the flag was still unset; the caller sends the
    /// welcome mail on true.
    pub async fn mark_welcome_email_sent(&self, user_id: ObjectId) -> DaoResult<bool> {
        self.base
            .update_one(
                doc! { "_id": user_id, "welcome_email_sent": false },
                doc! { "$set": { "welcome_email_sent": true } },
            )
            .await
    }

    async fn unique_slug(&self, base: &str) -> DaoResult<String> {
        let base = match slugify(base) {
            s if s.is_empty() => "user".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut suffix = 1u32;
        while self.base.count(doc! { "slug": &candidate }).await? > 0 {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        Ok(candidate)
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
