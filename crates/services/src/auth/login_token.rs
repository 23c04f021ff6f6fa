use async_trait::async_trait;
use bson::{Bson, DateTime, doc, oid::ObjectId};
use crewdeck_db::models::LoginToken;
use mongodb::Database;
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::dao::{BaseDao, DaoResult};

/// Magic-link tokens die after an hour.
const LOGIN_TOKEN_TTL_SECS: i64 = 60 * 60;

/// Mints the random token that goes into the magic link. Only its hash is
/// ever stored.
pub fn generate_login_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_login_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Storage seam for pending magic-link logins.
#[async_trait]
pub trait LoginTokenStore: Send + Sync {
    /// Records a pending login, replacing any earlier one for the user.
    async fn store_or_update(
        &self,
        user_id: ObjectId,
        token: &str,
        invitation_token: Option<String>,
    ) -> DaoResult<()>;

    /// Redeems a (user, token) pair exactly once; returns the consumed
    /// record, or None when it does not match or has expired.
    async fn authenticate(
        &self,
        user_id: ObjectId,
        token: &str,
    ) -> DaoResult<Option<LoginToken>>;

    /// Drops whatever pending login the user has.
    async fn invalidate(&self, user_id: ObjectId) -> DaoResult<()>;
}

pub struct MongoLoginTokenStore {
    tokens: BaseDao<LoginToken>,
}

impl MongoLoginTokenStore {
    pub fn new(db: &Database) -> Self {
        Self {
            tokens: BaseDao::new(db, LoginToken::COLLECTION),
        }
    }
}

#[async_trait]
impl LoginTokenStore for MongoLoginTokenStore {
    async fn store_or_update(
        &self,
        user_id: ObjectId,
        token: &str,
        invitation_token: Option<String>,
    ) -> DaoResult<()> {
        let now = DateTime::now();
        let expires_at =
            DateTime::from_millis(now.timestamp_millis() + LOGIN_TOKEN_TTL_SECS * 1000);

        self.tokens
            .collection()
            .update_one(
                doc! { "user_id": user_id },
                doc! {
                    "$set": {
                        "token_hash": hash_login_token(token),
                        "invitation_token": invitation_token.map_or(Bson::Null, Bson::String),
                        "expires_at": expires_at,
                    },
                    "$setOnInsert": {
                        "created_at": now,
                    },
                },
            )
            .upsert(true)
            .await?;
        Ok(())
    }

    async fn authenticate(
        &self,
        user_id: ObjectId,
        token: &str,
    ) -> DaoResult<Option<LoginToken>> {
        let record = self
            .tokens
            .find_one(doc! {
                "user_id": user_id,
                "token_hash": hash_login_token(token),
                "expires_at": { "$gt": DateTime::now() },
            })
            .await?;

        let Some(record) = record else {
            return Ok(None);
        };

        // Single use: the record dies with the redemption
        self.tokens
            .hard_delete(doc! { "_id": record.id.unwrap() })
            .await?;
        Ok(Some(record))
    }

    async fn invalidate(&self, user_id: ObjectId) -> DaoResult<()> {
        self.tokens.hard_delete(doc! { "user_id": user_id }).await?;
        Ok(())
    }
}
