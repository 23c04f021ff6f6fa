use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_db::models::{Invitation, Team, User};
use mongodb::Database;
use nanoid::nanoid;
use tracing::info;
use validator::ValidateEmail;

use super::base::{BaseDao, DaoError, DaoResult};
use super::user::normalize_email;

/// Pending invitations live for a day before the TTL index reaps them.
const INVITATION_TTL_SECS: i64 = 24 * 60 * 60;

pub struct InvitationDao {
    pub base: BaseDao<Invitation>,
    pub teams: BaseDao<Team>,
    pub users: BaseDao<User>,
}

impl InvitationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Invitation::COLLECTION),
            teams: BaseDao::new(db, Team::COLLECTION),
            users: BaseDao::new(db, User::COLLECTION),
        }
    }

    /// Leader-only and idempotent: a pending invitation for the same address
    /// is returned as-is (same token), with its expiry pushed out.
    pub async fn create(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
        email: &str,
    ) -> DaoResult<Invitation> {
        let team = self.teams.find_by_id(team_id).await?;
        if team.leader_id != acting {
            return Err(DaoError::Forbidden(
                "Only the team leader can invite".to_string(),
            ));
        }

        let email = normalize_email(email);
        if !email.validate_email() {
            return Err(DaoError::Validation(
                "A valid e-mail address is required".to_string(),
            ));
        }

        // Addresses already on the team are bad input, not a pending invite
        if let Some(user) = self.users.find_one(doc! { "email": &email }).await? {
            if team.member_ids.contains(&user.id.unwrap()) {
                return Err(DaoError::Validation("Already a team member".to_string()));
            }
        }

        if let Some(existing) = self
            .base
            .find_one(doc! { "team_id": team_id, "email": &email })
            .await?
        {
            let id = existing.id.unwrap();
            self.base
                .update_by_id(id, doc! { "$set": { "expires_at": expiry() } })
                .await?;
            return self.base.find_by_id(id).await;
        }

        // The token index is unique; retry on collision
        loop {
            let invitation = Invitation {
                id: None,
                team_id,
                email: email.clone(),
                token: nanoid!(32),
                created_at: DateTime::now(),
                expires_at: expiry(),
            };
            match self.base.insert_one(&invitation).await {
                Ok(id) => {
                    info!(%team_id, email = %invitation.email, "Invitation created");
                    return self.base.find_by_id(id).await;
                }
                Err(DaoError::DuplicateKey(_)) => {
                    // A concurrent create for the same address may have won;
                    // hand back its invitation instead of a fresh token
                    if let Some(existing) = self
                        .base
                        .find_one(doc! { "team_id": team_id, "email": &email })
                        .await?
                    {
                        return Ok(existing);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn find_by_token(&self, token: &str) -> DaoResult<Invitation> {
        self.base
            .find_one(doc! { "token": token, "expires_at": { "$gt": DateTime::now() } })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn list_for_team(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<Vec<Invitation>> {
        let team = self.teams.find_by_id(team_id).await?;
        if team.leader_id != acting {
            return Err(DaoError::Forbidden(
                "Only the team leader can list invitations".to_string(),
            ));
        }
        self.base
            .find_many(doc! { "team_id": team_id }, Some(doc! { "created_at": -1 }))
            .await
    }

    pub async fn revoke(&self, invitation_id: ObjectId, acting: ObjectId) -> DaoResult<()> {
        let invitation = self.base.find_by_id(invitation_id).await?;
        let team = self.teams.find_by_id(invitation.team_id).await?;
        if team.leader_id != acting {
            return Err(DaoError::Forbidden(
                "Only the team leader can revoke an invitation".to_string(),
            ));
        }
        self.base.hard_delete(doc! { "_id": invitation_id }).await?;
        Ok(())
    }

    /// Consumes the token at login time: the e-mail must match, the
    /// invitation is deleted, the user joins the team, and their default
    /// team slug is set if they have none. Returns the team for the
    /// post-login redirect.
    pub async fn accept(&self, token: &str, user: &User) -> DaoResult<Team> {
        let invitation = self.find_by_token(token).await?;
        if invitation.email != user.email {
            return Err(DaoError::Forbidden(
                "This invitation was issued for a different address".to_string(),
            ));
        }

        let team_id = invitation.team_id;
        let team = self.teams.find_by_id(team_id).await?;
        let user_id = user.id.unwrap();

        self.teams
            .update_by_id(team_id, doc! { "$addToSet": { "member_ids": user_id } })
            .await?;
        self.base
            .hard_delete(doc! { "_id": invitation.id.unwrap() })
            .await?;
        self.users
            .update_one(
                doc! { "_id": user_id, "default_team_slug": "" },
                doc! { "$set": { "default_team_slug": &team.slug } },
            )
            .await?;

        info!(%team_id, %user_id, "Invitation accepted");
        self.teams.find_by_id(team_id).await
    }
}

fn expiry() -> DateTime {
    DateTime::from_millis(DateTime::now().timestamp_millis() + INVITATION_TTL_SECS * 1000)
}
