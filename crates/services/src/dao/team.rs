use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_db::models::{Discussion, Invitation, Post, Team, User};
use mongodb::Database;
use tracing::info;

use crate::content::extract_file_refs;
use crate::storage::FileRef;

use super::base::{BaseDao, DaoError, DaoResult};
use super::slug::slugify;

pub struct TeamDao {
    pub base: BaseDao<Team>,
    pub users: BaseDao<User>,
    pub discussions: BaseDao<Discussion>,
    pub posts: BaseDao<Post>,
    pub invitations: BaseDao<Invitation>,
}

impl TeamDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Team::COLLECTION),
            users: BaseDao::new(db, User::COLLECTION),
            discussions: BaseDao::new(db, Discussion::COLLECTION),
            posts: BaseDao::new(db, Post::COLLECTION),
            invitations: BaseDao::new(db, Invitation::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        name: String,
        avatar_url: Option<String>,
        leader_id: ObjectId,
    ) -> DaoResult<Team> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DaoError::Validation("Team name cannot be empty".to_string()));
        }

        let slug = self.unique_slug(&name, None).await?;
        let now = DateTime::now();
        let team = Team {
            id: None,
            name,
            slug: slug.clone(),
            avatar_url,
            leader_id,
            member_ids: vec![leader_id],
            is_subscription_active: false,
            stripe_subscription: None,
            is_payment_failed: false,
            created_at: now,
            updated_at: now,
        };

        let team_id = self.base.insert_one(&team).await?;

        // The user's first team becomes their default
        self.users
            .update_one(
                doc! { "_id": leader_id, "default_team_slug": "" },
                doc! { "$set": { "default_team_slug": &slug } },
            )
            .await?;

        self.base.find_by_id(team_id).await
    }

    /// Leader-only. The slug is regenerated only on explicit request, so
    /// renames do not silently break shared links.
    pub async fn update(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
        name: Option<String>,
        avatar_url: Option<String>,
        regenerate_slug: bool,
    ) -> DaoResult<Team> {
        let team = self.ensure_leader(team_id, acting).await?;

        let mut set = doc! {};
        if let Some(ref name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DaoError::Validation("Team name cannot be empty".to_string()));
            }
            set.insert("name", name);
        }
        if regenerate_slug {
            let base = name.as_deref().unwrap_or(&team.name);
            let slug = self.unique_slug(base, Some(team_id)).await?;
            set.insert("slug", slug);
        }
        if let Some(url) = avatar_url {
            set.insert("avatar_url", url);
        }

        if !set.is_empty() {
            self.base.update_by_id(team_id, doc! { "$set": set }).await?;
        }
        self.base.find_by_id(team_id).await
    }

    /// Leader-only. Deletes the team's discussions, their posts and
    /// invitations, then the team itself, returning the deleted team and
    /// the storage references found in post content for cleanup by the
    /// caller.
    pub async fn delete(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<(Team, Vec<FileRef>)> {
        let team = self.ensure_leader(team_id, acting).await?;

        let discussions = self
            .discussions
            .find_many(doc! { "team_id": team_id }, None)
            .await?;
        let discussion_ids: Vec<ObjectId> = discussions.iter().filter_map(|d| d.id).collect();

        let mut refs = Vec::new();
        if !discussion_ids.is_empty() {
            let posts = self
                .posts
                .find_many(doc! { "discussion_id": { "$in": &discussion_ids } }, None)
                .await?;
            for post in &posts {
                refs.extend(extract_file_refs(&post.html_content));
            }
            self.posts
                .hard_delete(doc! { "discussion_id": { "$in": &discussion_ids } })
                .await?;
        }
        if let Some(ref url) = team.avatar_url {
            refs.extend(FileRef::from_url(url));
        }

        self.invitations
            .hard_delete(doc! { "team_id": team_id })
            .await?;
        self.discussions
            .hard_delete(doc! { "team_id": team_id })
            .await?;
        self.base.hard_delete(doc! { "_id": team_id }).await?;

        info!(%team_id, discussions = discussions.len(), "Team deleted");
        Ok((team, refs))
    }

    /// Leader-only; the leader themselves cannot be removed. Also pulls the
    /// user from every discussion member list, keeping those lists inside
    /// the team member set.
    pub async fn remove_member(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
        member_id: ObjectId,
    ) -> DaoResult<Team> {
        let team = self.ensure_leader(team_id, acting).await?;
        if member_id == team.leader_id {
            return Err(DaoError::Validation(
                "The team leader cannot be removed".to_string(),
            ));
        }
        if !team.member_ids.contains(&member_id) {
            return Err(DaoError::NotFound);
        }

        self.base
            .update_by_id(team_id, doc! { "$pull": { "member_ids": member_id } })
            .await?;
        self.discussions
            .collection()
            .update_many(
                doc! { "team_id": team_id },
                doc! {
                    "$pull": { "member_ids": member_id },
                    "$set": { "updated_at": DateTime::now() },
                },
            )
            .await?;

        info!(%team_id, %member_id, "Member removed from team");
        self.base.find_by_id(team_id).await
    }

    pub async fn find_by_slug(&self, slug: &str) -> DaoResult<Team> {
        self.base
            .find_one(doc! { "slug": slug })
            .await?
            .ok_or(DaoError::NotFound)
    }

    pub async fn find_user_teams(&self, user_id: ObjectId) -> DaoResult<Vec<Team>> {
        self.base
            .find_many(doc! { "member_ids": user_id }, Some(doc! { "name": 1 }))
            .await
    }

    pub async fn find_members(&self, team_id: ObjectId, acting: ObjectId) -> DaoResult<Vec<User>> {
        let team = self.ensure_member(team_id, acting).await?;
        self.users
            .find_many(
                doc! { "_id": { "$in": &team.member_ids } },
                Some(doc! { "display_name": 1 }),
            )
            .await
    }

    pub async fn ensure_leader(&self, team_id: ObjectId, user_id: ObjectId) -> DaoResult<Team> {
        let team = self.base.find_by_id(team_id).await?;
        if team.leader_id != user_id {
            return Err(DaoError::Forbidden(
                "Only the team leader can do this".to_string(),
            ));
        }
        Ok(team)
    }

    pub async fn ensure_member(&self, team_id: ObjectId, user_id: ObjectId) -> DaoResult<Team> {
        let team = self.base.find_by_id(team_id).await?;
        if !team.member_ids.contains(&user_id) {
            return Err(DaoError::Forbidden("Not a team member".to_string()));
        }
        Ok(team)
    }

    pub async fn is_member(&self, team_id: ObjectId, user_id: ObjectId) -> DaoResult<bool> {
        let count = self
            .base
            .count(doc! { "_id": team_id, "member_ids": user_id })
            .await?;
        Ok(count > 0)
    }

    async fn unique_slug(&self, base: &str, exclude: Option<ObjectId>) -> DaoResult<String> {
        let base = match slugify(base) {
            s if s.is_empty() => "team".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut suffix = 1u32;
        loop {
            let mut filter = doc! { "slug": &candidate };
            if let Some(id) = exclude {
                filter.insert("_id", doc! { "$ne": id });
            }
            if self.base.count(filter).await? == 0 {
                return Ok(candidate);
            }
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
    }
}
