use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_db::models::{Discussion, NotificationType, Post, Team};
use mongodb::Database;
use tracing::info;

use crate::content::extract_file_refs;
use crate::storage::FileRef;

use super::base::{BaseDao, DaoError, DaoResult};
use super::slug::slugify;

pub struct DiscussionDao {
    pub base: BaseDao<Discussion>,
    pub teams: BaseDao<Team>,
    pub posts: BaseDao<Post>,
}

impl DiscussionDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Discussion::COLLECTION),
            teams: BaseDao::new(db, Team::COLLECTION),
            posts: BaseDao::new(db, Post::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
        name: String,
        member_ids: Vec<ObjectId>,
        notification_type: NotificationType,
    ) -> DaoResult<Discussion> {
        let team = self.team_for_member(team_id, acting).await?;

        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(DaoError::Validation(
                "Discussion name cannot be empty".to_string(),
            ));
        }

        let members = merge_members(acting, member_ids, &team.member_ids)?;
        let slug = self.unique_slug(team_id, &name).await?;
        let now = DateTime::now();
        let discussion = Discussion {
            id: None,
            team_id,
            name,
            slug,
            member_ids: members,
            notification_type,
            created_user_id: acting,
            created_at: now,
            updated_at: now,
        };

        let id = self.base.insert_one(&discussion).await?;
        self.base.find_by_id(id).await
    }

    /// Any team member may edit. The slug never changes on rename.
    pub async fn update(
        &self,
        discussion_id: ObjectId,
        acting: ObjectId,
        name: Option<String>,
        member_ids: Option<Vec<ObjectId>>,
        notification_type: Option<NotificationType>,
    ) -> DaoResult<Discussion> {
        let discussion = self.base.find_by_id(discussion_id).await?;
        let team = self.team_for_member(discussion.team_id, acting).await?;

        let mut set = doc! {};
        if let Some(name) = name {
            let name = name.trim();
            if name.is_empty() {
                return Err(DaoError::Validation(
                    "Discussion name cannot be empty".to_string(),
                ));
            }
            set.insert("name", name);
        }
        if let Some(requested) = member_ids {
            let members = merge_members(acting, requested, &team.member_ids)?;
            set.insert("member_ids", members);
        }
        if let Some(nt) = notification_type {
            set.insert("notification_type", bson::to_bson(&nt)?);
        }

        if !set.is_empty() {
            self.base
                .update_by_id(discussion_id, doc! { "$set": set })
                .await?;
        }
        self.base.find_by_id(discussion_id).await
    }

    /// Any team member may delete. Removes the discussion's posts with it,
    /// returning the deleted discussion and the storage references found in
    /// their content.
    pub async fn delete(
        &self,
        discussion_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<(Discussion, Vec<FileRef>)> {
        let discussion = self.base.find_by_id(discussion_id).await?;
        self.team_for_member(discussion.team_id, acting).await?;

        let posts = self
            .posts
            .find_many(doc! { "discussion_id": discussion_id }, None)
            .await?;
        let mut refs = Vec::new();
        for post in &posts {
            refs.extend(extract_file_refs(&post.html_content));
        }

        self.posts
            .hard_delete(doc! { "discussion_id": discussion_id })
            .await?;
        self.base.hard_delete(doc! { "_id": discussion_id }).await?;

        info!(%discussion_id, posts = posts.len(), "Discussion deleted");
        Ok((discussion, refs))
    }

    /// Lists only the discussions the user is on; team membership alone
    /// does not reveal the rest.
    pub async fn find_by_team(
        &self,
        team_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<Vec<Discussion>> {
        self.team_for_member(team_id, acting).await?;
        self.base
            .find_many(
                doc! { "team_id": team_id, "member_ids": acting },
                Some(doc! { "created_at": -1 }),
            )
            .await
    }

    pub async fn find_for_member(
        &self,
        discussion_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<Discussion> {
        let discussion = self.base.find_by_id(discussion_id).await?;
        if !discussion.member_ids.contains(&acting) {
            return Err(DaoError::Forbidden("Not a discussion member".to_string()));
        }
        Ok(discussion)
    }

    pub async fn find_by_slug(
        &self,
        team_id: ObjectId,
        slug: &str,
        acting: ObjectId,
    ) -> DaoResult<Discussion> {
        let discussion = self
            .base
            .find_one(doc! { "team_id": team_id, "slug": slug })
            .await?
            .ok_or(DaoError::NotFound)?;
        if !discussion.member_ids.contains(&acting) {
            return Err(DaoError::Forbidden("Not a discussion member".to_string()));
        }
        Ok(discussion)
    }

    async fn team_for_member(&self, team_id: ObjectId, user_id: ObjectId) -> DaoResult<Team> {
        let team = self.teams.find_by_id(team_id).await?;
        if !team.member_ids.contains(&user_id) {
            return Err(DaoError::Forbidden("Not a team member".to_string()));
        }
        Ok(team)
    }

    async fn unique_slug(&self, team_id: ObjectId, base: &str) -> DaoResult<String> {
        let base = match slugify(base) {
            s if s.is_empty() => "discussion".to_string(),
            s => s,
        };

        let mut candidate = base.clone();
        let mut suffix = 1u32;
        while self
            .base
            .count(doc! { "team_id": team_id, "slug": &candidate })
            .await?
            > 0
        {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        Ok(candidate)
    }
}

/// Builds the stored member list: the acting user first, then the requested
/// ids in order, deduplicated. Every requested id must be a team member.
fn merge_members(
    acting: ObjectId,
    requested: Vec<ObjectId>,
    team_members: &[ObjectId],
) -> DaoResult<Vec<ObjectId>> {
    let mut members = vec![acting];
    for id in requested {
        if !team_members.contains(&id) {
            return Err(DaoError::Validation(
                "Discussion members must belong to the team".to_string(),
            ));
        }
        if !members.contains(&id) {
            members.push(id);
        }
    }
    Ok(members)
}
