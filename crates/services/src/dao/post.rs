use bson::{DateTime, doc, oid::ObjectId};
use crewdeck_db::models::{Discussion, Post, Team};
use mongodb::Database;
use tracing::info;

use crate::content::{extract_file_refs, render_markdown};
use crate::storage::FileRef;

use super::base::{BaseDao, DaoError, DaoResult, PaginatedResult, PaginationParams};

pub struct PostDao {
    pub base: BaseDao<Post>,
    pub discussions: BaseDao<Discussion>,
    pub teams: BaseDao<Team>,
}

impl PostDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, Post::COLLECTION),
            discussions: BaseDao::new(db, Discussion::COLLECTION),
            teams: BaseDao::new(db, Team::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        discussion_id: ObjectId,
        acting: ObjectId,
        content: String,
    ) -> DaoResult<Post> {
        self.discussion_for_member(discussion_id, acting).await?;

        if content.trim().is_empty() {
            return Err(DaoError::Validation(
                "Post content cannot be empty".to_string(),
            ));
        }

        let html_content = render_markdown(&content);
        let now = DateTime::now();
        let post = Post {
            id: None,
            discussion_id,
            created_user_id: acting,
            content,
            html_content,
            is_edited: false,
            created_at: now,
            updated_at: now,
            last_updated_at: now,
        };

        let id = self.base.insert_one(&post).await?;
        self.base.find_by_id(id).await
    }

    /// Author-only, and the author must still be on the team. Re-renders the
    /// HTML and stamps the edit.
    pub async fn update_content(
        &self,
        post_id: ObjectId,
        acting: ObjectId,
        content: String,
    ) -> DaoResult<Post> {
        let post = self.author_post_in_team(post_id, acting).await?;

        if content.trim().is_empty() {
            return Err(DaoError::Validation(
                "Post content cannot be empty".to_string(),
            ));
        }

        let html_content = render_markdown(&content);
        self.base
            .update_by_id(
                post.id.unwrap(),
                doc! {
                    "$set": {
                        "content": &content,
                        "html_content": &html_content,
                        "is_edited": true,
                        "last_updated_at": DateTime::now(),
                    }
                },
            )
            .await?;
        self.base.find_by_id(post_id).await
    }

    /// Author-only. Returns the deleted post together with the storage
    /// references found in its content.
    pub async fn delete(
        &self,
        post_id: ObjectId,
        acting: ObjectId,
    ) -> DaoResult<(Post, Vec<FileRef>)> {
        let post = self.author_post_in_team(post_id, acting).await?;

        let refs = extract_file_refs(&post.html_content);
        self.base.hard_delete(doc! { "_id": post_id }).await?;

        info!(%post_id, "Post deleted");
        Ok((post, refs))
    }

    pub async fn find_for_member(&self, post_id: ObjectId, acting: ObjectId) -> DaoResult<Post> {
        let post = self.base.find_by_id(post_id).await?;
        self.discussion_for_member(post.discussion_id, acting).await?;
        Ok(post)
    }

    /// Pages through a discussion's posts in chronological order. The id
    /// tiebreak keeps page boundaries stable when timestamps collide.
    pub async fn find_in_discussion(
        &self,
        discussion_id: ObjectId,
        acting: ObjectId,
        params: &PaginationParams,
    ) -> DaoResult<PaginatedResult<Post>> {
        self.discussion_for_member(discussion_id, acting).await?;
        self.base
            .find_paginated(
                doc! { "discussion_id": discussion_id },
                Some(doc! { "created_at": 1, "_id": 1 }),
                params,
            )
            .await
    }

    async fn discussion_for_member(
        &self,
        discussion_id: ObjectId,
        user_id: ObjectId,
    ) -> DaoResult<Discussion> {
        let discussion = self.discussions.find_by_id(discussion_id).await?;
        if !discussion.member_ids.contains(&user_id) {
            return Err(DaoError::Forbidden("Not a discussion member".to_string()));
        }
        Ok(discussion)
    }

    async fn author_post_in_team(&self, post_id: ObjectId, acting: ObjectId) -> DaoResult<Post> {
        let post = self.base.find_by_id(post_id).await?;
        let discussion = self.discussions.find_by_id(post.discussion_id).await?;
        let team = self.teams.find_by_id(discussion.team_id).await?;

        if !team.member_ids.contains(&acting) {
            return Err(DaoError::Forbidden("Not a team member".to_string()));
        }
        if post.created_user_id != acting {
            return Err(DaoError::Forbidden(
                "Only the author can change a post".to_string(),
            ));
        }
        Ok(post)
    }
}
