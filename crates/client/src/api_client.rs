use std::sync::Arc;

use crewdeck_realtime::{
    ActionType, DiscussionDto, EntityEvent, InvitationDto, InvoiceDto, NotificationType, PostDto,
    ServerEvent, TeamDto, UserDto,
};
use parking_lot::RwLock;
use reqwest::{Client, Method, RequestBuilder, redirect};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{error::ClientError, store::Store};

/// Mirrors the server's page size so loads line up with what the API
/// would hand an unparameterized request.
const DEFAULT_PAGE_SIZE: u64 = 25;

/// Typed REST client. Every mutation feeds the server's returned payload
/// (never the caller's input) back into the store, through the same
/// reconciliation path realtime events use.
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
    socket_id: RwLock<Option<String>>,
    store: Arc<Store>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostPage {
    pub items: Vec<PostDto>,
    pub total: u64,
    pub page: u64,
    pub per_page: u64,
    pub total_pages: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutSession {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PresignedUpload {
    pub upload_url: String,
    pub asset_url: String,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadKind {
    Post,
    Avatar,
    Logo,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: String,
}

impl ApiClient {
    /// Redirects are part of the API surface here (login sets its cookie
    /// on a redirect, `/api/file` answers with a presigned URL), so the
    /// client reads them instead of following.
    pub fn new(base_url: impl Into<String>, store: Arc<Store>) -> Result<Self, ClientError> {
        let http = Client::builder().redirect(redirect::Policy::none()).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: RwLock::new(None),
            socket_id: RwLock::new(None),
            store,
        })
    }

    pub fn store(&self) -> Arc<Store> {
        Arc::clone(&self.store)
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn set_token(&self, token: impl Into<String>) {
        *self.token.write() = Some(token.into());
    }

    /// Recorded from the websocket hello; mutations echo it so the server
    /// can skip fanning events back to this connection.
    pub fn set_socket_id(&self, socket_id: impl Into<String>) {
        *self.socket_id.write() = Some(socket_id.into());
    }

    // ---- Auth ------------------------------------------------------------

    pub async fn request_login_link(
        &self,
        email: &str,
        invitation_token: Option<&str>,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(Method::POST, "/auth/email-login-link")
            .json(&json!({ "email": email, "invitation_token": invitation_token }))
            .send()
            .await?;
        Self::parse::<serde_json::Value>(resp).await?;
        Ok(())
    }

    /// Redeems the (uid, token) pair from a magic link, captures the
    /// session cookie as the bearer token and loads the profile.
    pub async fn login_with_link(&self, uid: &str, token: &str) -> Result<UserDto, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/auth/logged_in?token={token}&uid={uid}"))
            .send()
            .await?;
        if resp.status().is_client_error() || resp.status().is_server_error() {
            return Err(Self::error_from(resp).await);
        }

        let session = resp
            .cookies()
            .find(|cookie| cookie.name() == "access_token")
            .map(|cookie| cookie.value().to_string())
            .ok_or(ClientError::NotLoggedIn)?;
        self.set_token(session);
        self.fetch_me().await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        let resp = self.request(Method::POST, "/auth/logout").send().await?;
        Self::parse::<serde_json::Value>(resp).await?;
        *self.token.write() = None;
        self.store.clear();
        Ok(())
    }

    // ---- Profile ---------------------------------------------------------

    pub async fn fetch_me(&self) -> Result<UserDto, ClientError> {
        let resp = self.request(Method::GET, "/api/me").send().await?;
        let user: UserDto = Self::parse(resp).await?;
        self.store.set_user(user.clone());
        Ok(user)
    }

    pub async fn update_profile(
        &self,
        display_name: Option<&str>,
        avatar_url: Option<&str>,
    ) -> Result<UserDto, ClientError> {
        let resp = self
            .request(Method::PUT, "/api/me")
            .json(&json!({ "display_name": display_name, "avatar_url": avatar_url }))
            .send()
            .await?;
        let user: UserDto = Self::parse(resp).await?;
        self.store.set_user(user.clone());
        Ok(user)
    }

    // ---- Teams -----------------------------------------------------------

    pub async fn load_teams(&self) -> Result<(), ClientError> {
        if !self.store.begin_loading_teams() {
            return Ok(());
        }
        match self.fetch_teams().await {
            Ok(teams) => {
                self.store.set_teams(teams);
                Ok(())
            }
            Err(e) => {
                self.store.abort_loading_teams();
                Err(e)
            }
        }
    }

    pub async fn refresh_teams(&self) -> Result<(), ClientError> {
        let teams = self.fetch_teams().await?;
        self.store.set_teams(teams);
        Ok(())
    }

    pub async fn fetch_team(&self, team_id: &str) -> Result<TeamDto, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/team/{team_id}"))
            .send()
            .await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Edited, &team);
        Ok(team)
    }

    pub async fn fetch_team_by_slug(&self, slug: &str) -> Result<TeamDto, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/team/slug/{slug}"))
            .send()
            .await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Edited, &team);
        Ok(team)
    }

    pub async fn create_team(
        &self,
        name: &str,
        avatar_url: Option<&str>,
    ) -> Result<TeamDto, ClientError> {
        let resp = self
            .request(Method::POST, "/api/team")
            .json(&json!({
                "name": name,
                "avatar_url": avatar_url,
                "socket_id": self.socket_id(),
            }))
            .send()
            .await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Added, &team);
        Ok(team)
    }

    pub async fn update_team(
        &self,
        team_id: &str,
        name: Option<&str>,
        avatar_url: Option<&str>,
        regenerate_slug: bool,
    ) -> Result<TeamDto, ClientError> {
        let resp = self
            .request(Method::PUT, &format!("/api/team/{team_id}"))
            .json(&json!({
                "name": name,
                "avatar_url": avatar_url,
                "regenerate_slug": regenerate_slug,
                "socket_id": self.socket_id(),
            }))
            .send()
            .await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Edited, &team);
        Ok(team)
    }

    pub async fn delete_team(&self, team_id: &str) -> Result<(), ClientError> {
        let path = self.with_socket_id(&format!("/api/team/{team_id}"));
        let resp = self.request(Method::DELETE, &path).send().await?;
        Self::parse::<serde_json::Value>(resp).await?;
        self.store.remove_team(team_id);
        Ok(())
    }

    pub async fn team_members(&self, team_id: &str) -> Result<Vec<UserDto>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/team/{team_id}/member"))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn remove_member(
        &self,
        team_id: &str,
        member_id: &str,
    ) -> Result<TeamDto, ClientError> {
        let path = self.with_socket_id(&format!("/api/team/{team_id}/member/{member_id}"));
        let resp = self.request(Method::DELETE, &path).send().await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Edited, &team);
        Ok(team)
    }

    // ---- Invitations -----------------------------------------------------

    pub async fn list_invitations(&self, team_id: &str) -> Result<Vec<InvitationDto>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/team/{team_id}/invitation"))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn invite_member(
        &self,
        team_id: &str,
        email: &str,
    ) -> Result<InvitationDto, ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/team/{team_id}/invitation"))
            .json(&json!({ "email": email }))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn revoke_invitation(
        &self,
        team_id: &str,
        invitation_id: &str,
    ) -> Result<(), ClientError> {
        let resp = self
            .request(
                Method::DELETE,
                &format!("/api/team/{team_id}/invitation/{invitation_id}"),
            )
            .send()
            .await?;
        Self::parse::<serde_json::Value>(resp).await?;
        Ok(())
    }

    // ---- Discussions -----------------------------------------------------

    pub async fn load_discussions(&self, team_id: &str) -> Result<(), ClientError> {
        if !self.store.begin_loading_discussions(team_id) {
            return Ok(());
        }
        match self.fetch_discussions(team_id).await {
            Ok(discussions) => {
                self.store.set_discussions(team_id, discussions);
                Ok(())
            }
            Err(e) => {
                self.store.abort_loading_discussions(team_id);
                Err(e)
            }
        }
    }

    pub async fn refresh_discussions(&self, team_id: &str) -> Result<(), ClientError> {
        let discussions = self.fetch_discussions(team_id).await?;
        self.store.set_discussions(team_id, discussions);
        Ok(())
    }

    pub async fn fetch_discussion(
        &self,
        team_id: &str,
        discussion_id: &str,
    ) -> Result<DiscussionDto, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/api/team/{team_id}/discussion/{discussion_id}"),
            )
            .send()
            .await?;
        let discussion: DiscussionDto = Self::parse(resp).await?;
        self.apply_discussion(ActionType::Edited, &discussion);
        Ok(discussion)
    }

    pub async fn fetch_discussion_by_slug(
        &self,
        team_id: &str,
        slug: &str,
    ) -> Result<DiscussionDto, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/api/team/{team_id}/discussion/slug/{slug}"),
            )
            .send()
            .await?;
        let discussion: DiscussionDto = Self::parse(resp).await?;
        self.apply_discussion(ActionType::Edited, &discussion);
        Ok(discussion)
    }

    pub async fn create_discussion(
        &self,
        team_id: &str,
        name: &str,
        member_ids: &[String],
        notification_type: Option<NotificationType>,
    ) -> Result<DiscussionDto, ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/team/{team_id}/discussion"))
            .json(&json!({
                "name": name,
                "member_ids": member_ids,
                "notification_type": notification_type,
                "socket_id": self.socket_id(),
            }))
            .send()
            .await?;
        let discussion: DiscussionDto = Self::parse(resp).await?;
        self.apply_discussion(ActionType::Added, &discussion);
        Ok(discussion)
    }

    pub async fn update_discussion(
        &self,
        team_id: &str,
        discussion_id: &str,
        name: Option<&str>,
        member_ids: Option<&[String]>,
        notification_type: Option<NotificationType>,
    ) -> Result<DiscussionDto, ClientError> {
        let resp = self
            .request(
                Method::PUT,
                &format!("/api/team/{team_id}/discussion/{discussion_id}"),
            )
            .json(&json!({
                "name": name,
                "member_ids": member_ids,
                "notification_type": notification_type,
                "socket_id": self.socket_id(),
            }))
            .send()
            .await?;
        let discussion: DiscussionDto = Self::parse(resp).await?;
        self.apply_discussion(ActionType::Edited, &discussion);
        Ok(discussion)
    }

    pub async fn delete_discussion(
        &self,
        team_id: &str,
        discussion_id: &str,
    ) -> Result<(), ClientError> {
        let path = self.with_socket_id(&format!("/api/team/{team_id}/discussion/{discussion_id}"));
        let resp = self.request(Method::DELETE, &path).send().await?;
        Self::parse::<serde_json::Value>(resp).await?;
        self.store.remove_discussion(discussion_id);
        Ok(())
    }

    // ---- Posts -----------------------------------------------------------

    pub async fn load_posts(&self, discussion_id: &str) -> Result<(), ClientError> {
        if !self.store.begin_loading_posts(discussion_id) {
            return Ok(());
        }
        match self
            .fetch_posts_page(discussion_id, 1, DEFAULT_PAGE_SIZE)
            .await
        {
            Ok(page) => {
                self.store.set_posts(discussion_id, page.items);
                Ok(())
            }
            Err(e) => {
                self.store.abort_loading_posts(discussion_id);
                Err(e)
            }
        }
    }

    pub async fn refresh_posts(&self, discussion_id: &str) -> Result<(), ClientError> {
        let page = self
            .fetch_posts_page(discussion_id, 1, DEFAULT_PAGE_SIZE)
            .await?;
        self.store.set_posts(discussion_id, page.items);
        Ok(())
    }

    /// Later pages merge into the mirror instead of replacing it.
    pub async fn load_more_posts(
        &self,
        discussion_id: &str,
        page: u64,
    ) -> Result<PostPage, ClientError> {
        let page = self
            .fetch_posts_page(discussion_id, page, DEFAULT_PAGE_SIZE)
            .await?;
        for post in &page.items {
            self.apply_post(ActionType::Added, post);
        }
        Ok(page)
    }

    pub async fn fetch_posts_page(
        &self,
        discussion_id: &str,
        page: u64,
        per_page: u64,
    ) -> Result<PostPage, ClientError> {
        let resp = self
            .request(
                Method::GET,
                &format!("/api/discussion/{discussion_id}/post?page={page}&per_page={per_page}"),
            )
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn create_post(
        &self,
        discussion_id: &str,
        content: &str,
    ) -> Result<PostDto, ClientError> {
        let resp = self
            .request(Method::POST, &format!("/api/discussion/{discussion_id}/post"))
            .json(&json!({ "content": content, "socket_id": self.socket_id() }))
            .send()
            .await?;
        let post: PostDto = Self::parse(resp).await?;
        self.apply_post(ActionType::Added, &post);
        Ok(post)
    }

    pub async fn update_post(
        &self,
        discussion_id: &str,
        post_id: &str,
        content: &str,
    ) -> Result<PostDto, ClientError> {
        let resp = self
            .request(
                Method::PUT,
                &format!("/api/discussion/{discussion_id}/post/{post_id}"),
            )
            .json(&json!({ "content": content, "socket_id": self.socket_id() }))
            .send()
            .await?;
        let post: PostDto = Self::parse(resp).await?;
        self.apply_post(ActionType::Edited, &post);
        Ok(post)
    }

    pub async fn delete_post(&self, discussion_id: &str, post_id: &str) -> Result<(), ClientError> {
        let path = self.with_socket_id(&format!("/api/discussion/{discussion_id}/post/{post_id}"));
        let resp = self.request(Method::DELETE, &path).send().await?;
        Self::parse::<serde_json::Value>(resp).await?;
        self.store.remove_post(discussion_id, post_id);
        Ok(())
    }

    // ---- Billing ---------------------------------------------------------

    pub async fn start_subscription_checkout(
        &self,
        team_id: &str,
    ) -> Result<CheckoutSession, ClientError> {
        let resp = self
            .request(Method::POST, "/api/stripe/checkout/subscription")
            .json(&json!({ "team_id": team_id }))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn start_setup_checkout(&self, team_id: &str) -> Result<CheckoutSession, ClientError> {
        let resp = self
            .request(Method::POST, "/api/stripe/checkout/setup")
            .json(&json!({ "team_id": team_id }))
            .send()
            .await?;
        Self::parse(resp).await
    }

    pub async fn cancel_subscription(&self, team_id: &str) -> Result<TeamDto, ClientError> {
        let resp = self
            .request(Method::POST, "/api/stripe/subscription/cancel")
            .json(&json!({ "team_id": team_id, "socket_id": self.socket_id() }))
            .send()
            .await?;
        let team: TeamDto = Self::parse(resp).await?;
        self.apply_team(ActionType::Edited, &team);
        Ok(team)
    }

    pub async fn invoices(&self, team_id: &str) -> Result<Vec<InvoiceDto>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/stripe/invoices?team_id={team_id}"))
            .send()
            .await?;
        Self::parse(resp).await
    }

    // ---- Uploads ---------------------------------------------------------

    pub async fn presign_upload(
        &self,
        kind: UploadKind,
        filename: &str,
    ) -> Result<PresignedUpload, ClientError> {
        let resp = self
            .request(Method::POST, "/api/upload")
            .json(&json!({ "kind": kind, "filename": filename }))
            .send()
            .await?;
        Self::parse(resp).await
    }

    // ---- Plumbing --------------------------------------------------------

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.http.request(method, format!("{}{}", self.base_url, path));
        if let Some(token) = self.token.read().as_ref() {
            req = req.bearer_auth(token);
        }
        req
    }

    fn socket_id(&self) -> Option<String> {
        self.socket_id.read().clone()
    }

    fn with_socket_id(&self, path: &str) -> String {
        match self.socket_id() {
            Some(socket_id) => format!("{path}?socket_id={socket_id}"),
            None => path.to_string(),
        }
    }

    async fn fetch_teams(&self) -> Result<Vec<TeamDto>, ClientError> {
        let resp = self.request(Method::GET, "/api/team").send().await?;
        Self::parse(resp).await
    }

    async fn fetch_discussions(&self, team_id: &str) -> Result<Vec<DiscussionDto>, ClientError> {
        let resp = self
            .request(Method::GET, &format!("/api/team/{team_id}/discussion"))
            .send()
            .await?;
        Self::parse(resp).await
    }

    fn apply_team(&self, action: ActionType, team: &TeamDto) {
        self.store.apply_event(&ServerEvent::Team(EntityEvent {
            action_type: action,
            version: 0,
            entity: team.clone(),
        }));
    }

    fn apply_discussion(&self, action: ActionType, discussion: &DiscussionDto) {
        self.store.apply_event(&ServerEvent::Discussion(EntityEvent {
            action_type: action,
            version: 0,
            entity: discussion.clone(),
        }));
    }

    fn apply_post(&self, action: ActionType, post: &PostDto) {
        self.store.apply_event(&ServerEvent::Post(EntityEvent {
            action_type: action,
            version: 0,
            entity: post.clone(),
        }));
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        resp: reqwest::Response,
    ) -> Result<T, ClientError> {
        if !resp.status().is_success() {
            return Err(Self::error_from(resp).await);
        }
        Ok(resp.json().await?)
    }

    async fn error_from(resp: reqwest::Response) -> ClientError {
        let status = resp.status();
        let message = match resp.json::<ApiErrorBody>().await {
            Ok(body) => body.message,
            Err(_) => status.to_string(),
        };
        ClientError::Api {
            status: status.as_u16(),
            message,
        }
    }
}
