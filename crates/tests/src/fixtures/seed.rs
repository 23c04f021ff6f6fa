use bson::{doc, oid::ObjectId};
use crewdeck_db::models::NotificationType;
use crewdeck_services::AuthService;
use crewdeck_services::auth::login_token::{
    LoginTokenStore, MongoLoginTokenStore, generate_login_token,
};
use crewdeck_services::dao::{DiscussionDao, TeamDao, UserDao};

use super::test_app::TestApp;

/// Result of seeding a team with a leader, one member and one discussion
/// both of them are on.
pub struct SeededCrew {
    pub team_id: String,
    pub team_slug: String,
    pub leader: SeededUser,
    pub member: SeededUser,
    pub discussion_id: String,
    pub discussion_slug: String,
}

pub struct SeededUser {
    pub id: String,
    pub email: String,
    pub access_token: String,
}

impl SeededUser {
    pub fn oid(&self) -> ObjectId {
        ObjectId::parse_str(&self.id).unwrap()
    }
}

impl TestApp {
    /// Creates the account the way a first login would and mints a bearer
    /// token for it. Login itself is passwordless, so tests seed users
    /// through the DAO instead of an HTTP register round-trip.
    pub async fn seed_user(&self, email: &str) -> SeededUser {
        let users = UserDao::new(&self.db);
        let user = users
            .ensure_by_email(email)
            .await
            .expect("Failed to seed user");
        let user_id = user.id.unwrap();

        let auth = AuthService::new(self.settings.jwt.clone());
        let token = auth
            .generate_access_token(user_id, &user.email)
            .expect("Failed to mint access token");

        SeededUser {
            id: user_id.to_hex(),
            email: user.email,
            access_token: token.token,
        }
    }

    /// Stores a pending magic-link login for the address and returns the
    /// (uid, token) pair that goes into the emailed link.
    pub async fn mint_login_link(
        &self,
        email: &str,
        invitation_token: Option<&str>,
    ) -> (String, String) {
        let users = UserDao::new(&self.db);
        let user = users
            .ensure_by_email(email)
            .await
            .expect("Failed to seed user");
        let user_id = user.id.unwrap();

        let token = generate_login_token();
        MongoLoginTokenStore::new(&self.db)
            .store_or_update(user_id, &token, invitation_token.map(str::to_string))
            .await
            .expect("Failed to store login token");

        (user_id.to_hex(), token)
    }

    /// Create an authenticated request with the given token.
    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .get(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .post(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_put(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .put(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    pub fn auth_delete(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client
            .delete(self.url(path))
            .header("Authorization", format!("Bearer {}", token))
    }

    /// Seed a full crew: a leader with a team, a second member on it, and
    /// one discussion both of them belong to.
    pub async fn seed_crew(&self, label: &str) -> SeededCrew {
        let leader = self.seed_user(&format!("leader@{}.test", label)).await;
        let member = self.seed_user(&format!("member@{}.test", label)).await;

        let teams = TeamDao::new(&self.db);
        let team = teams
            .create(format!("{} Team", label), None, leader.oid())
            .await
            .expect("Failed to seed team");
        let team_id = team.id.unwrap();

        // Membership normally arrives through an accepted invitation; the
        // fixture pushes it directly to stay small.
        teams
            .base
            .update_by_id(team_id, doc! { "$addToSet": { "member_ids": member.oid() } })
            .await
            .expect("Failed to add member to team");

        let discussion = DiscussionDao::new(&self.db)
            .create(
                team_id,
                leader.oid(),
                "general".to_string(),
                vec![member.oid()],
                NotificationType::Default,
            )
            .await
            .expect("Failed to seed discussion");

        SeededCrew {
            team_id: team_id.to_hex(),
            team_slug: team.slug,
            leader,
            member,
            discussion_id: discussion.id.unwrap().to_hex(),
            discussion_slug: discussion.slug,
        }
    }
}
