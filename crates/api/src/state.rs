use crewdeck_config::Settings;
use crewdeck_realtime::EventSequence;
use crewdeck_services::{
    AuthService, EmailService, StorageService, StripeService,
    auth::{
        google::GoogleOAuth,
        login_token::{LoginTokenStore, MongoLoginTokenStore},
    },
    dao::{
        discussion::DiscussionDao, invitation::InvitationDao, post::PostDao, team::TeamDao,
        user::UserDao,
    },
};
use mongodb::Database;
use std::sync::Arc;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub google: Arc<GoogleOAuth>,
    pub users: Arc<UserDao>,
    pub teams: Arc<TeamDao>,
    pub discussions: Arc<DiscussionDao>,
    pub posts: Arc<PostDao>,
    pub invitations: Arc<InvitationDao>,
    pub login_tokens: Arc<dyn LoginTokenStore>,
    pub email: Arc<EmailService>,
    pub storage: Arc<StorageService>,
    pub stripe: Arc<StripeService>,
    pub ws_storage: Arc<WsStorage>,
    pub events: Arc<EventSequence>,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> anyhow::Result<Self> {
        let auth = Arc::new(AuthService::new(settings.jwt.clone()));
        let google = Arc::new(GoogleOAuth::new(&settings.oauth, &settings.app.base_url));
        let users = Arc::new(UserDao::new(&db));
        let teams = Arc::new(TeamDao::new(&db));
        let discussions = Arc::new(DiscussionDao::new(&db));
        let posts = Arc::new(PostDao::new(&db));
        let invitations = Arc::new(InvitationDao::new(&db));
        let login_tokens: Arc<dyn LoginTokenStore> = Arc::new(MongoLoginTokenStore::new(&db));
        let email = Arc::new(EmailService::new(&settings.email, &db)?);
        let storage = Arc::new(StorageService::new(&settings.storage));
        let stripe = Arc::new(StripeService::new(&settings.stripe));
        let ws_storage = Arc::new(WsStorage::new());
        let events = Arc::new(EventSequence::new());

        Ok(Self {
            db,
            settings,
            auth,
            google,
            users,
            teams,
            discussions,
            posts,
            invitations,
            login_tokens,
            email,
            storage,
            stripe,
            ws_storage,
            events,
        })
    }
}
