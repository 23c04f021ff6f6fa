pub mod auth;
pub mod content;
pub mod dao;
pub mod email;
pub mod storage;
pub mod stripe;

pub use auth::AuthService;
pub use dao::*;
pub use email::EmailService;
pub use storage::StorageService;
pub use stripe::StripeService;
