pub mod discussion;
pub mod email_template;
pub mod invitation;
pub mod login_token;
pub mod post;
pub mod team;
pub mod user;

pub use discussion::*;
pub use email_template::*;
pub use invitation::*;
pub use login_token::*;
pub use post::*;
pub use team::*;
pub use user::*;
