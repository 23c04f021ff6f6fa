pub mod base;
pub mod discussion;
pub mod invitation;
pub mod post;
pub mod slug;
pub mod team;
pub mod user;

pub use base::{BaseDao, DaoError, DaoResult, PaginatedResult, PaginationParams};
pub use discussion::DiscussionDao;
pub use invitation::InvitationDao;
pub use post::PostDao;
pub use team::TeamDao;
pub use user::UserDao;
