pub mod dto;
pub mod protocol;
pub mod version;

pub use dto::{
    CardDto, DiscussionDto, InvitationDto, InvoiceDto, NotificationType, PostDto, TeamDto, UserDto,
};
pub use protocol::{
    ActionType, ClientMessage, EntityEvent, ServerEvent, discussion_room, team_room,
};
pub use version::EventSequence;
