use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

use crate::dto::{DiscussionDto, PostDto, TeamDto};

/// What a mutation did to the entity carried by an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    Added,
    Edited,
    Deleted,
}

/// One realtime event: the action, the emit-time sequence stamp and the
/// full current entity (a stub for `deleted`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityEvent<T> {
    pub action_type: ActionType,
    pub version: u64,
    pub entity: T,
}

/// Messages a connected client may send.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    #[serde(rename = "joinTeamRoom")]
    JoinTeamRoom { team_id: String },
    #[serde(rename = "leaveTeamRoom")]
    LeaveTeamRoom { team_id: String },
    #[serde(rename = "joinDiscussionRoom")]
    JoinDiscussionRoom { discussion_id: String },
    #[serde(rename = "leaveDiscussionRoom")]
    LeaveDiscussionRoom { discussion_id: String },
    #[serde(rename = "ping")]
    Ping,
}

/// Messages the server pushes to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "connected")]
    Connected { socket_id: String },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "teamEvent")]
    Team(EntityEvent<TeamDto>),
    #[serde(rename = "discussionEvent")]
    Discussion(EntityEvent<DiscussionDto>),
    #[serde(rename = "postEvent")]
    Post(EntityEvent<PostDto>),
    #[serde(rename = "error")]
    Error { message: String },
}

pub fn team_room(team_id: &ObjectId) -> String {
    format!("team-{}", team_id.to_hex())
}

pub fn discussion_room(discussion_id: &ObjectId) -> String {
    format!("discussion-{}", discussion_id.to_hex())
}
