use axum::extract::ws::Message;
use crewdeck_db::models::{Discussion, Post, Team};
use crewdeck_realtime::{
    ActionType, DiscussionDto, EntityEvent, PostDto, ServerEvent, TeamDto, discussion_room,
    team_room,
};
use futures::SinkExt;
use tracing::{debug, warn};

use super::storage::{WsSender, WsStorage};
use crate::state::AppState;

/// Broadcasts an event to every socket in a room, minus the excluded one
/// (self-echo suppression when the mutation carried a socket_id).
async fn emit_to_room(
    ws_storage: &WsStorage,
    room: &str,
    event: &ServerEvent,
    exclude_socket: Option<&str>,
) {
    let text = match serde_json::to_string(event) {
        Ok(t) => t,
        Err(e) => {
            warn!(%room, %e, "Failed to serialize WS event");
            return;
        }
    };

    let senders = ws_storage.room_senders(room, exclude_socket);
    debug!(%room, connections = senders.len(), "Emitting WS event");
    for sender in senders {
        send_text(&sender, text.clone()).await;
    }
}

/// Sends an event to a single socket.
pub async fn send_to_socket(ws_storage: &WsStorage, socket_id: &str, event: &ServerEvent) {
    let Some(sender) = ws_storage.get_sender(socket_id) else {
        return;
    };
    match serde_json::to_string(event) {
        Ok(text) => send_text(&sender, text).await,
        Err(e) => warn!(%socket_id, %e, "Failed to serialize WS event"),
    }
}

pub async fn emit_team(
    state: &AppState,
    action: ActionType,
    team: &Team,
    exclude_socket: Option<&str>,
) {
    let event = ServerEvent::Team(EntityEvent {
        action_type: action,
        version: state.events.next(),
        entity: TeamDto::from(team),
    });
    let room = team_room(&team.id.unwrap());
    emit_to_room(&state.ws_storage, &room, &event, exclude_socket).await;
}

/// Discussion events fan out to the team room, where the discussion list
/// lives; clients filter by their own membership.
pub async fn emit_discussion(
    state: &AppState,
    action: ActionType,
    discussion: &Discussion,
    exclude_socket: Option<&str>,
) {
    let event = ServerEvent::Discussion(EntityEvent {
        action_type: action,
        version: state.events.next(),
        entity: DiscussionDto::from(discussion),
    });
    let room = team_room(&discussion.team_id);
    emit_to_room(&state.ws_storage, &room, &event, exclude_socket).await;
}

pub async fn emit_post(
    state: &AppState,
    action: ActionType,
    post: &Post,
    exclude_socket: Option<&str>,
) {
    let event = ServerEvent::Post(EntityEvent {
        action_type: action,
        version: state.events.next(),
        entity: PostDto::from(post),
    });
    let room = discussion_room(&post.discussion_id);
    emit_to_room(&state.ws_storage, &room, &event, exclude_socket).await;
}

async fn send_text(sender: &WsSender, text: String) {
    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::text(text)).await {
        warn!(%e, "Failed to send WS message");
    }
}
