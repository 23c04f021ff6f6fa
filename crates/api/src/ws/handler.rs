use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, header},
    response::Response,
};
use bson::oid::ObjectId;
use crewdeck_realtime::{ClientMessage, ServerEvent, discussion_room, team_room};
use crewdeck_services::dao::base::DaoError;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    // Token from the query string, or the session cookie for browser clients
    let token = params.token.or_else(|| {
        headers
            .get(header::COOKIE)
            .and_then(|v| v.to_str().ok())
            .and_then(|cookies| {
                cookies.split(';').find_map(|cookie| {
                    cookie
                        .trim()
                        .strip_prefix("access_token=")
                        .map(|s| s.to_string())
                })
            })
    });

    // Verify JWT before accepting the WebSocket
    let claims = match token.as_deref().map(|t| state.auth.verify_access_token(t)) {
        Some(Ok(c)) => c,
        _ => {
            return Response::builder()
                .status(401)
                .body("Unauthorized".into())
                .unwrap();
        }
    };

    let user_id = match ObjectId::parse_str(&claims.sub) {
        Ok(id) => id,
        Err(_) => {
            return Response::builder()
                .status(400)
                .body("Invalid user ID".into())
                .unwrap();
        }
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, user_id: ObjectId) {
    let socket_id = Uuid::new_v4().to_string();
    info!(?user_id, %socket_id, "WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let sender = Arc::new(Mutex::new(sender));

    // Register connection
    state.ws_storage.add(socket_id.clone(), sender.clone());

    // The hello frame carries the socket id clients echo back on
    // mutations for self-echo suppression
    super::dispatcher::send_to_socket(
        &state.ws_storage,
        &socket_id,
        &ServerEvent::Connected {
            socket_id: socket_id.clone(),
        },
    )
    .await;

    // Message loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                handle_client_message(&state, user_id, &socket_id, &text).await;
            }
            Ok(Message::Ping(data)) => {
                let mut guard = sender.lock().await;
                let _ = guard.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                break;
            }
            Err(e) => {
                warn!(?user_id, %socket_id, %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup: drop the connection and its room memberships
    state.ws_storage.remove(&socket_id);
    info!(?user_id, %socket_id, "WebSocket disconnected");
}

async fn handle_client_message(state: &AppState, user_id: ObjectId, socket_id: &str, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => {
            send_error(state, socket_id, "Unrecognized message").await;
            return;
        }
    };

    debug!(?user_id, %socket_id, ?message, "WS message received");

    match message {
        ClientMessage::Ping => {
            super::dispatcher::send_to_socket(&state.ws_storage, socket_id, &ServerEvent::Pong)
                .await;
        }
        ClientMessage::JoinTeamRoom { team_id } => {
            let Ok(team_id) = ObjectId::parse_str(&team_id) else {
                send_error(state, socket_id, "Invalid team_id").await;
                return;
            };
            // Membership is checked on join; events then flow without
            // per-event permission lookups
            match state.teams.is_member(team_id, user_id).await {
                Ok(true) => state.ws_storage.join_room(&team_room(&team_id), socket_id),
                Ok(false) => send_error(state, socket_id, "Not a team member").await,
                Err(e) => {
                    warn!(%socket_id, %e, "Room membership check failed");
                    send_error(state, socket_id, "Could not join room").await;
                }
            }
        }
        ClientMessage::LeaveTeamRoom { team_id } => {
            if let Ok(team_id) = ObjectId::parse_str(&team_id) {
                state
                    .ws_storage
                    .leave_room(&team_room(&team_id), socket_id);
            }
        }
        ClientMessage::JoinDiscussionRoom { discussion_id } => {
            let Ok(discussion_id) = ObjectId::parse_str(&discussion_id) else {
                send_error(state, socket_id, "Invalid discussion_id").await;
                return;
            };
            match state
                .discussions
                .find_for_member(discussion_id, user_id)
                .await
            {
                Ok(_) => state
                    .ws_storage
                    .join_room(&discussion_room(&discussion_id), socket_id),
                Err(DaoError::Forbidden(_)) => {
                    send_error(state, socket_id, "Not a discussion member").await
                }
                Err(DaoError::NotFound) => {
                    send_error(state, socket_id, "Discussion not found").await
                }
                Err(e) => {
                    warn!(%socket_id, %e, "Room membership check failed");
                    send_error(state, socket_id, "Could not join room").await;
                }
            }
        }
        ClientMessage::LeaveDiscussionRoom { discussion_id } => {
            if let Ok(discussion_id) = ObjectId::parse_str(&discussion_id) {
                state
                    .ws_storage
                    .leave_room(&discussion_room(&discussion_id), socket_id);
            }
        }
    }
}

async fn send_error(state: &AppState, socket_id: &str, message: &str) {
    let event = ServerEvent::Error {
        message: message.to_string(),
    };
    super::dispatcher::send_to_socket(&state.ws_storage, socket_id, &event).await;
}
