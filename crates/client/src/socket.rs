use std::{collections::HashSet, sync::Arc, time::Duration};

use crewdeck_realtime::{ClientMessage, ServerEvent};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::{api_client::ApiClient, error::ClientError, store::Store};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Websocket side of the native client. Joins and leaves rooms as the
/// application navigates, pumps server events into the store, and after
/// a reconnect catches up by refetching the mirrored lists instead of
/// replaying missed events.
pub struct SocketClient {
    api: Arc<ApiClient>,
    store: Arc<Store>,
    ws_url: String,
    outbox: mpsc::UnboundedSender<Outgoing>,
    rooms: Mutex<JoinedRooms>,
}

/// The rooms this connection is supposed to be in; the redial loop
/// rejoins them, so joins sent while disconnected are never lost.
#[derive(Debug, Default)]
struct JoinedRooms {
    teams: HashSet<String>,
    discussions: HashSet<String>,
}

enum Outgoing {
    Message(ClientMessage),
    Shutdown,
}

enum PumpExit {
    Dropped,
    Shutdown,
}

impl SocketClient {
    /// Dials the server and spawns the pump task. The `connected` hello
    /// arrives asynchronously; until it lands, mutations simply go out
    /// without a socket id and the store converges through its usual
    /// insert-if-absent path.
    pub async fn connect(
        ws_url: impl Into<String>,
        api: Arc<ApiClient>,
    ) -> Result<Arc<Self>, ClientError> {
        let (outbox, inbox) = mpsc::unbounded_channel();
        let client = Arc::new(Self {
            store: api.store(),
            api,
            ws_url: ws_url.into(),
            outbox,
            rooms: Mutex::new(JoinedRooms::default()),
        });

        let stream = client.dial().await?;
        tokio::spawn(Self::run(Arc::clone(&client), stream, inbox));
        Ok(client)
    }

    pub fn join_team_room(&self, team_id: &str) {
        self.rooms.lock().teams.insert(team_id.to_string());
        self.send(ClientMessage::JoinTeamRoom {
            team_id: team_id.to_string(),
        });
    }

    pub fn leave_team_room(&self, team_id: &str) {
        self.rooms.lock().teams.remove(team_id);
        self.send(ClientMessage::LeaveTeamRoom {
            team_id: team_id.to_string(),
        });
    }

    pub fn join_discussion_room(&self, discussion_id: &str) {
        self.rooms.lock().discussions.insert(discussion_id.to_string());
        self.send(ClientMessage::JoinDiscussionRoom {
            discussion_id: discussion_id.to_string(),
        });
    }

    pub fn leave_discussion_room(&self, discussion_id: &str) {
        self.rooms.lock().discussions.remove(discussion_id);
        self.send(ClientMessage::LeaveDiscussionRoom {
            discussion_id: discussion_id.to_string(),
        });
    }

    pub fn ping(&self) {
        self.send(ClientMessage::Ping);
    }

    /// Stops the pump task after closing the connection.
    pub fn close(&self) {
        let _ = self.outbox.send(Outgoing::Shutdown);
    }

    fn send(&self, message: ClientMessage) {
        let _ = self.outbox.send(Outgoing::Message(message));
    }

    async fn run(
        self: Arc<Self>,
        mut stream: WsStream,
        mut inbox: mpsc::UnboundedReceiver<Outgoing>,
    ) {
        loop {
            match self.pump(&mut stream, &mut inbox).await {
                PumpExit::Shutdown => return,
                PumpExit::Dropped => {}
            }

            let mut attempt = 0u32;
            stream = loop {
                // Joins and leaves queued while down are already recorded
                // in the room registry, so the backlog only matters for a
                // shutdown request.
                while let Ok(outgoing) = inbox.try_recv() {
                    if matches!(outgoing, Outgoing::Shutdown) {
                        return;
                    }
                }

                attempt += 1;
                let delay = reconnect_delay(attempt);
                info!(attempt, ?delay, "Websocket dropped; reconnecting");
                tokio::time::sleep(delay).await;

                match self.dial().await {
                    Ok(stream) => break stream,
                    Err(e) => warn!(?e, "Websocket redial failed"),
                }
            };

            self.resync(&mut stream).await;
        }
    }

    async fn pump(
        &self,
        stream: &mut WsStream,
        inbox: &mut mpsc::UnboundedReceiver<Outgoing>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                outgoing = inbox.recv() => match outgoing {
                    Some(Outgoing::Message(message)) => {
                        if send_message(stream, &message).await.is_err() {
                            return PumpExit::Dropped;
                        }
                    }
                    Some(Outgoing::Shutdown) | None => {
                        let _ = stream.close(None).await;
                        return PumpExit::Shutdown;
                    }
                },
                incoming = stream.next() => match incoming {
                    Some(Ok(Message::Text(text))) => self.handle_event(&text),
                    Some(Ok(Message::Close(_))) | None => return PumpExit::Dropped,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(?e, "Websocket read failed");
                        return PumpExit::Dropped;
                    }
                },
            }
        }
    }

    fn handle_event(&self, text: &str) {
        match serde_json::from_str::<ServerEvent>(text) {
            Ok(ServerEvent::Connected { socket_id }) => {
                debug!(%socket_id, "Websocket session established");
                self.api.set_socket_id(socket_id);
            }
            Ok(ServerEvent::Pong) => {}
            Ok(ServerEvent::Error { message }) => {
                warn!(%message, "Server rejected a websocket message");
            }
            Ok(event) => self.store.apply_event(&event),
            Err(e) => debug!(?e, "Ignoring unrecognized frame"),
        }
    }

    /// Rejoins the recorded rooms, then refetches what they mirror.
    /// Joins go out first so nothing slips between the refetch and the
    /// resumed event flow; the version watermarks absorb the overlap.
    async fn resync(&self, stream: &mut WsStream) {
        let (team_ids, discussion_ids) = {
            let rooms = self.rooms.lock();
            (
                rooms.teams.iter().cloned().collect::<Vec<_>>(),
                rooms.discussions.iter().cloned().collect::<Vec<_>>(),
            )
        };

        for team_id in &team_ids {
            let _ = send_message(
                stream,
                &ClientMessage::JoinTeamRoom {
                    team_id: team_id.clone(),
                },
            )
            .await;
        }
        for discussion_id in &discussion_ids {
            let _ = send_message(
                stream,
                &ClientMessage::JoinDiscussionRoom {
                    discussion_id: discussion_id.clone(),
                },
            )
            .await;
        }

        if let Err(e) = self.api.refresh_teams().await {
            warn!(?e, "Could not refresh teams after reconnect");
        }
        for team_id in &team_ids {
            if let Err(e) = self.api.refresh_discussions(team_id).await {
                warn!(%team_id, ?e, "Could not refresh discussions after reconnect");
            }
        }
        for discussion_id in &discussion_ids {
            if let Err(e) = self.api.refresh_posts(discussion_id).await {
                warn!(%discussion_id, ?e, "Could not refresh posts after reconnect");
            }
        }
    }

    async fn dial(&self) -> Result<WsStream, ClientError> {
        let token = self.api.token().ok_or(ClientError::NotLoggedIn)?;
        let (stream, _) = connect_async(format!("{}?token={}", self.ws_url, token)).await?;
        Ok(stream)
    }
}

async fn send_message(
    stream: &mut WsStream,
    message: &ClientMessage,
) -> Result<(), tokio_tungstenite::tungstenite::Error> {
    let text = match serde_json::to_string(message) {
        Ok(text) => text,
        Err(e) => {
            warn!(?e, "Could not serialize outgoing message");
            return Ok(());
        }
    };
    stream.send(Message::Text(text.into())).await
}

/// 2s, 4s, 8s and so on, capped at 30s.
fn reconnect_delay(attempt: u32) -> Duration {
    Duration::from_secs((1u64 << attempt.min(5)).min(30))
}
