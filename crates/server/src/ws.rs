//! WebSocket handler for the realtime event stream.

use std::collections::HashMap;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::{header::AUTHORIZATION, HeaderMap},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use hubbub_shared::{
    AuthenticatedInfo, ClientCommand, ErrorInfo, ParticipantActivity, RoomKey, ServerEvent,
    WsEnvelope,
};
use serde::Deserialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::state::{AppState, Relay};

#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// WebSocket upgrade handler
pub async fn ws_handler(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers).or(params.token);
    let token_ok = state.token_matches(token.as_deref());
    if !token_ok {
        tracing::warn!("WebSocket opened with a bad token; authentication will be refused");
    }

    ws.on_upgrade(move |socket| handle_socket(socket, token_ok, state))
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::to_string)
}

/// Per-connection state.
struct Session {
    conn_id: Uuid,
    token_ok: bool,
    identity: Option<String>,
    rooms: HashMap<RoomKey, JoinHandle<()>>,
    lobby: Option<JoinHandle<()>>,
    forward_tx: mpsc::UnboundedSender<WsEnvelope<ServerEvent>>,
}

impl Session {
    fn reply(&self, event: ServerEvent, correlation_id: &str) {
        let _ = self
            .forward_tx
            .send(WsEnvelope::new(event).with_correlation(correlation_id));
    }

    async fn shutdown(self, state: &AppState) {
        for (room, handle) in self.rooms {
            stop_forwarder(handle).await;
            state.release_room(&room).await;
        }
        if let Some(handle) = self.lobby {
            handle.abort();
        }
    }
}

async fn handle_socket(socket: WebSocket, token_ok: bool, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (forward_tx, mut forward_rx) = mpsc::unbounded_channel::<WsEnvelope<ServerEvent>>();

    let mut session = Session {
        conn_id: Uuid::new_v4(),
        token_ok,
        identity: None,
        rooms: HashMap::new(),
        lobby: None,
        forward_tx,
    };
    let open = state.connection_opened();
    tracing::info!("WebSocket connection {} opened ({} open)", session.conn_id, open);

    // Task to forward events to the WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(event) = forward_rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    tracing::error!("Failed to encode event: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Main receive loop
    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                match serde_json::from_str::<WsEnvelope<ClientCommand>>(&text) {
                    Ok(envelope) => handle_client_command(envelope, &mut session, &state).await,
                    Err(e) => tracing::debug!("Ignoring unparsable frame: {}", e),
                }
            }
            Ok(Message::Close(_)) => break,
            Err(_) => break,
            _ => {}
        }
    }

    // Cleanup
    let conn_id = session.conn_id;
    session.shutdown(&state).await;
    send_task.abort();
    let open = state.connection_closed();
    tracing::info!("WebSocket connection {} closed ({} open)", conn_id, open);
}

async fn handle_client_command(
    envelope: WsEnvelope<ClientCommand>,
    session: &mut Session,
    state: &AppState,
) {
    if let ClientCommand::Authenticate { identity } = envelope.payload {
        authenticate(identity, &envelope.id, session, state);
        return;
    }

    let Some(identity) = session.identity.clone() else {
        tracing::debug!(
            "Connection {} sent {:?} before authenticating, ignoring",
            session.conn_id,
            envelope.payload
        );
        return;
    };

    match envelope.payload {
        ClientCommand::Authenticate { .. } => {}

        ClientCommand::JoinPost { post_id } => join(RoomKey::post(post_id), session, state).await,
        ClientCommand::JoinConversation { conversation_id } => {
            join(RoomKey::conversation(conversation_id), session, state).await
        }
        ClientCommand::JoinPoll { poll_id } => join(RoomKey::poll(poll_id), session, state).await,

        ClientCommand::LeavePost { post_id } => leave(&RoomKey::post(post_id), session, state).await,
        ClientCommand::LeaveConversation { conversation_id } => {
            leave(&RoomKey::conversation(conversation_id), session, state).await
        }
        ClientCommand::LeavePoll { poll_id } => leave(&RoomKey::poll(poll_id), session, state).await,

        ClientCommand::TypingStart {
            conversation_id,
            identity: username,
        } => {
            let activity = activity(username, &identity, conversation_id);
            relay_activity(ServerEvent::UserTyping(activity), session, state).await
        }
        ClientCommand::TypingStop {
            conversation_id,
            identity: username,
        } => {
            let activity = activity(username, &identity, conversation_id);
            relay_activity(ServerEvent::UserStoppedTyping(activity), session, state).await
        }
        ClientCommand::RecordingStart {
            conversation_id,
            identity: username,
        } => {
            let activity = activity(username, &identity, conversation_id);
            relay_activity(ServerEvent::UserRecording(activity), session, state).await
        }
        ClientCommand::RecordingStop {
            conversation_id,
            identity: username,
        } => {
            let activity = activity(username, &identity, conversation_id);
            relay_activity(ServerEvent::UserStoppedRecording(activity), session, state).await
        }
    }
}

fn authenticate(identity: String, request_id: &str, session: &mut Session, state: &AppState) {
    if !session.token_ok {
        tracing::warn!("Connection {} failed authentication", session.conn_id);
        session.reply(
            ServerEvent::AuthenticationFailed(ErrorInfo::new("invalid token")),
            request_id,
        );
        return;
    }
    if identity.is_empty() {
        session.reply(
            ServerEvent::AuthenticationFailed(ErrorInfo::new("empty identity")),
            request_id,
        );
        return;
    }

    tracing::info!("Connection {} authenticated as {}", session.conn_id, identity);
    if session.lobby.is_none() {
        session.lobby = Some(spawn_forwarder(
            state.subscribe_lobby(),
            session.conn_id,
            session.forward_tx.clone(),
            "lobby".to_string(),
        ));
    }
    session.identity = Some(identity.clone());
    session.reply(
        ServerEvent::Authenticated(AuthenticatedInfo {
            success: true,
            user_id: Some(identity),
        }),
        request_id,
    );
}

async fn join(room: RoomKey, session: &mut Session, state: &AppState) {
    if session.rooms.contains_key(&room) {
        return;
    }
    tracing::debug!("Connection {} joining {}", session.conn_id, room);

    let rx = state.subscribe_room(&room).await;
    let handle = spawn_forwarder(rx, session.conn_id, session.forward_tx.clone(), room.to_string());
    session.rooms.insert(room, handle);
}

async fn leave(room: &RoomKey, session: &mut Session, state: &AppState) {
    if let Some(handle) = session.rooms.remove(room) {
        tracing::debug!("Connection {} leaving {}", session.conn_id, room);
        stop_forwarder(handle).await;
        state.release_room(room).await;
    }
}

/// Abort a forwarder and wait until its receiver is dropped.
async fn stop_forwarder(handle: JoinHandle<()>) {
    handle.abort();
    let _ = handle.await;
}

/// The relayed username: the one the client named, or its authenticated identity.
fn activity(username: String, identity: &str, conversation_id: String) -> ParticipantActivity {
    ParticipantActivity {
        username: if username.is_empty() {
            identity.to_string()
        } else {
            username
        },
        conversation_id,
        ..Default::default()
    }
}

async fn relay_activity(event: ServerEvent, session: &Session, state: &AppState) {
    let room = match &event {
        ServerEvent::UserTyping(a)
        | ServerEvent::UserStoppedTyping(a)
        | ServerEvent::UserRecording(a)
        | ServerEvent::UserStoppedRecording(a) => RoomKey::conversation(a.conversation_id.clone()),
        _ => return,
    };
    let receivers = state
        .publish(&room, Relay::from_connection(session.conn_id, event))
        .await;
    tracing::debug!("Relayed activity in {} to {} receivers", room, receivers);
}

/// Pump a broadcast subscription into this connection's outbound queue,
/// skipping events the connection itself caused.
fn spawn_forwarder(
    mut rx: broadcast::Receiver<Relay>,
    conn_id: Uuid,
    forward_tx: mpsc::UnboundedSender<WsEnvelope<ServerEvent>>,
    label: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(relay) => {
                    if relay.is_echo_for(conn_id) {
                        continue;
                    }
                    if forward_tx.send(relay.envelope).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Connection {} lagged on {}, skipped {}", conn_id, label, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        tracing::debug!("Forwarder for {} on {} ended", conn_id, label);
    })
}
