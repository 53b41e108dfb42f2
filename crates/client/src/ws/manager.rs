//! The realtime connection manager.
//!
//! [`RealtimeClient`] owns one logical connection. `connect()` spawns a
//! driver task that opens the transport, runs the authentication handshake,
//! fans inbound events out to the handler registry, and reconnects with
//! backoff after drops. All shared state sits behind one lock that is never
//! held while a consumer callback runs.

use std::fmt;
use std::sync::Arc;

use hubbub_shared::{
    decode_server_frame, ClientCommand, ConnectInfo, DisconnectInfo, ErrorInfo,
    ReconnectFailedInfo, ReconnectInfo, RoomKey, ServerEvent, WsEnvelope,
};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use super::auth::{self, AuthOutcome};
use super::connection::{ConnectionState, Connector, Transport, TransportError, WsConnector};
use super::events::Event;
use super::reconnect::ReconnectState;
use super::registry::{HandlerRegistry, HandlerSet, Subscription};
use super::rooms::RoomTracker;
use crate::config::{ConfigUpdate, ConnectionConfig};

const CLIENT_DISCONNECT_REASON: &str = "client disconnect";

/// Handle to a realtime connection. Cheap to clone; clones share the
/// connection, handlers and rooms.
///
/// Lifecycle: construct with a config, [`connect`](Self::connect), and
/// [`disconnect`](Self::disconnect) before dropping the last handle (a
/// running driver keeps the connection alive on its own).
#[derive(Clone)]
pub struct RealtimeClient {
    shared: Arc<Shared>,
}

struct Shared {
    core: Mutex<Core>,
    registry: Arc<HandlerRegistry>,
    connector: Arc<dyn Connector>,
}

struct Core {
    config: ConnectionConfig,
    state: ConnectionState,
    /// Bumped by every connect/disconnect; a driver whose generation is stale
    /// must not touch state or dispatch.
    generation: u64,
    rooms: RoomTracker,
    outbound: Option<mpsc::UnboundedSender<ClientCommand>>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Core {
    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    fn emit(&self, command: ClientCommand) -> bool {
        match &self.outbound {
            Some(tx) => tx.send(command).is_ok(),
            None => false,
        }
    }

    fn release_driver(&mut self) {
        self.outbound = None;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let core = self.shared.core.lock();
        f.debug_struct("RealtimeClient")
            .field("endpoint", &core.config.endpoint)
            .field("state", &core.state)
            .field("rooms", &core.rooms.joined())
            .field("handlers", &self.shared.registry.len())
            .finish()
    }
}

impl RealtimeClient {
    /// A client that connects over WebSocket.
    pub fn new(config: ConnectionConfig) -> Self {
        Self::with_connector(config, Arc::new(WsConnector))
    }

    pub fn with_connector(config: ConnectionConfig, connector: Arc<dyn Connector>) -> Self {
        Self {
            shared: Arc::new(Shared {
                core: Mutex::new(Core {
                    config,
                    state: ConnectionState::Disconnected,
                    generation: 0,
                    rooms: RoomTracker::default(),
                    outbound: None,
                    shutdown: None,
                }),
                registry: Arc::new(HandlerRegistry::new()),
                connector,
            }),
        }
    }

    // --- Connection ---

    /// Open the connection. No-op unless currently `Disconnected`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let (generation, outbound_rx, shutdown_rx) = {
            let mut core = self.shared.core.lock();
            if core.state != ConnectionState::Disconnected {
                tracing::debug!("connect ignored: already {:?}", core.state);
                return;
            }
            core.generation += 1;
            core.state = ConnectionState::Connecting;
            let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
            let (shutdown_tx, shutdown_rx) = oneshot::channel();
            core.outbound = Some(outbound_tx);
            core.shutdown = Some(shutdown_tx);
            (core.generation, outbound_rx, shutdown_rx)
        };

        tokio::spawn(drive(
            Arc::clone(&self.shared),
            generation,
            outbound_rx,
            shutdown_rx,
        ));
    }

    /// Close the connection, cancel any pending reconnect, and clear
    /// authentication and rooms. Safe to call in any state.
    pub fn disconnect(&self) {
        let was_active = {
            let mut core = self.shared.core.lock();
            let was_active = core.state != ConnectionState::Disconnected;
            core.generation += 1;
            core.state = ConnectionState::Disconnected;
            core.rooms.clear();
            core.release_driver();
            was_active
        };

        if was_active {
            tracing::info!("realtime connection closed by client");
            self.shared
                .registry
                .dispatch(&ServerEvent::Disconnect(DisconnectInfo {
                    reason: CLIENT_DISCONNECT_REASON.to_string(),
                }));
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.core.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state().is_authenticated()
    }

    pub fn config(&self) -> ConnectionConfig {
        self.shared.core.lock().config.clone()
    }

    /// Merge `update` into the config. Does not reconnect: a new token or
    /// identity applies from the next connect attempt and the next signal.
    pub fn update_config(&self, update: ConfigUpdate) {
        self.shared.core.lock().config.apply(update);
    }

    // --- Handlers ---

    /// Register a handler set. Ignored (returns false) if its id is taken.
    pub fn register(&self, set: HandlerSet) -> bool {
        self.shared.registry.register(set)
    }

    pub fn unregister(&self, id: &str) -> bool {
        self.shared.registry.unregister(id)
    }

    /// Subscribe a typed callback to one event kind.
    pub fn subscribe<E: Event>(
        &self,
        callback: impl Fn(&E::Payload) + Send + Sync + 'static,
    ) -> Subscription {
        Subscription::register::<E>(&self.shared.registry, callback)
    }

    pub fn has_handler(&self, id: &str) -> bool {
        self.shared.registry.contains(id)
    }

    pub fn handler_count(&self) -> usize {
        self.shared.registry.len()
    }

    // --- Rooms ---

    /// Join `room`. Dropped (returns false) unless authenticated; callers
    /// retry once they observe `authenticated`.
    pub fn join(&self, room: &RoomKey) -> bool {
        let mut core = self.shared.core.lock();
        if !core.state.is_authenticated() {
            tracing::debug!("join {} dropped: not authenticated", room);
            return false;
        }
        if let Some(command) = core.rooms.join(room) {
            core.emit(command);
        }
        true
    }

    /// Leave `room`. While unauthenticated nothing is emitted, but the room
    /// is dropped from the rejoin list so it is not restored on reconnect.
    pub fn leave(&self, room: &RoomKey) -> bool {
        let mut core = self.shared.core.lock();
        if !core.state.is_authenticated() {
            core.rooms.forget(room);
            tracing::debug!("leave {} dropped: not authenticated", room);
            return false;
        }
        let command = core.rooms.leave(room);
        core.emit(command);
        true
    }

    /// Leave every joined room. Returns how many leaves were emitted.
    pub fn leave_all(&self) -> usize {
        let mut core = self.shared.core.lock();
        if !core.state.is_authenticated() {
            core.rooms.clear();
            return 0;
        }
        let commands = core.rooms.leave_all();
        let count = commands.len();
        for command in commands {
            core.emit(command);
        }
        count
    }

    /// Snapshot of the rooms joined on the current connection.
    pub fn joined_rooms(&self) -> Vec<RoomKey> {
        self.shared.core.lock().rooms.joined()
    }

    pub fn is_joined(&self, room: &RoomKey) -> bool {
        self.shared.core.lock().rooms.is_joined(room)
    }

    /// Emit the command built from the current config, if authenticated.
    pub(super) fn emit_authenticated(
        &self,
        what: &str,
        build: impl FnOnce(&ConnectionConfig) -> Option<ClientCommand>,
    ) -> bool {
        let core = self.shared.core.lock();
        if !core.state.is_authenticated() {
            tracing::debug!("{} dropped: not authenticated", what);
            return false;
        }
        match build(&core.config) {
            Some(command) => core.emit(command),
            None => {
                tracing::warn!("{} dropped: no acting identity configured", what);
                false
            }
        }
    }
}

// --- Driver ---

enum SessionEnd {
    Cancelled,
    Dropped(String),
}

impl Shared {
    /// Fan `event` out unless this driver went stale.
    ///
    /// The generation is rechecked before each handler set, so a set that
    /// calls `disconnect` stops delivery to the sets after it. A set already
    /// running when another thread disconnects still completes.
    fn dispatch(&self, generation: u64, event: &ServerEvent) {
        self.registry
            .dispatch_while(event, || self.core.lock().is_current(generation));
    }

    /// Enter `Connecting`/`Reconnecting` and snapshot the config to use.
    fn begin_attempt(&self, generation: u64, attempt: u32) -> Option<ConnectionConfig> {
        let mut core = self.core.lock();
        if !core.is_current(generation) {
            return None;
        }
        core.state = if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        };
        Some(core.config.clone())
    }

    fn transport_opened(&self, generation: u64) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(generation) {
            return false;
        }
        core.state = ConnectionState::Connected;
        true
    }

    fn authenticate_command(&self, generation: u64) -> Option<ClientCommand> {
        let core = self.core.lock();
        if !core.is_current(generation) {
            return None;
        }
        auth::authenticate_command(&core.config)
    }

    /// Enter `Authenticated` and return the rejoin commands for remembered rooms.
    fn authenticated(&self, generation: u64) -> Option<Vec<ClientCommand>> {
        let mut core = self.core.lock();
        if !core.is_current(generation) || !core.state.is_connected() {
            return None;
        }
        core.state = ConnectionState::Authenticated;
        Some(core.rooms.resume())
    }

    fn authentication_failed(&self, generation: u64) {
        let mut core = self.core.lock();
        if core.is_current(generation) && core.state.is_authenticated() {
            core.state = ConnectionState::Connected;
            core.rooms.suspend();
        }
    }

    fn transport_lost(&self, generation: u64) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(generation) {
            return false;
        }
        core.state = ConnectionState::Disconnected;
        core.rooms.suspend();
        true
    }

    fn config(&self, generation: u64) -> Option<ConnectionConfig> {
        let core = self.core.lock();
        core.is_current(generation).then(|| core.config.clone())
    }

    fn schedule_retry(&self, generation: u64, attempt: u32) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(generation) {
            return false;
        }
        core.state = ConnectionState::Reconnecting { attempt };
        true
    }

    /// The driver is stopping for good: settle into `Disconnected`.
    fn give_up(&self, generation: u64) -> bool {
        let mut core = self.core.lock();
        if !core.is_current(generation) {
            return false;
        }
        core.state = ConnectionState::Disconnected;
        core.rooms.clear();
        core.outbound = None;
        core.shutdown = None;
        true
    }
}

async fn drive(
    shared: Arc<Shared>,
    generation: u64,
    mut outbound: mpsc::UnboundedReceiver<ClientCommand>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut retry = ReconnectState::default();
    // `reconnect` is only reported once a connection has existed to lose.
    let mut ever_connected = false;

    loop {
        let Some(config) = shared.begin_attempt(generation, retry.attempt()) else {
            return;
        };
        tracing::debug!(
            "opening realtime connection to {} (attempt {})",
            config.endpoint,
            retry.attempt()
        );

        let connected = tokio::select! {
            biased;
            _ = &mut shutdown => return,
            result = shared.connector.connect(&config.endpoint, &config.token) => result,
        };

        match connected {
            Ok(mut transport) => {
                if !shared.transport_opened(generation) {
                    let _ = transport.close().await;
                    return;
                }
                let attempts = retry.reset();
                tracing::info!("realtime connection established to {}", config.endpoint);

                shared.dispatch(
                    generation,
                    &ServerEvent::Connect(ConnectInfo {
                        endpoint: config.endpoint.clone(),
                    }),
                );
                if ever_connected {
                    shared.dispatch(generation, &ServerEvent::Reconnect(ReconnectInfo { attempts }));
                }
                ever_connected = true;

                match run_session(&shared, generation, transport, &mut outbound, &mut shutdown).await
                {
                    SessionEnd::Cancelled => return,
                    SessionEnd::Dropped(reason) => {
                        if !shared.transport_lost(generation) {
                            return;
                        }
                        tracing::warn!("realtime connection lost: {}", reason);
                        shared.dispatch(generation, &ServerEvent::Disconnect(DisconnectInfo { reason }));
                    }
                }
            }
            Err(err) => {
                tracing::warn!("realtime connection to {} failed: {}", config.endpoint, err);
                shared.dispatch(generation, &ServerEvent::Error(ErrorInfo::new(err.to_string())));
            }
        }

        while let Ok(command) = outbound.try_recv() {
            tracing::debug!("discarding {:?} queued for a closed connection", command);
        }

        let Some(config) = shared.config(generation) else {
            return;
        };
        if !config.auto_reconnect {
            shared.give_up(generation);
            return;
        }

        match retry.schedule(&config.reconnect_policy()) {
            Some(delay) => {
                if !shared.schedule_retry(generation, retry.attempt()) {
                    return;
                }
                tracing::info!(
                    "reconnecting in {}ms (attempt {}/{})",
                    delay.as_millis(),
                    retry.attempt(),
                    config.max_reconnect_attempts
                );
                tokio::select! {
                    biased;
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                let attempts = retry.attempt();
                tracing::error!(
                    "giving up on realtime connection after {} reconnect attempts",
                    attempts
                );
                if shared.give_up(generation) {
                    shared.registry.dispatch(&ServerEvent::ReconnectFailed(ReconnectFailedInfo {
                        attempts,
                    }));
                }
                return;
            }
        }
    }
}

async fn run_session(
    shared: &Shared,
    generation: u64,
    mut transport: Box<dyn Transport>,
    outbound: &mut mpsc::UnboundedReceiver<ClientCommand>,
    shutdown: &mut oneshot::Receiver<()>,
) -> SessionEnd {
    match shared.authenticate_command(generation) {
        Some(command) => {
            if let Err(e) = send_command(transport.as_mut(), command).await {
                return SessionEnd::Dropped(e.to_string());
            }
        }
        None => tracing::warn!("no acting identity configured; staying unauthenticated"),
    }

    loop {
        tokio::select! {
            biased;
            _ = &mut *shutdown => {
                let _ = transport.close().await;
                return SessionEnd::Cancelled;
            }
            command = outbound.recv() => match command {
                Some(command) => {
                    if let Err(e) = send_command(transport.as_mut(), command).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
                None => {
                    let _ = transport.close().await;
                    return SessionEnd::Cancelled;
                }
            },
            frame = transport.recv() => match frame {
                Some(Ok(text)) => {
                    if let Err(e) = handle_frame(shared, generation, transport.as_mut(), &text).await {
                        return SessionEnd::Dropped(e.to_string());
                    }
                }
                Some(Err(e)) => return SessionEnd::Dropped(e.to_string()),
                None => return SessionEnd::Dropped("transport closed".to_string()),
            },
        }
    }
}

async fn handle_frame(
    shared: &Shared,
    generation: u64,
    transport: &mut dyn Transport,
    text: &str,
) -> Result<(), TransportError> {
    let event = match decode_server_frame(text) {
        Ok(envelope) => envelope.payload,
        Err(e) => {
            tracing::warn!("dropping unparsable frame: {}", e);
            return Ok(());
        }
    };
    if let ServerEvent::Unparsed(raw) = &event {
        tracing::warn!("{} data did not match its model, delivering raw: {}", raw.name, raw.data);
    } else {
        tracing::debug!("received {}", event.name());
    }

    match auth::classify(&event) {
        AuthOutcome::Accepted => {
            let Some(rejoins) = shared.authenticated(generation) else {
                return Ok(());
            };
            if !rejoins.is_empty() {
                tracing::info!("rejoining {} rooms", rejoins.len());
            }
            for command in rejoins {
                send_command(transport, command).await?;
            }
            tracing::info!("realtime connection authenticated");
            shared.dispatch(generation, &event);
        }
        AuthOutcome::Rejected(err) => {
            tracing::warn!("realtime authentication failed: {}", err.message);
            shared.authentication_failed(generation);
            shared.dispatch(generation, &ServerEvent::AuthenticationFailed(err));
        }
        AuthOutcome::Unrelated => shared.dispatch(generation, &event),
    }
    Ok(())
}

async fn send_command(
    transport: &mut dyn Transport,
    command: ClientCommand,
) -> Result<(), TransportError> {
    let frame = serde_json::to_string(&WsEnvelope::new(command))?;
    tracing::debug!("sending {}", frame);
    transport.send(frame).await
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use hubbub_shared::{ChatMessage, EventName};
    use tokio::time::Instant;

    use super::*;
    use crate::ws::events::{Authenticated, NewMessage};
    use crate::ws::testing::{next_event, next_peer, record_events, MockConnector};

    fn config() -> ConnectionConfig {
        ConnectionConfig::new("ws://hub.test/api/ws")
            .with_token("t0k")
            .with_identity("alice")
            .with_reconnect(4, 1000)
    }

    fn client_with(config: ConnectionConfig) -> (RealtimeClient, Arc<MockConnector>) {
        let connector = MockConnector::new();
        let client = RealtimeClient::with_connector(config, connector.clone());
        (client, connector)
    }

    fn message(id: &str, conversation: Option<&str>) -> ServerEvent {
        ServerEvent::NewMessage(ChatMessage {
            id: id.into(),
            conversation_id: conversation.map(str::to_string),
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn connect_authenticates_with_identity() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");

        client.connect();
        let mut peer = next_peer(&connector).await;
        assert_eq!(peer.token(), "t0k");
        assert_eq!(
            peer.next_command().await,
            ClientCommand::Authenticate {
                identity: "alice".into()
            }
        );
        assert_eq!(client.state(), ConnectionState::Connected);
        next_event(&mut events, EventName::Connect).await;

        peer.emit(ServerEvent::Authenticated(hubbub_shared::AuthenticatedInfo {
            success: true,
            user_id: Some("u-alice".into()),
        }));
        next_event(&mut events, EventName::Authenticated).await;
        assert_eq!(client.state(), ConnectionState::Authenticated);
        assert!(client.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn connect_twice_opens_one_transport() {
        let (client, connector) = client_with(config());
        client.connect();
        client.connect();
        let _peer = next_peer(&connector).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        client.connect();
        assert_eq!(connector.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn join_before_authentication_is_dropped() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.next_command().await; // authenticate

        assert!(!client.join(&RoomKey::post("p0")));
        assert!(client.joined_rooms().is_empty());

        peer.accept_auth();
        next_event(&mut events, EventName::Authenticated).await;

        assert!(client.join(&RoomKey::conversation("c1")));
        assert_eq!(
            peer.next_command().await,
            ClientCommand::JoinConversation {
                conversation_id: "c1".into()
            }
        );
        assert_eq!(client.joined_rooms(), vec![RoomKey::conversation("c1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn leave_emits_and_untracks() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        let room = RoomKey::poll("q1");
        client.join(&room);
        assert_eq!(
            peer.next_command().await,
            ClientCommand::JoinPoll {
                poll_id: "q1".into()
            }
        );
        assert!(client.is_joined(&room));
        assert!(client.leave(&room));
        assert_eq!(
            peer.next_command().await,
            ClientCommand::LeavePoll {
                poll_id: "q1".into()
            }
        );
        assert!(!client.is_joined(&room));
        assert!(client.joined_rooms().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn leave_all_leaves_each_room_by_kind() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        client.join(&RoomKey::post("p1"));
        client.join(&RoomKey::conversation("c1"));
        peer.next_command().await;
        peer.next_command().await;

        assert_eq!(client.leave_all(), 2);
        let mut leaves = vec![peer.next_command().await, peer.next_command().await];
        leaves.sort_by_key(|c| format!("{c:?}"));
        assert_eq!(
            leaves,
            vec![
                ClientCommand::LeaveConversation {
                    conversation_id: "c1".into()
                },
                ClientCommand::LeavePost {
                    post_id: "p1".into()
                },
            ]
        );
        assert!(client.joined_rooms().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_always_resets_state() {
        let (client, connector) = client_with(config());
        // From cold.
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;
        client.join(&RoomKey::conversation("c1"));

        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert!(!client.is_authenticated());
        assert!(client.joined_rooms().is_empty());
        let event = next_event(&mut events, EventName::Disconnect).await;
        assert_eq!(
            event,
            ServerEvent::Disconnect(DisconnectInfo {
                reason: CLIENT_DISCONNECT_REASON.into()
            })
        );

        // Idempotent.
        client.disconnect();
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_receives_payload_until_unregistered() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        assert!(client.register(
            HandlerSet::new("chat-1").on::<NewMessage>(move |msg| sink.lock().push(msg.clone()))
        ));

        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        peer.emit(message("m1", Some("c1")));
        next_event(&mut events, EventName::NewMessage).await;
        assert_eq!(received.lock().len(), 1);
        assert_eq!(received.lock()[0].id, "m1");
        assert_eq!(received.lock()[0].conversation_id.as_deref(), Some("c1"));

        assert!(client.unregister("chat-1"));
        peer.emit(message("m2", None));
        next_event(&mut events, EventName::NewMessage).await;
        assert_eq!(received.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_registration_delivers_once() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        let count = Arc::new(AtomicUsize::new(0));
        for _ in 0..2 {
            let count = Arc::clone(&count);
            client.register(HandlerSet::new("chat-1").on::<NewMessage>(move |_| {
                count.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert_eq!(client.handler_count(), 2); // chat-1 and the recorder

        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;
        peer.emit(message("m1", Some("c1")));
        next_event(&mut events, EventName::NewMessage).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_consumer_does_not_silence_others() {
        let (client, connector) = client_with(config());
        client.register(HandlerSet::new("faulty").on::<NewMessage>(|_| panic!("render failed")));
        let mut events = record_events(&client, "recorder");

        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;
        peer.emit(message("m1", Some("c1")));

        let event = next_event(&mut events, EventName::NewMessage).await;
        assert_eq!(event, message("m1", Some("c1")));
        assert!(client.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn subscription_is_typed_and_disposable() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        let ids = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ids);
        let subscription = client.subscribe::<NewMessage>(move |msg| sink.lock().push(msg.id.clone()));

        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        peer.emit(message("m1", None));
        next_event(&mut events, EventName::NewMessage).await;
        subscription.unsubscribe();
        peer.emit(message("m2", None));
        next_event(&mut events, EventName::NewMessage).await;

        assert_eq!(*ids.lock(), vec!["m1".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn handlers_may_join_rooms_when_authenticated() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        let inner = client.clone();
        client.register(HandlerSet::new("chat-screen").on::<Authenticated>(move |_| {
            inner.join(&RoomKey::conversation("c9"));
        }));

        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;
        assert_eq!(
            peer.next_command().await,
            ClientCommand::JoinConversation {
                conversation_id: "c9".into()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn authentication_failure_keeps_rooms_gated() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.next_command().await;

        peer.emit(ServerEvent::AuthenticationFailed(ErrorInfo::new("bad token")));
        let event = next_event(&mut events, EventName::AuthenticationFailed).await;
        assert_eq!(event, ServerEvent::AuthenticationFailed(ErrorInfo::new("bad token")));
        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(!client.join(&RoomKey::conversation("c1")));
        assert!(!client.start_typing("c1"));
    }

    #[tokio::test(start_paused = true)]
    async fn unsuccessful_authenticated_reply_counts_as_failure() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.next_command().await;

        peer.emit(ServerEvent::Authenticated(hubbub_shared::AuthenticatedInfo {
            success: false,
            user_id: None,
        }));
        next_event(&mut events, EventName::AuthenticationFailed).await;
        assert_eq!(client.state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn unparsable_frames_are_skipped() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        peer.send_raw("not json");
        peer.send_raw(r#"{"id":"x","type":"presence-update","data":{},"ts":"2026-01-01T00:00:00Z"}"#);
        peer.emit(message("m1", None));

        let event = events.recv().await.unwrap();
        assert_eq!(event.name(), EventName::NewMessage);
        assert!(client.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn loosely_shaped_payloads_are_delivered() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.next_command().await; // authenticate

        peer.send_raw(r#"{"type":"authentication-failed","data":"token expired"}"#);
        let failed = next_event(&mut events, EventName::AuthenticationFailed).await;
        assert_eq!(
            failed,
            ServerEvent::AuthenticationFailed(ErrorInfo::new("token expired"))
        );
        assert_eq!(client.state(), ConnectionState::Connected);

        peer.authenticate(&mut events).await;
        peer.send_raw(r#"{"type":"user-recording","data":{"userId":"u1","conversationId":"c1"}}"#);
        peer.send_raw(r#"{"type":"media-upload-progress","data":{"progress":50}}"#);
        peer.send_raw(
            r#"{"type":"post-creation-progress","data":{"postId":"p1","status":"processing","progress":0.4,"timestamp":1714564800000}}"#,
        );
        peer.send_raw(r#"{"type":"poll-vote","data":7}"#);
        peer.emit(message("sentinel", None));

        let mut names = Vec::new();
        loop {
            let event = events.recv().await.unwrap();
            if event == message("sentinel", None) {
                break;
            }
            names.push(event.name());
            if let ServerEvent::Unparsed(raw) = &event {
                assert_eq!(raw.data, serde_json::json!(7));
            }
        }
        assert_eq!(
            names,
            vec![
                EventName::UserRecording,
                EventName::MediaUploadProgress,
                EventName::PostCreationProgress,
                EventName::PollVote,
            ]
        );
        assert!(client.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn handler_disconnecting_stops_remaining_fan_out() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        let closer = client.clone();
        client.register(HandlerSet::new("closer").on::<NewMessage>(move |_| closer.disconnect()));
        let late = Arc::new(AtomicUsize::new(0));
        let l = Arc::clone(&late);
        client.register(HandlerSet::new("late").on::<NewMessage>(move |_| {
            l.fetch_add(1, Ordering::SeqCst);
        }));

        peer.emit(message("m1", None));
        next_event(&mut events, EventName::NewMessage).await;
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
        assert_eq!(late.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_rejoins_rooms_and_reauthenticates() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;
        client.join(&RoomKey::conversation("c1"));
        peer.next_command().await;

        let dropped_at = Instant::now();
        drop(peer);
        next_event(&mut events, EventName::Disconnect).await;
        assert!(client.joined_rooms().is_empty());
        assert!(!client.is_authenticated());

        let mut peer = next_peer(&connector).await;
        assert_eq!(
            connector.attempt_times()[1] - dropped_at,
            Duration::from_millis(1000)
        );
        next_event(&mut events, EventName::Connect).await;
        let reconnect = next_event(&mut events, EventName::Reconnect).await;
        assert_eq!(reconnect, ServerEvent::Reconnect(ReconnectInfo { attempts: 1 }));

        assert_eq!(
            peer.next_command().await,
            ClientCommand::Authenticate {
                identity: "alice".into()
            }
        );
        peer.accept_auth();
        assert_eq!(
            peer.next_command().await,
            ClientCommand::JoinConversation {
                conversation_id: "c1".into()
            }
        );
        next_event(&mut events, EventName::Authenticated).await;
        assert_eq!(client.joined_rooms(), vec![RoomKey::conversation("c1")]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_doubles_then_gives_up() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        connector.set_refusing(true);
        let dropped_at = Instant::now();
        drop(peer);

        let failed = next_event(&mut events, EventName::ReconnectFailed).await;
        assert_eq!(
            failed,
            ServerEvent::ReconnectFailed(ReconnectFailedInfo { attempts: 4 })
        );
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let times = connector.attempt_times();
        assert_eq!(times.len(), 5);
        let mut previous = dropped_at;
        let gaps: Vec<u128> = times[1..]
            .iter()
            .map(|t| {
                let gap = (*t - previous).as_millis();
                previous = *t;
                gap
            })
            .collect();
        assert_eq!(gaps, vec![1000, 2000, 4000, 8000]);

        // Nothing further is scheduled.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(connector.attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn initial_connect_failure_is_retried() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        connector.set_refusing(true);
        client.connect();

        let error = next_event(&mut events, EventName::Error).await;
        assert!(matches!(error, ServerEvent::Error(ErrorInfo { ref message, .. }) if message.contains("refused")));
        assert_eq!(client.state(), ConnectionState::Reconnecting { attempt: 1 });

        connector.set_refusing(false);
        let _peer = next_peer(&connector).await;
        next_event(&mut events, EventName::Connect).await;
        assert_eq!(client.state(), ConnectionState::Connected);

        // Nothing was lost, so there is nothing to report as a reconnect.
        tokio::time::sleep(Duration::from_millis(10)).await;
        while let Ok(event) = events.try_recv() {
            assert_ne!(event.name(), EventName::Reconnect);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_after_failed_initial_connect_reports_only_real_drops() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        connector.set_refusing(true);
        client.connect();
        next_event(&mut events, EventName::Error).await;

        connector.set_refusing(false);
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        drop(peer);
        next_event(&mut events, EventName::Disconnect).await;
        let _peer = next_peer(&connector).await;
        let reconnect = next_event(&mut events, EventName::Reconnect).await;
        assert_eq!(reconnect, ServerEvent::Reconnect(ReconnectInfo { attempts: 1 }));
    }

    #[tokio::test(start_paused = true)]
    async fn disconnect_cancels_pending_reconnect() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        drop(peer);
        next_event(&mut events, EventName::Disconnect).await;
        assert_eq!(client.state(), ConnectionState::Reconnecting { attempt: 1 });

        client.disconnect();
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_without_auto_reconnect_stays_down() {
        let (client, connector) = client_with(config().with_auto_reconnect(false));
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        drop(peer);
        next_event(&mut events, EventName::Disconnect).await;
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // A fresh connect works after the driver stopped.
        client.connect();
        let _peer = next_peer(&connector).await;
        assert_eq!(connector.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn update_config_applies_without_reconnecting() {
        let (client, connector) = client_with(config());
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        peer.authenticate(&mut events).await;

        client.update_config(ConfigUpdate::identity("bob", "t1"));
        assert!(client.start_typing("c1"));
        assert_eq!(
            peer.next_command().await,
            ClientCommand::TypingStart {
                conversation_id: "c1".into(),
                identity: "bob".into()
            }
        );
        assert_eq!(connector.attempts(), 1);
        assert_eq!(client.config().token, "t1");

        drop(peer);
        let peer = next_peer(&connector).await;
        assert_eq!(peer.token(), "t1");
    }

    #[tokio::test(start_paused = true)]
    async fn no_identity_stays_connected_but_unauthenticated() {
        let mut cfg = config();
        cfg.identity = None;
        let (client, connector) = client_with(cfg);
        let mut events = record_events(&client, "recorder");
        client.connect();
        let mut peer = next_peer(&connector).await;
        next_event(&mut events, EventName::Connect).await;

        assert_eq!(client.state(), ConnectionState::Connected);
        assert!(peer.try_next_command().is_none());
    }
}
