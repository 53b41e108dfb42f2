//! Scripted in-memory transport for driving the client in tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hubbub_shared::{AuthenticatedInfo, ClientCommand, EventName, ServerEvent, WsEnvelope};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use super::connection::{Connector, Transport, TransportError};
use super::manager::RealtimeClient;
use super::registry::HandlerSet;

// Generous: the clock is paused, so waiting costs nothing.
const WAIT: Duration = Duration::from_secs(600);

/// Accepts (or refuses) connections and hands the server side of each
/// accepted one to the test as a [`MockPeer`].
pub(crate) struct MockConnector {
    refusing: AtomicBool,
    attempts: Mutex<Vec<Instant>>,
    peers_tx: mpsc::UnboundedSender<MockPeer>,
    peers_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<MockPeer>>,
}

impl MockConnector {
    pub(crate) fn new() -> Arc<Self> {
        let (peers_tx, peers_rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            refusing: AtomicBool::new(false),
            attempts: Mutex::new(Vec::new()),
            peers_tx,
            peers_rx: tokio::sync::Mutex::new(peers_rx),
        })
    }

    pub(crate) fn set_refusing(&self, refusing: bool) {
        self.refusing.store(refusing, Ordering::SeqCst);
    }

    pub(crate) fn attempts(&self) -> usize {
        self.attempts.lock().len()
    }

    pub(crate) fn attempt_times(&self) -> Vec<Instant> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(
        &self,
        _endpoint: &str,
        token: &str,
    ) -> Result<Box<dyn Transport>, TransportError> {
        self.attempts.lock().push(Instant::now());
        if self.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (to_client, incoming) = mpsc::unbounded_channel();
        let (outgoing, from_client) = mpsc::unbounded_channel();
        let _ = self.peers_tx.send(MockPeer {
            token: token.to_string(),
            to_client,
            from_client,
        });
        Ok(Box::new(MockTransport { incoming, outgoing }))
    }
}

struct MockTransport {
    incoming: mpsc::UnboundedReceiver<String>,
    outgoing: mpsc::UnboundedSender<String>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), TransportError> {
        self.outgoing
            .send(frame)
            .map_err(|_| TransportError::Send("peer gone".into()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        self.incoming.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.incoming.close();
        Ok(())
    }
}

/// Server side of one mock connection. Dropping it drops the connection.
pub(crate) struct MockPeer {
    token: String,
    to_client: mpsc::UnboundedSender<String>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl MockPeer {
    pub(crate) fn token(&self) -> &str {
        &self.token
    }

    pub(crate) async fn next_command(&mut self) -> ClientCommand {
        let frame = timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a command")
            .expect("client closed the connection");
        parse_command(&frame)
    }

    pub(crate) fn try_next_command(&mut self) -> Option<ClientCommand> {
        self.from_client.try_recv().ok().map(|frame| parse_command(&frame))
    }

    pub(crate) fn emit(&self, event: ServerEvent) {
        let frame = serde_json::to_string(&WsEnvelope::new(event)).expect("encode event");
        self.send_raw(frame);
    }

    pub(crate) fn send_raw(&self, frame: impl Into<String>) {
        let _ = self.to_client.send(frame.into());
    }

    /// Reply to a pending handshake with success.
    pub(crate) fn accept_auth(&self) {
        self.emit(ServerEvent::Authenticated(AuthenticatedInfo {
            success: true,
            user_id: None,
        }));
    }

    /// Expect the handshake, accept it, and wait until the client saw it.
    pub(crate) async fn authenticate(&mut self, events: &mut mpsc::UnboundedReceiver<ServerEvent>) {
        match self.next_command().await {
            ClientCommand::Authenticate { .. } => {}
            other => panic!("expected authenticate, got {other:?}"),
        }
        self.accept_auth();
        next_event(events, EventName::Authenticated).await;
    }
}

fn parse_command(frame: &str) -> ClientCommand {
    serde_json::from_str::<WsEnvelope<ClientCommand>>(frame)
        .expect("client sent a valid envelope")
        .payload
}

pub(crate) async fn next_peer(connector: &MockConnector) -> MockPeer {
    let mut peers = connector.peers_rx.lock().await;
    timeout(WAIT, peers.recv())
        .await
        .expect("timed out waiting for a connection")
        .expect("connector dropped")
}

/// Register a handler set that forwards every event to the returned channel.
pub(crate) fn record_events(
    client: &RealtimeClient,
    id: &str,
) -> mpsc::UnboundedReceiver<ServerEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    client.register(HandlerSet::new(id).on_any(move |event| {
        let _ = tx.send(event.clone());
    }));
    rx
}

/// Skip ahead to the next event named `name`.
pub(crate) async fn next_event(
    events: &mut mpsc::UnboundedReceiver<ServerEvent>,
    name: EventName,
) -> ServerEvent {
    loop {
        let event = timeout(WAIT, events.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {name}"))
            .expect("recorder dropped");
        if event.name() == name {
            return event;
        }
    }
}
