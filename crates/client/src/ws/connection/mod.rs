//! Connection state and the transport seam.
//!
//! The realtime core talks to the network only through [`Connector`] and
//! [`Transport`], so tests can script a server without sockets.

use async_trait::async_trait;
use thiserror::Error;

/// Connection state of a [`crate::RealtimeClient`].
///
/// Driven only by transport and authentication events; consumers can read
/// it but never set it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticated,
    /// Waiting for, or performing, scheduled reconnect attempt `attempt` (1-based).
    Reconnecting { attempt: u32 },
}

impl ConnectionState {
    /// Transport is open, whether or not authentication has completed.
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connected | ConnectionState::Authenticated
        )
    }

    pub fn is_connecting(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Reconnecting { .. }
        )
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, ConnectionState::Authenticated)
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("send failed: {0}")]
    Send(String),
    #[error("receive failed: {0}")]
    Receive(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One open bidirectional text-frame connection.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: String) -> Result<(), TransportError>;

    /// Next text frame. `None` means the peer closed the connection.
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Opens transports to an endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        token: &str,
    ) -> Result<Box<dyn Transport>, TransportError>;
}

mod connection_native;
pub use connection_native::WsConnector;
