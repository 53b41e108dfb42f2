//! Hubbub Client - realtime event client
//!
//! Holds one authenticated WebSocket connection to a hubbub server, keeps
//! room subscriptions alive across reconnects, and fans server events out to
//! any number of independently registered handlers.

pub mod config;
pub mod ws;

pub use config::{ConfigUpdate, ConnectionConfig};
pub use hubbub_shared::{ClientCommand, EventName, RoomKey, RoomKind, ServerEvent};
pub use ws::{
    events, ConnectionState, Connector, HandlerSet, RealtimeClient, Signal, Subscription,
    Transport, TransportError, WsConnector,
};
