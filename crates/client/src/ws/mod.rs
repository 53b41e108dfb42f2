//! Realtime connection to the hubbub event service.
//!
//! This module provides:
//! - Connection management with authentication and auto-reconnect
//! - Room membership that survives reconnects
//! - Fan-out of server events to registered handler sets
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  RealtimeClient                     │
//! │   (state, config, rooms; one driver task per        │
//! │    connect() call)                                  │
//! └─────────────────────────────────────────────────────┘
//!                         │
//!                         ▼
//!              ┌─────────────────────┐
//!              │ Connector/Transport │
//!              │  (tungstenite, or a │
//!              │   mock in tests)    │
//!              └─────────────────────┘
//!                         │ inbound events
//!                         ▼
//!              ┌─────────────────────┐
//!              │   HandlerRegistry   │
//!              └─────────────────────┘
//!                         │
//!          ┌──────────────┼──────────────┐
//!          ▼              ▼              ▼
//!   ┌────────────┐ ┌────────────┐ ┌────────────┐
//!   │ HandlerSet │ │ HandlerSet │ │Subscription│
//!   │ ("chat-1") │ │ ("feed")   │ │ (typed)    │
//!   └────────────┘ └────────────┘ └────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! let client = RealtimeClient::new(ConnectionConfig::from_env());
//! client.register(
//!     HandlerSet::new("chat-1")
//!         .on::<events::NewMessage>(|msg| println!("{}", msg.id))
//!         .on::<events::UserTyping>(|who| println!("{} is typing", who.username)),
//! );
//! client.connect();
//!
//! // Once `authenticated` has been observed:
//! client.join(&RoomKey::conversation("c1"));
//! ```

mod auth;
mod connection;
pub mod events;
mod manager;
mod reconnect;
mod registry;
mod rooms;
mod signals;

#[cfg(test)]
pub(crate) mod testing;

pub use connection::{ConnectionState, Connector, Transport, TransportError, WsConnector};
pub use manager::RealtimeClient;
pub use reconnect::{ReconnectPolicy, ReconnectState};
pub use registry::{Callback, HandlerRegistry, HandlerSet, Subscription};
pub use rooms::RoomTracker;
pub use signals::Signal;
