//! Shared protocol types for the hubbub realtime client and relay server.

pub mod error;
pub mod models;
pub mod protocol;
pub mod room;

pub use error::*;
pub use models::*;
pub use protocol::*;
pub use room::{RoomKey, RoomKind};
