//! Room keys: the scopes the server multiplexes events by.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RealtimeError;
use crate::protocol::ClientCommand;

/// The kind of logical room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomKind {
    Post,
    Conversation,
    Poll,
}

impl RoomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoomKind::Post => "post",
            RoomKind::Conversation => "conversation",
            RoomKind::Poll => "poll",
        }
    }
}

impl FromStr for RoomKind {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(RoomKind::Post),
            "conversation" => Ok(RoomKind::Conversation),
            "poll" => Ok(RoomKind::Poll),
            other => Err(RealtimeError::UnknownRoomKind(other.to_string())),
        }
    }
}

/// A scoped room identifier, written `{kind}:{id}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomKey {
    kind: RoomKind,
    id: String,
}

impl RoomKey {
    pub fn new(kind: RoomKind, id: impl Into<String>) -> Self {
        Self {
            kind,
            id: id.into(),
        }
    }

    pub fn post(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Post, id)
    }

    pub fn conversation(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Conversation, id)
    }

    pub fn poll(id: impl Into<String>) -> Self {
        Self::new(RoomKind::Poll, id)
    }

    /// Parse a `{kind}:{id}` key. The id may itself contain colons.
    pub fn parse(key: &str) -> Result<Self, RealtimeError> {
        let (kind, id) = key
            .split_once(':')
            .ok_or_else(|| RealtimeError::MalformedRoomKey(key.to_string()))?;
        if id.is_empty() {
            return Err(RealtimeError::MalformedRoomKey(key.to_string()));
        }
        Ok(Self::new(kind.parse()?, id))
    }

    pub fn kind(&self) -> RoomKind {
        self.kind
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// The command that subscribes the connection to this room.
    pub fn join_command(&self) -> ClientCommand {
        let id = self.id.clone();
        match self.kind {
            RoomKind::Post => ClientCommand::JoinPost { post_id: id },
            RoomKind::Conversation => ClientCommand::JoinConversation {
                conversation_id: id,
            },
            RoomKind::Poll => ClientCommand::JoinPoll { poll_id: id },
        }
    }

    /// The command that unsubscribes the connection from this room.
    pub fn leave_command(&self) -> ClientCommand {
        let id = self.id.clone();
        match self.kind {
            RoomKind::Post => ClientCommand::LeavePost { post_id: id },
            RoomKind::Conversation => ClientCommand::LeaveConversation {
                conversation_id: id,
            },
            RoomKind::Poll => ClientCommand::LeavePoll { poll_id: id },
        }
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for RoomKey {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
