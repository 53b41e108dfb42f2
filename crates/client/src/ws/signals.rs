//! Ephemeral participant signals: typing and voice recording indicators.
//!
//! Signals are fire-and-forget. They are never queued or replayed; one sent
//! while unauthenticated is simply dropped.

use hubbub_shared::ClientCommand;

use super::manager::RealtimeClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    TypingStart,
    TypingStop,
    RecordingStart,
    RecordingStop,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Signal::TypingStart => "typing-start",
            Signal::TypingStop => "typing-stop",
            Signal::RecordingStart => "recording-start",
            Signal::RecordingStop => "recording-stop",
        }
    }

    pub fn command(self, conversation_id: &str, identity: &str) -> ClientCommand {
        let conversation_id = conversation_id.to_string();
        let identity = identity.to_string();
        match self {
            Signal::TypingStart => ClientCommand::TypingStart {
                conversation_id,
                identity,
            },
            Signal::TypingStop => ClientCommand::TypingStop {
                conversation_id,
                identity,
            },
            Signal::RecordingStart => ClientCommand::RecordingStart {
                conversation_id,
                identity,
            },
            Signal::RecordingStop => ClientCommand::RecordingStop {
                conversation_id,
                identity,
            },
        }
    }
}

impl RealtimeClient {
    pub fn start_typing(&self, conversation_id: &str) -> bool {
        self.signal(Signal::TypingStart, conversation_id)
    }

    pub fn stop_typing(&self, conversation_id: &str) -> bool {
        self.signal(Signal::TypingStop, conversation_id)
    }

    pub fn start_recording(&self, conversation_id: &str) -> bool {
        self.signal(Signal::RecordingStart, conversation_id)
    }

    pub fn stop_recording(&self, conversation_id: &str) -> bool {
        self.signal(Signal::RecordingStop, conversation_id)
    }

    /// Send `signal` for `conversation_id` as the configured identity.
    /// Returns whether it was handed to the connection.
    pub fn signal(&self, signal: Signal, conversation_id: &str) -> bool {
        self.emit_authenticated(signal.as_str(), |config| {
            let identity = config.identity.as_deref().filter(|i| !i.is_empty())?;
            Some(signal.command(conversation_id, identity))
        })
    }
}
