//! Connection configuration from code or environment variables.

use std::fmt;

use crate::ws::ReconnectPolicy;

pub const DEFAULT_ENDPOINT: &str = "ws://localhost:8080/api/ws";
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

/// Settings for the realtime connection.
///
/// Mutable at runtime through [`crate::RealtimeClient::update_config`]; a
/// changed token or identity is picked up by the next connect attempt and by
/// every signal emitted afterwards.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// WebSocket endpoint, e.g. `wss://example.com/api/ws`.
    pub endpoint: String,
    /// Bearer token presented when opening the transport.
    pub token: String,
    /// Acting identity sent in the `authenticate` handshake and with signals.
    pub identity: Option<String>,
    pub auto_reconnect: bool,
    pub max_reconnect_attempts: u32,
    /// Base delay for exponential backoff, in milliseconds.
    pub reconnect_delay_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            token: String::new(),
            identity: None,
            auto_reconnect: true,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
        }
    }
}

// The token stays out of logs.
impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("endpoint", &self.endpoint)
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("identity", &self.identity)
            .field("auto_reconnect", &self.auto_reconnect)
            .field("max_reconnect_attempts", &self.max_reconnect_attempts)
            .field("reconnect_delay_ms", &self.reconnect_delay_ms)
            .finish()
    }
}

impl ConnectionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn with_identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_delay_ms = base_delay_ms;
        self
    }

    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HUBBUB_WS_URL`: WebSocket endpoint (default: `ws://localhost:8080/api/ws`)
    /// - `HUBBUB_WS_TOKEN`: bearer token (default: empty)
    /// - `HUBBUB_IDENTITY`: acting identity (default: unset)
    /// - `HUBBUB_AUTO_RECONNECT`: "true" | "false" (default: "true")
    /// - `HUBBUB_MAX_RECONNECT_ATTEMPTS`: default 5
    /// - `HUBBUB_RECONNECT_DELAY_MS`: default 1000
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`Self::from_env`] but reading from an arbitrary source.
    /// Unparsable values fall back to their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            endpoint: non_empty("HUBBUB_WS_URL").unwrap_or(defaults.endpoint),
            token: lookup("HUBBUB_WS_TOKEN").unwrap_or_default(),
            identity: non_empty("HUBBUB_IDENTITY"),
            auto_reconnect: non_empty("HUBBUB_AUTO_RECONNECT")
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.auto_reconnect),
            max_reconnect_attempts: non_empty("HUBBUB_MAX_RECONNECT_ATTEMPTS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_reconnect_attempts),
            reconnect_delay_ms: non_empty("HUBBUB_RECONNECT_DELAY_MS")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.reconnect_delay_ms),
        }
    }

    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy::new(self.max_reconnect_attempts, self.reconnect_delay_ms)
    }

    /// Merge a partial update in place.
    pub fn apply(&mut self, update: ConfigUpdate) {
        if let Some(endpoint) = update.endpoint {
            self.endpoint = endpoint;
        }
        if let Some(token) = update.token {
            self.token = token;
        }
        if let Some(identity) = update.identity {
            self.identity = Some(identity);
        }
        if let Some(enabled) = update.auto_reconnect {
            self.auto_reconnect = enabled;
        }
        if let Some(max) = update.max_reconnect_attempts {
            self.max_reconnect_attempts = max;
        }
        if let Some(delay) = update.reconnect_delay_ms {
            self.reconnect_delay_ms = delay;
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// A partial [`ConnectionConfig`]; `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ConfigUpdate {
    pub endpoint: Option<String>,
    pub token: Option<String>,
    pub identity: Option<String>,
    pub auto_reconnect: Option<bool>,
    pub max_reconnect_attempts: Option<u32>,
    pub reconnect_delay_ms: Option<u64>,
}

impl ConfigUpdate {
    /// Update for a switch of the active user: new identity and token.
    pub fn identity(identity: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            identity: Some(identity.into()),
            token: Some(token.into()),
            ..Self::default()
        }
    }
}
