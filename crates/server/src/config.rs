//! Server configuration from environment variables.

use std::net::SocketAddr;

use anyhow::Context;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Token every connection must present. `None` accepts any token.
    pub auth_token: Option<String>,
}

impl ServerConfig {
    /// Parse configuration from environment variables.
    ///
    /// Environment variables:
    /// - `HUBBUB_BIND_ADDR`: listen address (default: "0.0.0.0:8080")
    /// - `HUBBUB_AUTH_TOKEN`: shared token clients must present (default: unset, open)
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind = lookup("HUBBUB_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
        let bind_addr = bind
            .parse()
            .with_context(|| format!("invalid HUBBUB_BIND_ADDR `{bind}`"))?;
        let auth_token = lookup("HUBBUB_AUTH_TOKEN").filter(|token| !token.is_empty());

        Ok(Self {
            bind_addr,
            auth_token,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            auth_token: None,
        }
    }
}
