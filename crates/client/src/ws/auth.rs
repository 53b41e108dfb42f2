//! Post-connect authentication handshake.

use hubbub_shared::{ClientCommand, ErrorInfo, EventName, RawEvent, ServerEvent};

use crate::config::ConnectionConfig;

/// How an inbound event bears on authentication.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum AuthOutcome {
    Accepted,
    Rejected(ErrorInfo),
    Unrelated,
}

/// The handshake request for the configured identity, if there is one.
pub(crate) fn authenticate_command(config: &ConnectionConfig) -> Option<ClientCommand> {
    config
        .identity
        .as_deref()
        .filter(|identity| !identity.is_empty())
        .map(|identity| ClientCommand::Authenticate {
            identity: identity.to_string(),
        })
}

/// `authenticated{success: false}` counts as a rejection, and so does an
/// `authenticated` reply that cannot be read.
pub(crate) fn classify(event: &ServerEvent) -> AuthOutcome {
    match event {
        ServerEvent::Authenticated(info) if info.success => AuthOutcome::Accepted,
        ServerEvent::Authenticated(_) => {
            AuthOutcome::Rejected(ErrorInfo::new("server rejected authentication"))
        }
        ServerEvent::AuthenticationFailed(err) => AuthOutcome::Rejected(err.clone()),
        ServerEvent::Unparsed(RawEvent { name, data }) => match name {
            EventName::Authenticated => {
                AuthOutcome::Rejected(ErrorInfo::new("unreadable authentication reply"))
            }
            EventName::AuthenticationFailed => AuthOutcome::Rejected(ErrorInfo::new(
                data.as_str().unwrap_or("authentication failed"),
            )),
            _ => AuthOutcome::Unrelated,
        },
        _ => AuthOutcome::Unrelated,
    }
}
