//! Typed event markers.
//!
//! Each marker names one [`ServerEvent`] variant and fixes its payload type,
//! so callbacks get a single typed signature:
//!
//! ```rust,ignore
//! use hubbub_client::events::NewMessage;
//!
//! let _sub = client.subscribe::<NewMessage>(|msg| println!("{}", msg.id));
//! ```

use hubbub_shared::models as m;
use hubbub_shared::{EventName, ServerEvent};

/// A server event kind with a fixed payload type.
pub trait Event: 'static {
    const NAME: EventName;
    type Payload;

    /// The payload, if `event` is of this kind.
    fn payload(event: &ServerEvent) -> Option<&Self::Payload>;
}

macro_rules! typed_events {
    ($($marker:ident => $payload:ty),* $(,)?) => {
        $(
            #[derive(Debug, Clone, Copy)]
            pub struct $marker;

            impl Event for $marker {
                const NAME: EventName = EventName::$marker;
                type Payload = $payload;

                fn payload(event: &ServerEvent) -> Option<&$payload> {
                    match event {
                        ServerEvent::$marker(payload) => Some(payload),
                        _ => None,
                    }
                }
            }
        )*
    };
}

typed_events! {
    Connect => m::ConnectInfo,
    Disconnect => m::DisconnectInfo,
    Reconnect => m::ReconnectInfo,
    ReconnectFailed => m::ReconnectFailedInfo,
    Error => m::ErrorInfo,
    Authenticated => m::AuthenticatedInfo,
    AuthenticationFailed => m::ErrorInfo,
    NewPost => m::Post,
    PostCreationProgress => m::PostCreationProgress,
    PostCreationComplete => m::Post,
    PostCreationError => m::PostCreationError,
    NewComment => m::Comment,
    NewLike => m::Like,
    PopularPostUpdate => m::PopularPostUpdate,
    ViralPost => m::ViralPost,
    NewFollower => m::UserSummary,
    FollowingStatusUpdate => m::FollowingStatusUpdate,
    NewMessage => m::ChatMessage,
    MessageReaction => m::MessageReaction,
    RemoveMessageReaction => m::RemovedReaction,
    MessageUpdated => m::ChatMessage,
    MessageDeleted => m::MessageRef,
    MessageRead => m::MessageRef,
    UserTyping => m::ParticipantActivity,
    UserStoppedTyping => m::ParticipantActivity,
    UserRecording => m::ParticipantActivity,
    UserStoppedRecording => m::ParticipantActivity,
    Notification => m::Notification,
    MediaUploadProgress => m::MediaUploadProgress,
    MediaUploadComplete => m::MediaUploadResult,
    MediaUploadError => m::MediaUploadError,
    PollVote => m::PollVote,
    PollExpired => m::PollExpired,
    HashtagTrending => m::HashtagTrending,
    TrendingHashtagUpdate => m::TrendingHashtagUpdate,
}
