//! Realtime wire protocol.
//!
//! Every frame is a JSON text frame: an envelope whose payload is an
//! adjacently tagged enum, e.g.
//!
//! ```json
//! {"id":"…","type":"join-conversation","data":{"conversationId":"c1"},"ts":"…"}
//! ```

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RealtimeError;
use crate::models::*;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WsEnvelope<T> {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub payload: T,
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl<T> WsEnvelope<T> {
    /// Wrap a payload with a fresh id and the current timestamp.
    pub fn new(payload: T) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload,
            ts: Utc::now(),
            correlation_id: None,
        }
    }

    pub fn with_correlation(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Commands emitted by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientCommand {
    Authenticate {
        identity: String,
    },
    #[serde(rename_all = "camelCase")]
    JoinPost { post_id: String },
    #[serde(rename_all = "camelCase")]
    LeavePost { post_id: String },
    #[serde(rename_all = "camelCase")]
    JoinConversation { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    LeaveConversation { conversation_id: String },
    #[serde(rename_all = "camelCase")]
    JoinPoll { poll_id: String },
    #[serde(rename_all = "camelCase")]
    LeavePoll { poll_id: String },
    #[serde(rename_all = "camelCase")]
    TypingStart {
        conversation_id: String,
        identity: String,
    },
    #[serde(rename_all = "camelCase")]
    TypingStop {
        conversation_id: String,
        identity: String,
    },
    #[serde(rename_all = "camelCase")]
    RecordingStart {
        conversation_id: String,
        identity: String,
    },
    #[serde(rename_all = "camelCase")]
    RecordingStop {
        conversation_id: String,
        identity: String,
    },
}

/// Events fanned out to handlers.
///
/// Most arrive from the server. `Connect`, `Disconnect`, `Reconnect`,
/// `ReconnectFailed` and `Error` are synthesized by the client from
/// transport activity and dispatched through the same path.
///
/// A known event whose data does not fit its payload type is kept as
/// [`ServerEvent::Unparsed`] (see [`decode_server_frame`]); it reaches
/// `on_event` and `on_any` callbacks for its name but not typed ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerEvent {
    Connect(ConnectInfo),
    Disconnect(DisconnectInfo),
    Reconnect(ReconnectInfo),
    ReconnectFailed(ReconnectFailedInfo),
    Error(ErrorInfo),
    Authenticated(AuthenticatedInfo),
    AuthenticationFailed(ErrorInfo),
    NewPost(Post),
    PostCreationProgress(PostCreationProgress),
    PostCreationComplete(Post),
    PostCreationError(PostCreationError),
    NewComment(Comment),
    NewLike(Like),
    PopularPostUpdate(PopularPostUpdate),
    ViralPost(ViralPost),
    NewFollower(UserSummary),
    FollowingStatusUpdate(FollowingStatusUpdate),
    NewMessage(ChatMessage),
    MessageReaction(MessageReaction),
    RemoveMessageReaction(RemovedReaction),
    MessageUpdated(ChatMessage),
    MessageDeleted(MessageRef),
    MessageRead(MessageRef),
    UserTyping(ParticipantActivity),
    UserStoppedTyping(ParticipantActivity),
    UserRecording(ParticipantActivity),
    UserStoppedRecording(ParticipantActivity),
    Notification(Notification),
    MediaUploadProgress(MediaUploadProgress),
    MediaUploadComplete(MediaUploadResult),
    MediaUploadError(MediaUploadError),
    PollVote(PollVote),
    PollExpired(PollExpired),
    HashtagTrending(HashtagTrending),
    TrendingHashtagUpdate(TrendingHashtagUpdate),
    #[serde(skip)]
    Unparsed(RawEvent),
}

/// A known event carrying data of an unexpected shape.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEvent {
    pub name: EventName,
    pub data: Value,
}

/// Discriminant of a [`ServerEvent`], used to key handler callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventName {
    Connect,
    Disconnect,
    Reconnect,
    ReconnectFailed,
    Error,
    Authenticated,
    AuthenticationFailed,
    NewPost,
    PostCreationProgress,
    PostCreationComplete,
    PostCreationError,
    NewComment,
    NewLike,
    PopularPostUpdate,
    ViralPost,
    NewFollower,
    FollowingStatusUpdate,
    NewMessage,
    MessageReaction,
    RemoveMessageReaction,
    MessageUpdated,
    MessageDeleted,
    MessageRead,
    UserTyping,
    UserStoppedTyping,
    UserRecording,
    UserStoppedRecording,
    Notification,
    MediaUploadProgress,
    MediaUploadComplete,
    MediaUploadError,
    PollVote,
    PollExpired,
    HashtagTrending,
    TrendingHashtagUpdate,
}

impl EventName {
    pub const ALL: [EventName; 35] = {
        use EventName::*;
        [
            Connect,
            Disconnect,
            Reconnect,
            ReconnectFailed,
            Error,
            Authenticated,
            AuthenticationFailed,
            NewPost,
            PostCreationProgress,
            PostCreationComplete,
            PostCreationError,
            NewComment,
            NewLike,
            PopularPostUpdate,
            ViralPost,
            NewFollower,
            FollowingStatusUpdate,
            NewMessage,
            MessageReaction,
            RemoveMessageReaction,
            MessageUpdated,
            MessageDeleted,
            MessageRead,
            UserTyping,
            UserStoppedTyping,
            UserRecording,
            UserStoppedRecording,
            Notification,
            MediaUploadProgress,
            MediaUploadComplete,
            MediaUploadError,
            PollVote,
            PollExpired,
            HashtagTrending,
            TrendingHashtagUpdate,
        ]
    };

    /// Wire name, as used in the envelope's `type` field.
    pub fn as_str(&self) -> &'static str {
        use EventName::*;
        match self {
            Connect => "connect",
            Disconnect => "disconnect",
            Reconnect => "reconnect",
            ReconnectFailed => "reconnect-failed",
            Error => "error",
            Authenticated => "authenticated",
            AuthenticationFailed => "authentication-failed",
            NewPost => "new-post",
            PostCreationProgress => "post-creation-progress",
            PostCreationComplete => "post-creation-complete",
            PostCreationError => "post-creation-error",
            NewComment => "new-comment",
            NewLike => "new-like",
            PopularPostUpdate => "popular-post-update",
            ViralPost => "viral-post",
            NewFollower => "new-follower",
            FollowingStatusUpdate => "following-status-update",
            NewMessage => "new-message",
            MessageReaction => "message-reaction",
            RemoveMessageReaction => "remove-message-reaction",
            MessageUpdated => "message-updated",
            MessageDeleted => "message-deleted",
            MessageRead => "message-read",
            UserTyping => "user-typing",
            UserStoppedTyping => "user-stopped-typing",
            UserRecording => "user-recording",
            UserStoppedRecording => "user-stopped-recording",
            Notification => "notification",
            MediaUploadProgress => "media-upload-progress",
            MediaUploadComplete => "media-upload-complete",
            MediaUploadError => "media-upload-error",
            PollVote => "poll-vote",
            PollExpired => "poll-expired",
            HashtagTrending => "hashtag-trending",
            TrendingHashtagUpdate => "trending-hashtag-update",
        }
    }
}

impl FromStr for EventName {
    type Err = RealtimeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventName::ALL
            .into_iter()
            .find(|name| name.as_str() == s)
            .ok_or_else(|| RealtimeError::UnknownEventName(s.to_string()))
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ServerEvent {
    pub fn name(&self) -> EventName {
        match self {
            ServerEvent::Connect(_) => EventName::Connect,
            ServerEvent::Disconnect(_) => EventName::Disconnect,
            ServerEvent::Reconnect(_) => EventName::Reconnect,
            ServerEvent::ReconnectFailed(_) => EventName::ReconnectFailed,
            ServerEvent::Error(_) => EventName::Error,
            ServerEvent::Authenticated(_) => EventName::Authenticated,
            ServerEvent::AuthenticationFailed(_) => EventName::AuthenticationFailed,
            ServerEvent::NewPost(_) => EventName::NewPost,
            ServerEvent::PostCreationProgress(_) => EventName::PostCreationProgress,
            ServerEvent::PostCreationComplete(_) => EventName::PostCreationComplete,
            ServerEvent::PostCreationError(_) => EventName::PostCreationError,
            ServerEvent::NewComment(_) => EventName::NewComment,
            ServerEvent::NewLike(_) => EventName::NewLike,
            ServerEvent::PopularPostUpdate(_) => EventName::PopularPostUpdate,
            ServerEvent::ViralPost(_) => EventName::ViralPost,
            ServerEvent::NewFollower(_) => EventName::NewFollower,
            ServerEvent::FollowingStatusUpdate(_) => EventName::FollowingStatusUpdate,
            ServerEvent::NewMessage(_) => EventName::NewMessage,
            ServerEvent::MessageReaction(_) => EventName::MessageReaction,
            ServerEvent::RemoveMessageReaction(_) => EventName::RemoveMessageReaction,
            ServerEvent::MessageUpdated(_) => EventName::MessageUpdated,
            ServerEvent::MessageDeleted(_) => EventName::MessageDeleted,
            ServerEvent::MessageRead(_) => EventName::MessageRead,
            ServerEvent::UserTyping(_) => EventName::UserTyping,
            ServerEvent::UserStoppedTyping(_) => EventName::UserStoppedTyping,
            ServerEvent::UserRecording(_) => EventName::UserRecording,
            ServerEvent::UserStoppedRecording(_) => EventName::UserStoppedRecording,
            ServerEvent::Notification(_) => EventName::Notification,
            ServerEvent::MediaUploadProgress(_) => EventName::MediaUploadProgress,
            ServerEvent::MediaUploadComplete(_) => EventName::MediaUploadComplete,
            ServerEvent::MediaUploadError(_) => EventName::MediaUploadError,
            ServerEvent::PollVote(_) => EventName::PollVote,
            ServerEvent::PollExpired(_) => EventName::PollExpired,
            ServerEvent::HashtagTrending(_) => EventName::HashtagTrending,
            ServerEvent::TrendingHashtagUpdate(_) => EventName::TrendingHashtagUpdate,
            ServerEvent::Unparsed(raw) => raw.name,
        }
    }
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
}

/// Decode a server frame.
///
/// Frames of a known type whose data does not match the payload model are
/// returned as [`ServerEvent::Unparsed`] rather than rejected. Unknown types
/// and invalid JSON are errors.
pub fn decode_server_frame(text: &str) -> Result<WsEnvelope<ServerEvent>, serde_json::Error> {
    let typed_err = match serde_json::from_str::<WsEnvelope<ServerEvent>>(text) {
        Ok(envelope) => return Ok(envelope),
        Err(e) => e,
    };
    let Ok(raw) = serde_json::from_str::<WsEnvelope<RawFrame>>(text) else {
        return Err(typed_err);
    };
    let Ok(name) = raw.payload.kind.parse::<EventName>() else {
        return Err(typed_err);
    };
    Ok(WsEnvelope {
        id: raw.id,
        payload: ServerEvent::Unparsed(RawEvent {
            name,
            data: raw.payload.data,
        }),
        ts: raw.ts,
        correlation_id: raw.correlation_id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_command_uses_kebab_type_and_camel_fields() {
        let env = WsEnvelope::new(ClientCommand::TypingStart {
            conversation_id: "c1".into(),
            identity: "alice".into(),
        });
        let value = serde_json::to_value(&env).unwrap();
        assert_eq!(value["type"], "typing-start");
        assert_eq!(
            value["data"],
            json!({"conversationId": "c1", "identity": "alice"})
        );
        assert!(value.get("correlationId").is_none());
    }

    #[test]
    fn server_event_parses_from_envelope() {
        let text = json!({
            "id": "e1",
            "type": "new-message",
            "data": {"id": "m1", "conversationId": "c1"},
            "ts": "2026-01-01T00:00:00Z"
        })
        .to_string();
        let env: WsEnvelope<ServerEvent> = serde_json::from_str(&text).unwrap();
        assert_eq!(env.payload.name(), EventName::NewMessage);
        match env.payload {
            ServerEvent::NewMessage(msg) => {
                assert_eq!(msg.id, "m1");
                assert_eq!(msg.conversation_id.as_deref(), Some("c1"));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn event_name_matches_serialized_tag() {
        let events = [
            ServerEvent::AuthenticationFailed(ErrorInfo::new("bad token")),
            ServerEvent::UserStoppedTyping(ParticipantActivity {
                username: "bob".into(),
                conversation_id: "c1".into(),
                ..Default::default()
            }),
            ServerEvent::PollVote(PollVote {
                poll_id: "p1".into(),
                voter: "carol".into(),
                option_ids: vec!["a".into()],
            }),
            ServerEvent::TrendingHashtagUpdate(TrendingHashtagUpdate::default()),
        ];
        for event in events {
            let value = serde_json::to_value(&event).unwrap();
            assert_eq!(value["type"], event.name().as_str());
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let text = r#"{"id":"e1","type":"presence","data":{},"ts":"2026-01-01T00:00:00Z"}"#;
        assert!(serde_json::from_str::<WsEnvelope<ServerEvent>>(text).is_err());
        assert!(decode_server_frame(text).is_err());
        assert!(decode_server_frame("not json").is_err());
    }

    #[test]
    fn event_names_round_trip_through_wire_names() {
        for name in EventName::ALL {
            assert_eq!(name.as_str().parse::<EventName>(), Ok(name));
        }
        assert_eq!(
            "presence".parse::<EventName>(),
            Err(RealtimeError::UnknownEventName("presence".into()))
        );
    }

    #[test]
    fn loosely_shaped_frames_still_decode() {
        let auth = decode_server_frame(
            r#"{"type":"authentication-failed","data":"token expired"}"#,
        )
        .unwrap();
        assert_eq!(
            auth.payload,
            ServerEvent::AuthenticationFailed(ErrorInfo::new("token expired"))
        );
        assert_eq!(auth.id, "");

        let recording = decode_server_frame(
            r#"{"type":"user-recording","data":{"userId":"u1","conversationId":"c1"}}"#,
        )
        .unwrap();
        match recording.payload {
            ServerEvent::UserRecording(activity) => {
                assert_eq!(activity.conversation_id, "c1");
                assert_eq!(activity.extra["userId"], "u1");
            }
            other => panic!("unexpected event {other:?}"),
        }

        let progress =
            decode_server_frame(r#"{"type":"media-upload-progress","data":{"progress":50}}"#)
                .unwrap();
        assert_eq!(progress.payload.name(), EventName::MediaUploadProgress);
        assert!(matches!(progress.payload, ServerEvent::MediaUploadProgress(ref p) if p.progress == 50.0));

        let created = decode_server_frame(
            r#"{"type":"post-creation-progress","data":{"postId":"p1","status":"uploading","progress":0.5,"timestamp":1714564800000}}"#,
        )
        .unwrap();
        match created.payload {
            ServerEvent::PostCreationProgress(progress) => {
                assert_eq!(progress.post_id, "p1");
                assert_eq!(progress.timestamp, Some(Timestamp::EpochMillis(1_714_564_800_000)));
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[test]
    fn mismatched_data_falls_back_to_raw_event() {
        let text = r#"{"id":"e9","type":"poll-vote","data":7,"ts":"2026-01-01T00:00:00Z","correlationId":"r1"}"#;
        let envelope = decode_server_frame(text).unwrap();
        assert_eq!(envelope.id, "e9");
        assert_eq!(envelope.correlation_id.as_deref(), Some("r1"));
        assert_eq!(
            envelope.payload,
            ServerEvent::Unparsed(RawEvent {
                name: EventName::PollVote,
                data: json!(7),
            })
        );
        assert_eq!(envelope.payload.name(), EventName::PollVote);
    }
}
