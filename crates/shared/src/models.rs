//! Payload models carried by server events.
//!
//! Domain objects (posts, comments, messages, ...) are owned by the REST
//! layer. Here they are typed only on the fields realtime consumers key on;
//! everything else the server sends is kept in `extra` so it is relayed
//! untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Extra fields carried through without interpretation.
pub type Extra = Map<String, Value>;

// --- Connection lifecycle ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ConnectInfo {
    pub endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct DisconnectInfo {
    pub reason: String,
}

/// Sent after `connect` when the connection was re-established after a drop.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectInfo {
    /// Number of scheduled attempts it took.
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReconnectFailedInfo {
    pub attempts: u32,
}

/// An error reported by the server or the transport.
///
/// Servers send errors either as a bare string or as an object with a
/// `message` (or `error`) field; both decode to the same shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(from = "ErrorRepr")]
pub struct ErrorInfo {
    pub message: String,
    #[serde(flatten)]
    pub extra: Extra,
}

impl ErrorInfo {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extra: Extra::new(),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorRepr {
    Text(String),
    Object {
        #[serde(default, alias = "error")]
        message: String,
        #[serde(flatten)]
        extra: Extra,
    },
    Other(Value),
}

impl From<ErrorRepr> for ErrorInfo {
    fn from(repr: ErrorRepr) -> Self {
        match repr {
            ErrorRepr::Text(message) => ErrorInfo::new(message),
            ErrorRepr::Object { message, extra } => ErrorInfo { message, extra },
            ErrorRepr::Other(Value::Null) => ErrorInfo::default(),
            ErrorRepr::Other(value) => ErrorInfo::new(value.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct AuthenticatedInfo {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

// --- Posts ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PostCreationProgress {
    pub post_id: String,
    pub status: String,
    pub progress: f64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Timestamp>,
}

/// A point in time as servers send it: RFC 3339 text or epoch milliseconds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Timestamp {
    Rfc3339(DateTime<Utc>),
    EpochMillis(i64),
    Other(Value),
}

impl Timestamp {
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::Rfc3339(at) => Some(*at),
            Timestamp::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
            Timestamp::Other(_) => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PostCreationError {
    pub post_id: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Like {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PopularPostUpdate {
    pub post_id: String,
    pub likes_count: u64,
    pub comments_count: u64,
    pub engagement_score: f64,
}

/// A post that crossed the virality threshold.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ViralPost {
    pub engagement_score: f64,
    #[serde(flatten)]
    pub post: Post,
}

// --- Social graph ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UserSummary {
    pub username: String,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FollowingStatusUpdate {
    pub username: String,
    #[serde(flatten)]
    pub extra: Extra,
}

// --- Messaging ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageReaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct RemovedReaction {
    pub message_id: String,
    pub reaction_id: String,
}

/// Identifies a message for delete/read notifications.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MessageRef {
    pub message_id: String,
}

/// Typing or recording activity relayed from another participant.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ParticipantActivity {
    pub username: String,
    pub conversation_id: String,
    #[serde(flatten)]
    pub extra: Extra,
}

// --- Notifications and media ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaUploadProgress {
    pub upload_id: String,
    pub progress: f64,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaUploadResult {
    pub upload_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(flatten)]
    pub extra: Extra,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MediaUploadError {
    pub upload_id: String,
    pub error: String,
}

// --- Polls ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PollVote {
    pub poll_id: String,
    pub voter: String,
    pub option_ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct PollExpired {
    pub poll_id: String,
    pub final_results: Value,
}

// --- Trending ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct HashtagTrending {
    pub hashtag: String,
    pub recent_usage: u64,
    pub trending_score: f64,
}

/// Shape varies by server version; carried as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrendingHashtagUpdate {
    #[serde(flatten)]
    pub fields: Extra,
}
