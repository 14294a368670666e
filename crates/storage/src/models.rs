use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: String,
    pub avatar_url: String,
}

/// Direct chat (two participants) vs. group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum SessionType {
    Direct = 1,
    Group = 2,
}

impl SessionType {
    #[must_use]
    pub fn from_i16(v: i16) -> Option<Self> {
        match v {
            1 => Some(Self::Direct),
            2 => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Session {
    pub session_id: String,
    pub session_type: i16,
    pub name: String,
    pub owner_username: String,
    pub max_seq_id: i64,
}

/// Member role within a session: 0 = member, 1 = admin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i16)]
pub enum MemberRole {
    Member = 0,
    Admin = 1,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SessionMember {
    pub session_id: String,
    pub username: String,
    pub role: i16,
    pub last_read_seq: i64,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct MessageContent {
    pub msg_id: String,
    pub session_id: String,
    pub sender_username: String,
    pub seq_id: i64,
    pub content: String,
    pub msg_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InboxRow {
    pub id: i64,
    pub owner_username: String,
    pub session_id: String,
    pub seq_id: i64,
    pub msg_id: String,
    pub is_read: bool,
}

/// An inbox row joined with its message content and a minimal session
/// descriptor, as returned by `PullInboxDelta`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboxDeltaEvent {
    pub id: i64,
    pub session_id: String,
    pub session_name: String,
    pub msg_id: String,
    pub seq_id: i64,
    pub sender_username: String,
    pub content: String,
    pub msg_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub is_read: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub msg_id: String,
    pub topic: String,
    pub payload: serde_json::Value,
    pub status: String,
    pub retry_count: i32,
}
