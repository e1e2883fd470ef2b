//! Message entity and the delivery/read state machine.
//!
//! Messages live in a per-room subcollection. Status is monotonically
//! non-decreasing under `sent < delivered < read`; the transition helpers
//! here are the only places that move it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::room::{ParticipantRole, ROOMS_COLLECTION};

/// Subcollection holding the messages of one room.
pub fn messages_collection(room_id: &str) -> String {
    format!("{}/{}/messages", ROOMS_COLLECTION, room_id)
}

/// Delivery/read state of a message.
///
/// Variant order defines the state machine order; `Ord` is derived from it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Convert from stored string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "sent" => Self::Sent,
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            _ => Self::Sent,
        }
    }

    /// Convert to stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a message inside a chat room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Store document id
    pub id: String,

    pub sender_id: String,
    pub sender_name: String,
    pub sender_role: ParticipantRole,

    /// Text body; redacted to empty on soft delete
    pub content: String,

    /// Opaque attachment reference (URL + MIME type)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachment_type: Option<String>,

    pub status: MessageStatus,

    /// Creation time, immutable across edits
    pub timestamp: DateTime<Utc>,

    /// Set once, on the first transition into `delivered`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<DateTime<Utc>>,

    /// Set once, on the first transition into `read`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub is_edited: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<DateTime<Utc>>,

    /// Soft-delete flag; deleted messages stay in place, redacted
    #[serde(default)]
    pub is_deleted: bool,
}

impl Message {
    /// Advance `sent -> delivered`, stamping `delivered_at` once.
    ///
    /// Returns `false` without changing anything when the message is
    /// already at or past `delivered`, so repeated delivery acks are
    /// no-ops, never regressions.
    pub fn mark_delivered(&mut self, at: DateTime<Utc>) -> bool {
        if self.status >= MessageStatus::Delivered {
            return false;
        }
        self.status = MessageStatus::Delivered;
        self.delivered_at = Some(at);
        true
    }

    /// Advance to `read`, stamping `read_at` once.
    ///
    /// A message still at `sent` (no delivery ack observed) collapses
    /// through `delivered`, stamping `delivered_at` with the same instant,
    /// so `read` is never reached without a delivery time.
    pub fn mark_read(&mut self, at: DateTime<Utc>) -> bool {
        if self.status >= MessageStatus::Read {
            return false;
        }
        if self.delivered_at.is_none() {
            self.delivered_at = Some(at);
        }
        self.status = MessageStatus::Read;
        self.read_at = Some(at);
        true
    }

    /// Case-insensitive substring match over the content. Deleted messages
    /// never match.
    pub fn content_matches(&self, needle_lowercase: &str) -> bool {
        !self.is_deleted && self.content.to_lowercase().contains(needle_lowercase)
    }
}
