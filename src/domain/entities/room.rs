//! Chat room entity.
//!
//! Canonical schema of the `chat_rooms` collection. Field names serialize
//! in camelCase for byte-for-byte compatibility with stored data.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Store collection holding room documents.
pub const ROOMS_COLLECTION: &str = "chat_rooms";

/// Room kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RoomKind {
    /// A two-participant room, unique per unordered participant pair
    Direct,
    /// A free-form group; identical memberships may coexist
    #[default]
    Group,
    /// A room attached to a class
    Class,
    /// A broadcast-style room
    Announcement,
}

impl RoomKind {
    /// Convert from stored string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "direct" => Self::Direct,
            "group" => Self::Group,
            "class" => Self::Class,
            "announcement" => Self::Announcement,
            _ => Self::Group,
        }
    }

    /// Convert to stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
            Self::Class => "class",
            Self::Announcement => "announcement",
        }
    }
}

impl std::fmt::Display for RoomKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Platform roles carried on participant snapshots and messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantRole {
    #[default]
    Student,
    Teacher,
    Parent,
    Admin,
}

impl ParticipantRole {
    /// Convert from stored string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "student" => Self::Student,
            "teacher" => Self::Teacher,
            "parent" => Self::Parent,
            "admin" => Self::Admin,
            _ => Self::Student,
        }
    }

    /// Convert to stored string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Parent => "parent",
            Self::Admin => "admin",
        }
    }

    /// Staff roles may moderate rooms they did not create.
    pub fn is_staff(&self) -> bool {
        matches!(self, Self::Teacher | Self::Admin)
    }
}

impl std::fmt::Display for ParticipantRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Participant snapshot kept in sync with `participantIds`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub role: ParticipantRole,
}

/// Represents a chat room.
///
/// Mutated by several independent operations touching disjoint fields:
/// sends update the `lastMessage*` snapshot, read-marking updates
/// `unreadCounts`, presence updates `typingUsers`, membership updates
/// `participantIds`/`participants`. All of those go through field-level
/// partial writes, never whole-document overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRoom {
    /// Store document id
    pub id: String,

    /// Display name; for direct rooms, the counterpart's name
    pub name: String,

    /// Denormalized lowercase search key, maintained at write time
    pub name_lowercase: String,

    pub kind: RoomKind,

    /// Participant user ids; exactly two for direct rooms
    pub participant_ids: Vec<String>,

    /// Ordered participant snapshots, parallel to `participant_ids`
    pub participants: Vec<Participant>,

    /// Back-reference when `kind` is `class`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_id: Option<String>,

    /// Denormalized snapshot of the most recent message, so the room list
    /// renders without a per-room message query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_sender_name: Option<String>,

    /// Per-participant unread counters; keys always a subset of
    /// `participant_ids`
    #[serde(default)]
    pub unread_counts: HashMap<String, i64>,

    /// Ephemeral typing flags; a missing entry reads as `false`
    #[serde(default)]
    pub typing_users: HashMap<String, bool>,

    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ChatRoom {
    /// Check whether a user belongs to this room.
    pub fn is_participant(&self, user_id: &str) -> bool {
        self.participant_ids.iter().any(|id| id == user_id)
    }

    pub fn is_direct(&self) -> bool {
        matches!(self.kind, RoomKind::Direct)
    }

    /// Unread count for one participant; a missing entry reads as 0.
    pub fn unread_for(&self, user_id: &str) -> u64 {
        self.unread_counts
            .get(user_id)
            .copied()
            .map(|n| n.max(0) as u64)
            .unwrap_or(0)
    }

    /// Typing flag for one participant; a missing entry reads as `false`.
    pub fn is_typing(&self, user_id: &str) -> bool {
        self.typing_users.get(user_id).copied().unwrap_or(false)
    }
}

/// Deterministic document id for the direct room of an unordered user
/// pair. Using the id itself as the uniqueness key turns find-or-create
/// into an atomic upsert instead of a racy lookup-then-create.
pub fn direct_room_id(user_a: &str, user_b: &str) -> String {
    let (lo, hi) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };

    let mut hasher = Sha256::new();
    hasher.update(lo.as_bytes());
    hasher.update([0u8]);
    hasher.update(hi.as_bytes());
    let digest = hasher.finalize();

    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    format!("dm_{}", hex)
}
