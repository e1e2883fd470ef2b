//! Application Error Types
//!
//! Centralized error handling for the chat engine. Every service operation
//! fails with a `ChatError` so the UI layer can branch on the kind
//! (silent retry for transient store failures, explicit messaging for
//! validation/authorization failures).

use crate::infrastructure::store::StoreError;

/// Chat engine error type
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    /// Bad participant arity or kind for a room creation request
    #[error("Invalid room spec: {0}")]
    InvalidRoomSpec(String),

    /// Bad message payload (empty body without attachment, over-length
    /// content)
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    /// Caller is not allowed to perform the operation
    /// (edit/delete by a non-owner, leaving a direct room)
    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Room not found: {0}")]
    RoomNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    /// A stored document did not decode into its entity shape
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    /// Transient backend failure; candidate for caller-controlled retry
    #[error("Store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// A chunked bulk operation partially succeeded; carries the document
    /// ids of the sub-operations that failed
    #[error("Batch partially failed: {} operation(s) failed", failed.len())]
    BatchPartialFailure { failed: Vec<String> },
}

impl ChatError {
    /// Whether a caller may retry the failed operation.
    ///
    /// Only transient store failures qualify. Validation and authorization
    /// errors are deterministic and are never retried; callers must still
    /// restrict blind retries to idempotent operations (`mark_delivered`,
    /// `mark_all_read`, membership changes); `send` and room creation need
    /// a client-assigned dedup token first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Stable machine-readable kind, for UI-side dispatch and logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidRoomSpec(_) => "invalid_room_spec",
            Self::InvalidMessage(_) => "invalid_message",
            Self::NotAuthorized(_) => "not_authorized",
            Self::RoomNotFound(_) => "room_not_found",
            Self::MessageNotFound(_) => "message_not_found",
            Self::MalformedDocument(_) => "malformed_document",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::BatchPartialFailure { .. } => "batch_partial_failure",
        }
    }
}
