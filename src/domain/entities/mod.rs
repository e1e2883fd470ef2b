//! Domain Entities
//!
//! Core chat entities shared across services.

pub mod message;
pub mod room;

pub use message::{messages_collection, Message, MessageStatus};
pub use room::{
    direct_room_id, ChatRoom, Participant, ParticipantRole, RoomKind, ROOMS_COLLECTION,
};
