//! Application Services

pub mod message_service;
pub mod presence_service;
pub mod room_service;
pub mod search_service;
pub mod unread_service;

pub use message_service::{
    AttachmentDto, MessageService, MessageServiceImpl, SendMessageDto,
};
pub use presence_service::PresenceService;
pub use room_service::{CreateRoomDto, RoomService, RoomServiceImpl};
pub use search_service::SearchService;
pub use unread_service::UnreadService;
