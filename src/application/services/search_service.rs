//! Search Service
//!
//! Client-visible text search over room names and message content. Room
//! matching uses the denormalized `nameLowercase` key maintained at write
//! time; the candidate set is the caller's own rooms, fetched once and
//! filtered locally, which stays cheap below a few hundred rooms per user.
//! Larger deployments would delegate to an external search index.

use std::sync::Arc;

use crate::domain::{ChatRoom, Identity, Message, ROOMS_COLLECTION};
use crate::infrastructure::store::{decode, Condition, DocumentStore, Query};
use crate::shared::error::ChatError;

/// Room and message text search
pub struct SearchService<S: DocumentStore> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
}

impl<S: DocumentStore> SearchService<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>) -> Self {
        Self { store, identity }
    }

    /// Case-insensitive substring match on room names, restricted to rooms
    /// the caller participates in.
    pub async fn search_rooms(&self, query: &str) -> Result<Vec<ChatRoom>, ChatError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let rows = self
            .store
            .query(Query::collection(ROOMS_COLLECTION).filter(Condition::array_contains(
                "participantIds",
                self.identity.user_id(),
            )))
            .await?;

        let mut matches = Vec::new();
        for (id, doc) in rows {
            match decode::<ChatRoom>(&id, &doc) {
                Ok(room) if room.name_lowercase.contains(&needle) => matches.push(room),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(room_id = %id, error = %e, "skipping malformed room");
                }
            }
        }
        Ok(matches)
    }

    /// Case-insensitive substring match over message content in one room.
    /// Deleted messages never match; no ranking is applied.
    pub async fn search_messages(
        &self,
        room_id: &str,
        query: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let room_doc = self
            .store
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let room: ChatRoom = decode(room_id, &room_doc)?;
        if !room.is_participant(self.identity.user_id()) {
            return Err(ChatError::NotAuthorized(
                "only participants can search a room".into(),
            ));
        }

        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }

        let collection = crate::domain::messages_collection(room_id);
        let rows = self.store.query(Query::collection(collection)).await?;

        let mut matches = Vec::new();
        for (id, doc) in rows {
            match decode::<Message>(&id, &doc) {
                Ok(message) if message.content_matches(&needle) => matches.push(message),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(message_id = %id, error = %e, "skipping malformed message");
                }
            }
        }
        Ok(matches)
    }
}
