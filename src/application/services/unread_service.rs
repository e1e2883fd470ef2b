//! Unread Service
//!
//! Read-only projections of the per-participant unread counters. The
//! counters themselves are maintained inside the send and read-marking
//! transactions of the message service; these views only ever read the
//! denormalized room fields, never recount messages.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::BoxStream;
use futures::StreamExt;

use crate::domain::{ChatRoom, Identity, ROOMS_COLLECTION};
use crate::infrastructure::store::{decode, Condition, DocumentStore, Query};
use crate::shared::error::ChatError;

/// Unread counter projections
pub struct UnreadService<S: DocumentStore> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
}

impl<S: DocumentStore> UnreadService<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>) -> Self {
        Self { store, identity }
    }

    /// Unread count in one room for the caller.
    pub async fn get_unread(&self, room_id: &str) -> Result<u64, ChatError> {
        let doc = self
            .store
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let room: ChatRoom = decode(room_id, &doc)?;
        Ok(room.unread_for(self.identity.user_id()))
    }

    /// Unread counts across every room the caller participates in.
    pub async fn get_all_unread(&self) -> Result<HashMap<String, u64>, ChatError> {
        let rows = self.store.query(self.rooms_query()).await?;
        let user_id = self.identity.user_id();

        let mut counts = HashMap::with_capacity(rows.len());
        for (id, doc) in rows {
            let room: ChatRoom = decode(&id, &doc)?;
            counts.insert(id, room.unread_for(user_id));
        }
        Ok(counts)
    }

    /// Live unread map across the caller's rooms, for badge rendering.
    pub async fn stream_unread(&self) -> BoxStream<'static, HashMap<String, u64>> {
        let user_id = self.identity.user_id().to_string();

        let stream = self.store.stream(self.rooms_query()).await.map(move |rows| {
            rows.into_iter()
                .filter_map(|(id, doc)| {
                    decode::<ChatRoom>(&id, &doc)
                        .ok()
                        .map(|room| (id, room.unread_for(&user_id)))
                })
                .collect()
        });
        Box::pin(stream)
    }

    fn rooms_query(&self) -> Query {
        Query::collection(ROOMS_COLLECTION).filter(Condition::array_contains(
            "participantIds",
            self.identity.user_id(),
        ))
    }
}
