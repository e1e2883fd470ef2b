//! Presence Service
//!
//! Ephemeral typing indicators per room. Writes are fire-and-forget and
//! best-effort: they may be dropped under partition, a missing entry always
//! reads as "not typing", and a client-enforced TTL clears a flag that is
//! not refreshed so a disconnected client never leaves a permanent
//! indicator.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio::task::JoinHandle;

use crate::config::Settings;
use crate::domain::{ChatRoom, Identity, ROOMS_COLLECTION};
use crate::infrastructure::store::{decode, Condition, DocumentStore, FieldOp, Query};

/// Typing indicator service
pub struct PresenceService<S: DocumentStore> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
    ttl: Duration,
    debounce: Duration,
    /// Last refresh instant per room, for debouncing
    refreshes: DashMap<String, Instant>,
    /// Pending TTL expiry task per room
    expiries: DashMap<String, JoinHandle<()>>,
}

impl<S: DocumentStore> PresenceService<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>, settings: &Settings) -> Self {
        Self {
            store,
            identity,
            ttl: Duration::from_millis(settings.presence.typing_ttl_ms),
            debounce: Duration::from_millis(settings.presence.typing_debounce_ms),
            refreshes: DashMap::new(),
            expiries: DashMap::new(),
        }
    }

    /// Write the caller's typing flag for a room.
    ///
    /// Refreshes inside the debounce window are suppressed. Store failures
    /// are logged and swallowed: presence carries no durability contract.
    pub async fn set_typing(&self, room_id: &str, is_typing: bool) {
        if is_typing {
            if let Some(last) = self.refreshes.get(room_id) {
                if last.elapsed() < self.debounce {
                    return;
                }
            }
            self.refreshes.insert(room_id.to_string(), Instant::now());
            self.write_flag(room_id, true).await;
            self.schedule_expiry(room_id);
        } else {
            self.refreshes.remove(room_id);
            self.cancel_expiry(room_id);
            self.write_flag(room_id, false).await;
        }
    }

    /// Clear the caller's typing flag when leaving a room.
    pub async fn clear_room(&self, room_id: &str) {
        self.set_typing(room_id, false).await;
    }

    /// Live view of the room's typing map. A missing entry is `false`.
    pub async fn stream_typing(&self, room_id: &str) -> BoxStream<'static, HashMap<String, bool>> {
        let query =
            Query::collection(ROOMS_COLLECTION).filter(Condition::eq("id", room_id));

        let stream = self.store.stream(query).await.map(|rows| {
            rows.into_iter()
                .next()
                .and_then(|(id, doc)| decode::<ChatRoom>(&id, &doc).ok())
                .map(|room| room.typing_users)
                .unwrap_or_default()
        });
        Box::pin(stream)
    }

    async fn write_flag(&self, room_id: &str, is_typing: bool) {
        let field = format!("typingUsers.{}", self.identity.user_id());
        let op = if is_typing {
            FieldOp::set(field, true)
        } else {
            FieldOp::delete(field)
        };

        if let Err(e) = self.store.update(ROOMS_COLLECTION, room_id, vec![op]).await {
            tracing::debug!(room_id, error = %e, "typing write dropped");
        }
    }

    /// (Re)arm the TTL task that clears the flag if no refresh lands.
    fn schedule_expiry(&self, room_id: &str) {
        let store = Arc::clone(&self.store);
        let user_id = self.identity.user_id().to_string();
        let room = room_id.to_string();
        let ttl = self.ttl;

        let task = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let field = format!("typingUsers.{}", user_id);
            if let Err(e) = store
                .update(ROOMS_COLLECTION, &room, vec![FieldOp::delete(field)])
                .await
            {
                tracing::debug!(room_id = %room, error = %e, "typing expiry write dropped");
            }
        });

        if let Some(previous) = self.expiries.insert(room_id.to_string(), task) {
            previous.abort();
        }
    }

    fn cancel_expiry(&self, room_id: &str) {
        if let Some((_, task)) = self.expiries.remove(room_id) {
            task.abort();
        }
    }
}

impl<S: DocumentStore> Drop for PresenceService<S> {
    fn drop(&mut self) {
        for entry in self.expiries.iter() {
            entry.value().abort();
        }
    }
}
