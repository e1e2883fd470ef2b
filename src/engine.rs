//! Engine Wiring
//!
//! Builds the service graph for one signed-in user: every service receives
//! the document store and identity by constructor injection, so a test or
//! embedder swaps the store without touching the services.

use std::sync::Arc;

use crate::application::services::{
    MessageServiceImpl, PresenceService, RoomServiceImpl, SearchService, UnreadService,
};
use crate::config::Settings;
use crate::domain::Identity;
use crate::infrastructure::store::{DocumentStore, InMemoryStore};

/// One user's chat engine: room directory, message ledger, presence
/// signaler, unread accounting and search over a shared store handle.
pub struct ChatEngine<S: DocumentStore> {
    pub rooms: Arc<RoomServiceImpl<S>>,
    pub messages: Arc<MessageServiceImpl<S>>,
    pub presence: Arc<PresenceService<S>>,
    pub unread: Arc<UnreadService<S>>,
    pub search: Arc<SearchService<S>>,
}

impl<S: DocumentStore> ChatEngine<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>, settings: Settings) -> Self {
        let settings = Arc::new(settings);

        tracing::debug!(
            user_id = %identity.user_id(),
            environment = %settings.environment,
            "chat engine built"
        );

        Self {
            rooms: Arc::new(RoomServiceImpl::new(Arc::clone(&store), Arc::clone(&identity))),
            messages: Arc::new(MessageServiceImpl::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                Arc::clone(&settings),
            )),
            presence: Arc::new(PresenceService::new(
                Arc::clone(&store),
                Arc::clone(&identity),
                &settings,
            )),
            unread: Arc::new(UnreadService::new(Arc::clone(&store), Arc::clone(&identity))),
            search: Arc::new(SearchService::new(store, identity)),
        }
    }
}

impl ChatEngine<InMemoryStore> {
    /// Engine over a fresh in-memory store, for tests and local development.
    pub fn in_memory(identity: Arc<dyn Identity>, settings: Settings) -> Self {
        let store = Arc::new(InMemoryStore::with_max_batch_size(
            settings.store.max_batch_size,
        ));
        Self::new(store, identity, settings)
    }
}
