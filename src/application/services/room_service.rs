//! Room Service
//!
//! Owns chat-room lifecycle: creation, direct-chat deduplication, group
//! membership changes and room deletion.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    direct_room_id, messages_collection, ChatRoom, Identity, Participant, ParticipantRole,
    RoomKind, ROOMS_COLLECTION,
};
use crate::infrastructure::store::{
    chunk_writes, decode, encode, Condition, DocumentStore, FieldOp, Query, WriteOp,
};
use crate::shared::error::ChatError;
use crate::shared::validation::room_spec_error;

/// Room directory trait
#[async_trait]
pub trait RoomService: Send + Sync {
    /// Create a room from an explicit spec, returning its id
    async fn create_room(&self, request: CreateRoomDto) -> Result<String, ChatError>;

    /// Fetch a room by id
    async fn get_room(&self, room_id: &str) -> Result<ChatRoom, ChatError>;

    /// Return the direct room with another user, creating it if absent
    async fn get_or_create_direct_room(
        &self,
        other_id: &str,
        other_name: &str,
        other_role: ParticipantRole,
    ) -> Result<ChatRoom, ChatError>;

    /// Create a group-style room; identical memberships may coexist
    async fn create_group_room(
        &self,
        name: &str,
        kind: RoomKind,
        participants: Vec<Participant>,
        class_id: Option<String>,
    ) -> Result<ChatRoom, ChatError>;

    /// Find the unique direct room for a user pair
    async fn find_direct_room(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ChatRoom>, ChatError>;

    /// Add a member; applying it twice is a no-op
    async fn add_participant(&self, room_id: &str, info: Participant) -> Result<(), ChatError>;

    /// Remove a member and their unread/typing entries; their historical
    /// messages stay untouched
    async fn remove_participant(&self, room_id: &str, user_id: &str) -> Result<(), ChatError>;

    /// Self-service removal; direct rooms cannot be left
    async fn leave_room(&self, room_id: &str) -> Result<(), ChatError>;

    /// Delete a room and cascade to its messages; irreversible
    async fn delete_room(&self, room_id: &str) -> Result<(), ChatError>;

    /// Live view of the caller's rooms, most recently updated first
    async fn stream_rooms(&self) -> BoxStream<'static, Vec<ChatRoom>>;
}

/// Room creation request
#[derive(Debug, Clone, Validate)]
pub struct CreateRoomDto {
    #[validate(length(min = 1, max = 100, message = "room name must be 1-100 characters"))]
    pub name: String,
    pub kind: RoomKind,
    #[validate(length(min = 1, message = "a room needs at least one participant"))]
    pub participants: Vec<Participant>,
    pub class_id: Option<String>,
}

/// RoomService implementation
pub struct RoomServiceImpl<S: DocumentStore> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
}

impl<S: DocumentStore> RoomServiceImpl<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>) -> Self {
        Self { store, identity }
    }

    fn build_room(
        &self,
        id: String,
        name: &str,
        kind: RoomKind,
        participants: Vec<Participant>,
        class_id: Option<String>,
    ) -> ChatRoom {
        let now = Utc::now();
        let participant_ids: Vec<String> =
            participants.iter().map(|p| p.id.clone()).collect();
        let unread_counts: HashMap<String, i64> =
            participant_ids.iter().map(|id| (id.clone(), 0)).collect();

        ChatRoom {
            id,
            name: name.to_string(),
            name_lowercase: name.to_lowercase(),
            kind,
            participant_ids,
            participants,
            class_id,
            last_message: None,
            last_message_time: None,
            last_message_sender_id: None,
            last_message_sender_name: None,
            unread_counts,
            typing_users: HashMap::new(),
            created_by: self.identity.user_id().to_string(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Find-or-create keyed by the deterministic pair id, inside one
    /// transaction, so concurrent callers converge on a single room.
    async fn upsert_direct_room(
        &self,
        name: &str,
        participants: Vec<Participant>,
    ) -> Result<ChatRoom, ChatError> {
        let room_id = direct_room_id(&participants[0].id, &participants[1].id);

        let mut tx = self.store.begin().await?;
        if let Some(doc) = tx.get(ROOMS_COLLECTION, &room_id).await? {
            return decode(&room_id, &doc);
        }

        let room = self.build_room(room_id.clone(), name, RoomKind::Direct, participants, None);
        tx.set(ROOMS_COLLECTION, &room_id, encode(&room)?);
        tx.commit().await?;

        tracing::debug!(room_id = %room_id, "direct room created");
        Ok(room)
    }
}

#[async_trait]
impl<S: DocumentStore> RoomService for RoomServiceImpl<S> {
    async fn create_room(&self, request: CreateRoomDto) -> Result<String, ChatError> {
        request.validate().map_err(room_spec_error)?;

        if request.kind == RoomKind::Direct && request.participants.len() != 2 {
            return Err(ChatError::InvalidRoomSpec(format!(
                "a direct room needs exactly two participants, got {}",
                request.participants.len()
            )));
        }

        if request.kind == RoomKind::Direct {
            let room = self
                .upsert_direct_room(&request.name, request.participants)
                .await?;
            return Ok(room.id);
        }

        let room = self.build_room(
            Uuid::new_v4().to_string(),
            &request.name,
            request.kind,
            request.participants,
            request.class_id,
        );
        self.store
            .set(ROOMS_COLLECTION, &room.id, encode(&room)?)
            .await?;

        tracing::debug!(room_id = %room.id, kind = %room.kind, "room created");
        Ok(room.id)
    }

    async fn get_room(&self, room_id: &str) -> Result<ChatRoom, ChatError> {
        let doc = self
            .store
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        decode(room_id, &doc)
    }

    async fn get_or_create_direct_room(
        &self,
        other_id: &str,
        other_name: &str,
        other_role: ParticipantRole,
    ) -> Result<ChatRoom, ChatError> {
        let self_id = self.identity.user_id();
        if other_id == self_id {
            return Err(ChatError::InvalidRoomSpec(
                "a direct room needs two distinct participants".into(),
            ));
        }

        let participants = vec![
            Participant {
                id: self_id.to_string(),
                display_name: self.identity.display_name().to_string(),
                role: self.identity.role(),
            },
            Participant {
                id: other_id.to_string(),
                display_name: other_name.to_string(),
                role: other_role,
            },
        ];

        // For direct rooms the display name is the counterpart's name.
        self.upsert_direct_room(other_name, participants).await
    }

    async fn create_group_room(
        &self,
        name: &str,
        kind: RoomKind,
        participants: Vec<Participant>,
        class_id: Option<String>,
    ) -> Result<ChatRoom, ChatError> {
        if kind == RoomKind::Direct {
            return Err(ChatError::InvalidRoomSpec(
                "direct rooms go through get_or_create_direct_room".into(),
            ));
        }
        if participants.is_empty() {
            return Err(ChatError::InvalidRoomSpec(
                "a room needs at least one participant".into(),
            ));
        }

        let room = self.build_room(
            Uuid::new_v4().to_string(),
            name,
            kind,
            participants,
            class_id,
        );
        self.store
            .set(ROOMS_COLLECTION, &room.id, encode(&room)?)
            .await?;

        tracing::debug!(room_id = %room.id, kind = %kind, "group room created");
        Ok(room)
    }

    async fn find_direct_room(
        &self,
        user_a: &str,
        user_b: &str,
    ) -> Result<Option<ChatRoom>, ChatError> {
        let room_id = direct_room_id(user_a, user_b);
        match self.store.get(ROOMS_COLLECTION, &room_id).await? {
            Some(doc) => Ok(Some(decode(&room_id, &doc)?)),
            None => Ok(None),
        }
    }

    async fn add_participant(&self, room_id: &str, info: Participant) -> Result<(), ChatError> {
        let mut tx = self.store.begin().await?;
        let doc = tx
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let room: ChatRoom = decode(room_id, &doc)?;

        if room.is_participant(&info.id) {
            return Ok(());
        }

        let user_id = info.id.clone();
        let mut participant_ids = room.participant_ids;
        participant_ids.push(user_id.clone());
        let mut participants = room.participants;
        participants.push(info);

        tx.update(
            ROOMS_COLLECTION,
            room_id,
            vec![
                FieldOp::set("participantIds", json!(participant_ids)),
                FieldOp::set("participants", serde_json::to_value(&participants).unwrap_or_default()),
                FieldOp::set(format!("unreadCounts.{}", user_id), 0),
                FieldOp::server_timestamp("updatedAt"),
            ],
        );
        tx.commit().await?;

        tracing::debug!(room_id, user_id = %user_id, "participant added");
        Ok(())
    }

    async fn remove_participant(&self, room_id: &str, user_id: &str) -> Result<(), ChatError> {
        let mut tx = self.store.begin().await?;
        let doc = tx
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let room: ChatRoom = decode(room_id, &doc)?;

        if !room.is_participant(user_id) {
            return Ok(());
        }

        let participant_ids: Vec<String> = room
            .participant_ids
            .into_iter()
            .filter(|id| id != user_id)
            .collect();
        let participants: Vec<Participant> = room
            .participants
            .into_iter()
            .filter(|p| p.id != user_id)
            .collect();

        tx.update(
            ROOMS_COLLECTION,
            room_id,
            vec![
                FieldOp::set("participantIds", json!(participant_ids)),
                FieldOp::set("participants", serde_json::to_value(&participants).unwrap_or_default()),
                FieldOp::delete(format!("unreadCounts.{}", user_id)),
                FieldOp::delete(format!("typingUsers.{}", user_id)),
                FieldOp::server_timestamp("updatedAt"),
            ],
        );
        tx.commit().await?;

        tracing::debug!(room_id, user_id, "participant removed");
        Ok(())
    }

    async fn leave_room(&self, room_id: &str) -> Result<(), ChatError> {
        let room = self.get_room(room_id).await?;
        if room.is_direct() {
            return Err(ChatError::NotAuthorized(
                "direct rooms cannot be left".into(),
            ));
        }
        self.remove_participant(room_id, self.identity.user_id())
            .await
    }

    async fn delete_room(&self, room_id: &str) -> Result<(), ChatError> {
        // Presence check first, so deleting a missing room reports RoomNotFound.
        self.get_room(room_id).await?;

        let collection = messages_collection(room_id);
        let rows = self.store.query(Query::collection(&collection)).await?;
        let ops: Vec<WriteOp> = rows
            .into_iter()
            .map(|(id, _)| WriteOp::Delete { collection: collection.clone(), id })
            .collect();

        let mut failed = Vec::new();
        for chunk in chunk_writes(ops, self.store.max_batch_size()) {
            let ids: Vec<String> = chunk.iter().map(|op| op.doc_id().to_string()).collect();
            if let Err(e) = self.store.batch_write(chunk).await {
                tracing::warn!(room_id, error = %e, "message cascade chunk failed");
                failed.extend(ids);
            }
        }
        if !failed.is_empty() {
            // The room document is kept so a retry can finish the cascade.
            return Err(ChatError::BatchPartialFailure { failed });
        }

        self.store.delete(ROOMS_COLLECTION, room_id).await?;
        tracing::info!(room_id, "room deleted");
        Ok(())
    }

    async fn stream_rooms(&self) -> BoxStream<'static, Vec<ChatRoom>> {
        let query = Query::collection(ROOMS_COLLECTION)
            .filter(Condition::array_contains(
                "participantIds",
                self.identity.user_id(),
            ))
            .order_by("updatedAt", true);

        let stream = self.store.stream(query).await.map(|rows| {
            rows.into_iter()
                .filter_map(|(id, doc)| match decode::<ChatRoom>(&id, &doc) {
                    Ok(room) => Some(room),
                    Err(e) => {
                        tracing::warn!(room_id = %id, error = %e, "skipping malformed room");
                        None
                    }
                })
                .collect()
        });
        Box::pin(stream)
    }
}
