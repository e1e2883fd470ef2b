//! Message Service
//!
//! Owns message creation, edit, soft deletion and the delivery/read state
//! machine, including the unread-counter bookkeeping that rides along with
//! sends and read-marking.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use futures::future::{AbortHandle, Abortable};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::json;
use uuid::Uuid;

use crate::config::Settings;
use crate::domain::{
    messages_collection, ChatRoom, Identity, Message, MessageStatus, ROOMS_COLLECTION,
};
use crate::infrastructure::store::{
    chunk_writes, decode, encode, timestamp_value, Condition, DocumentStore, FieldOp, Query,
    WriteOp,
};
use crate::shared::error::ChatError;

/// Message ledger trait
#[async_trait]
pub trait MessageService: Send + Sync {
    /// Send a message, returning its id. Creation, the room's lastMessage
    /// snapshot and the other participants' unread increments commit as one
    /// transaction.
    async fn send(&self, room_id: &str, request: SendMessageDto) -> Result<String, ChatError>;

    /// Fetch a single message
    async fn get_message(&self, room_id: &str, message_id: &str) -> Result<Message, ChatError>;

    /// Edit a message body; sender only. Timestamp and status are untouched.
    async fn edit(
        &self,
        room_id: &str,
        message_id: &str,
        new_content: &str,
    ) -> Result<(), ChatError>;

    /// Soft-delete a message; sender, room creator or staff. The room's
    /// lastMessage snapshot is not retroactively corrected.
    async fn delete(&self, room_id: &str, message_id: &str) -> Result<(), ChatError>;

    /// Advance `sent -> delivered`; a no-op at or past `delivered`
    async fn mark_delivered(&self, room_id: &str, message_id: &str) -> Result<(), ChatError>;

    /// Advance every other-authored unread message in the room to `read`
    /// and zero the caller's unread counter, in store-batch-sized chunks
    async fn mark_all_read(&self, room_id: &str) -> Result<(), ChatError>;

    /// Live message list in non-decreasing timestamp order. At most one
    /// subscription per room is active per engine; opening a new one ends
    /// the previous stream.
    async fn stream_messages(&self, room_id: &str) -> BoxStream<'static, Vec<Message>>;

    /// End the active message subscription for a room, if any
    fn cancel_messages(&self, room_id: &str);
}

/// Opaque attachment reference
#[derive(Debug, Clone)]
pub struct AttachmentDto {
    pub url: String,
    pub mime_type: String,
}

/// Send request
#[derive(Debug, Clone)]
pub struct SendMessageDto {
    pub content: String,
    pub attachment: Option<AttachmentDto>,
}

impl SendMessageDto {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), attachment: None }
    }
}

/// MessageService implementation
pub struct MessageServiceImpl<S: DocumentStore> {
    store: Arc<S>,
    identity: Arc<dyn Identity>,
    settings: Arc<Settings>,
    subscriptions: DashMap<String, AbortHandle>,
}

impl<S: DocumentStore> MessageServiceImpl<S> {
    pub fn new(store: Arc<S>, identity: Arc<dyn Identity>, settings: Arc<Settings>) -> Self {
        Self {
            store,
            identity,
            settings,
            subscriptions: DashMap::new(),
        }
    }

    fn validate_content(&self, content: &str, has_attachment: bool) -> Result<(), ChatError> {
        if content.trim().is_empty() && !has_attachment {
            return Err(ChatError::InvalidMessage(
                "a message needs a body or an attachment".into(),
            ));
        }
        let max = self.settings.message.max_content_length;
        if content.chars().count() > max {
            return Err(ChatError::InvalidMessage(format!(
                "content exceeds {} characters",
                max
            )));
        }
        Ok(())
    }

    async fn get_room(&self, room_id: &str) -> Result<ChatRoom, ChatError> {
        let doc = self
            .store
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        decode(room_id, &doc)
    }
}

#[async_trait]
impl<S: DocumentStore> MessageService for MessageServiceImpl<S> {
    async fn send(&self, room_id: &str, request: SendMessageDto) -> Result<String, ChatError> {
        self.validate_content(&request.content, request.attachment.is_some())?;

        let sender_id = self.identity.user_id().to_string();
        let sender_name = self.identity.display_name().to_string();
        let now = Utc::now();

        let mut tx = self.store.begin().await?;
        let room_doc = tx
            .get(ROOMS_COLLECTION, room_id)
            .await?
            .ok_or_else(|| ChatError::RoomNotFound(room_id.to_string()))?;
        let room: ChatRoom = decode(room_id, &room_doc)?;
        if !room.is_participant(&sender_id) {
            return Err(ChatError::NotAuthorized(
                "only participants can send messages".into(),
            ));
        }

        let message = Message {
            id: Uuid::new_v4().to_string(),
            sender_id: sender_id.clone(),
            sender_name: sender_name.clone(),
            sender_role: self.identity.role(),
            content: request.content,
            attachment_url: request.attachment.as_ref().map(|a| a.url.clone()),
            attachment_type: request.attachment.as_ref().map(|a| a.mime_type.clone()),
            status: MessageStatus::Sent,
            timestamp: now,
            delivered_at: None,
            read_at: None,
            is_edited: false,
            edited_at: None,
            is_deleted: false,
        };

        let preview = if message.content.is_empty() {
            "[attachment]".to_string()
        } else {
            message.content.clone()
        };

        let mut room_ops = vec![
            FieldOp::set("lastMessage", preview),
            FieldOp::set("lastMessageTime", timestamp_value(now)),
            FieldOp::set("lastMessageSenderId", sender_id.as_str()),
            FieldOp::set("lastMessageSenderName", sender_name.as_str()),
            FieldOp::server_timestamp("updatedAt"),
        ];
        // Every recipient's counter moves in the same commit as the
        // message itself, so unread totals never drift from the ledger.
        for participant_id in &room.participant_ids {
            if participant_id != &sender_id {
                room_ops.push(FieldOp::increment(
                    format!("unreadCounts.{}", participant_id),
                    1,
                ));
            }
        }

        tx.set(&messages_collection(room_id), &message.id, encode(&message)?);
        tx.update(ROOMS_COLLECTION, room_id, room_ops);
        tx.commit().await?;

        tracing::debug!(room_id, message_id = %message.id, "message sent");
        Ok(message.id)
    }

    async fn get_message(&self, room_id: &str, message_id: &str) -> Result<Message, ChatError> {
        let collection = messages_collection(room_id);
        let doc = self
            .store
            .get(&collection, message_id)
            .await?
            .ok_or_else(|| ChatError::MessageNotFound(message_id.to_string()))?;
        decode(message_id, &doc)
    }

    async fn edit(
        &self,
        room_id: &str,
        message_id: &str,
        new_content: &str,
    ) -> Result<(), ChatError> {
        self.validate_content(new_content, false)?;

        let message = self.get_message(room_id, message_id).await?;
        if message.is_deleted {
            return Err(ChatError::MessageNotFound(message_id.to_string()));
        }
        if message.sender_id != self.identity.user_id() {
            return Err(ChatError::NotAuthorized(
                "only the sender can edit a message".into(),
            ));
        }

        self.store
            .update(
                &messages_collection(room_id),
                message_id,
                vec![
                    FieldOp::set("content", new_content),
                    FieldOp::set("isEdited", true),
                    FieldOp::set("editedAt", timestamp_value(Utc::now())),
                ],
            )
            .await?;

        tracing::debug!(room_id, message_id, "message edited");
        Ok(())
    }

    async fn delete(&self, room_id: &str, message_id: &str) -> Result<(), ChatError> {
        let message = self.get_message(room_id, message_id).await?;
        if message.is_deleted {
            return Ok(());
        }

        let caller = self.identity.user_id();
        let room = self.get_room(room_id).await?;
        let allowed = message.sender_id == caller
            || room.created_by == caller
            || self.identity.role().is_staff();
        if !allowed {
            return Err(ChatError::NotAuthorized(
                "only the sender or a room admin can delete a message".into(),
            ));
        }

        // Soft delete: the document stays in place with the body redacted.
        self.store
            .update(
                &messages_collection(room_id),
                message_id,
                vec![
                    FieldOp::set("isDeleted", true),
                    FieldOp::set("content", ""),
                ],
            )
            .await?;

        tracing::debug!(room_id, message_id, "message deleted");
        Ok(())
    }

    async fn mark_delivered(&self, room_id: &str, message_id: &str) -> Result<(), ChatError> {
        let mut message = self.get_message(room_id, message_id).await?;
        let now = Utc::now();
        if !message.mark_delivered(now) {
            return Ok(());
        }

        self.store
            .update(
                &messages_collection(room_id),
                message_id,
                vec![
                    FieldOp::set("status", MessageStatus::Delivered.as_str()),
                    FieldOp::set("deliveredAt", timestamp_value(now)),
                ],
            )
            .await?;
        Ok(())
    }

    async fn mark_all_read(&self, room_id: &str) -> Result<(), ChatError> {
        let reader_id = self.identity.user_id().to_string();
        let room = self.get_room(room_id).await?;
        if !room.is_participant(&reader_id) {
            return Err(ChatError::NotAuthorized(
                "only participants can mark a room read".into(),
            ));
        }

        let collection = messages_collection(room_id);
        let rows = self
            .store
            .query(
                Query::collection(&collection)
                    .filter(Condition::ne("senderId", reader_id.as_str()))
                    .filter(Condition::ne("status", MessageStatus::Read.as_str())),
            )
            .await?;

        let now = Utc::now();
        let mut ops = Vec::with_capacity(rows.len() + 1);
        for (id, doc) in rows {
            let mut message: Message = match decode(&id, &doc) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(room_id, message_id = %id, error = %e, "skipping malformed message");
                    continue;
                }
            };
            if !message.mark_read(now) {
                continue;
            }
            ops.push(WriteOp::Update {
                collection: collection.clone(),
                id,
                ops: vec![
                    FieldOp::set("status", MessageStatus::Read.as_str()),
                    FieldOp::set(
                        "deliveredAt",
                        message.delivered_at.map(timestamp_value).unwrap_or(json!(null)),
                    ),
                    FieldOp::set("readAt", timestamp_value(now)),
                ],
            });
        }

        // The counter reset rides in the final chunk, after the status
        // flips it accounts for.
        if !ops.is_empty() || room.unread_for(&reader_id) > 0 {
            ops.push(WriteOp::Update {
                collection: ROOMS_COLLECTION.to_string(),
                id: room_id.to_string(),
                ops: vec![FieldOp::set(format!("unreadCounts.{}", reader_id), 0)],
            });
        }
        if ops.is_empty() {
            return Ok(());
        }

        let mut failed = Vec::new();
        for chunk in chunk_writes(ops, self.store.max_batch_size()) {
            let ids: Vec<String> = chunk.iter().map(|op| op.doc_id().to_string()).collect();
            if let Err(e) = self.store.batch_write(chunk).await {
                tracing::warn!(room_id, error = %e, "read-marking chunk failed");
                failed.extend(ids);
            }
        }
        if !failed.is_empty() {
            return Err(ChatError::BatchPartialFailure { failed });
        }

        tracing::debug!(room_id, reader_id = %reader_id, "room marked read");
        Ok(())
    }

    async fn stream_messages(&self, room_id: &str) -> BoxStream<'static, Vec<Message>> {
        let query = Query::collection(messages_collection(room_id)).order_by("timestamp", false);

        let stream = self.store.stream(query).await.map(|rows| {
            rows.into_iter()
                .filter_map(|(id, doc)| match decode::<Message>(&id, &doc) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        tracing::warn!(message_id = %id, error = %e, "skipping malformed message");
                        None
                    }
                })
                .collect()
        });

        // One live subscription per room: registering the new handle ends
        // any previous stream for the same room, so a screen switching back
        // and forth never processes deliveries twice.
        let (handle, registration) = AbortHandle::new_pair();
        if let Some(previous) = self.subscriptions.insert(room_id.to_string(), handle) {
            previous.abort();
        }
        Box::pin(Abortable::new(stream, registration))
    }

    fn cancel_messages(&self, room_id: &str) {
        if let Some((_, handle)) = self.subscriptions.remove(room_id) {
            handle.abort();
        }
    }
}
