//! Direct message service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::MessageRepository;
use crate::models::{Message, MessageWithSender};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct MessageService {
    repo: Arc<dyn MessageRepository>,
    hub: Arc<RealtimeHub>,
}

impl MessageService {
    pub fn new(repo: Arc<dyn MessageRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    /// Send `content` from `caller` to `receiver_id`
    pub async fn send(
        &self,
        caller: Uuid,
        receiver_id: Uuid,
        content: &str,
    ) -> Result<Message, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("Message cannot be empty".to_string()));
        }

        let message = self.repo.create(caller, receiver_id, content).await?;
        debug!("Message {} from {} to {}", message.id, caller, receiver_id);
        self.hub.publish(Collection::Messages, ChangeKind::Insert, &message);

        Ok(message)
    }

    /// A single message, visible only to its two participants
    pub async fn get(
        &self,
        caller: Uuid,
        id: Uuid,
    ) -> Result<Option<MessageWithSender>, ServiceError> {
        let message = self.repo.get_with_sender(id).await?;
        Ok(message.filter(|m| m.message.sender_id == caller || m.message.receiver_id == caller))
    }

    /// The conversation between `caller` and `other`, oldest first
    pub async fn conversation(
        &self,
        caller: Uuid,
        other: Uuid,
    ) -> Result<Vec<MessageWithSender>, ServiceError> {
        Ok(self.repo.list_conversation(caller, other).await?)
    }
}
