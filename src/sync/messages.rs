//! Direct message conversation between the viewer and one other user

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use super::{remove_by_key, upsert_sorted, Keyed, Patch, SyncSource, SyncUnit};
use crate::models::{Message, MessageWithSender};
use crate::realtime::{ChangeEvent, ChangeFilter, ChangeKind, Collection, Predicate};
use crate::services::{Backend, ServiceError};

pub type MessagesUnit = SyncUnit<MessagesSource>;

impl Keyed for MessageWithSender {
    fn key(&self) -> Uuid {
        self.message.id
    }
}

fn oldest_first(a: &MessageWithSender, b: &MessageWithSender) -> Ordering {
    a.message
        .created_at
        .cmp(&b.message.created_at)
        .then_with(|| a.message.id.cmp(&b.message.id))
}

pub struct MessagesSource {
    backend: Arc<Backend>,
    viewer: Uuid,
    other: Uuid,
}

impl MessagesSource {
    pub fn new(backend: Arc<Backend>, viewer: Uuid, other: Uuid) -> Self {
        Self {
            backend,
            viewer,
            other,
        }
    }

    pub fn other(&self) -> Uuid {
        self.other
    }
}

#[async_trait]
impl SyncSource for MessagesSource {
    type Snapshot = Vec<MessageWithSender>;

    fn label(&self) -> &'static str {
        "messages"
    }

    fn channel_name(&self) -> String {
        format!("messages:{}:{}", self.viewer, self.other)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        let outgoing = Predicate::eq_id("sender_id", self.viewer)
            .and(Predicate::eq_id("receiver_id", self.other));
        let incoming = Predicate::eq_id("sender_id", self.other)
            .and(Predicate::eq_id("receiver_id", self.viewer));
        vec![ChangeFilter::new(Collection::Messages, outgoing.or(incoming))]
    }

    async fn fetch(
        &self,
        _current: &Vec<MessageWithSender>,
    ) -> Result<Vec<MessageWithSender>, ServiceError> {
        self.backend.messages.conversation(self.viewer, self.other).await
    }

    async fn patch(
        &self,
        snapshot: &Vec<MessageWithSender>,
        event: &ChangeEvent,
    ) -> Result<Patch<Vec<MessageWithSender>>, ServiceError> {
        let Some(id) = event.record_id() else {
            return Ok(Patch::Reload);
        };

        let mut next = snapshot.clone();
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                match self.backend.messages.get(self.viewer, id).await? {
                    Some(message) => upsert_sorted(&mut next, message, oldest_first),
                    None => return Ok(Patch::Unchanged),
                }
            }
            ChangeKind::Delete => {
                if !remove_by_key(&mut next, id) {
                    return Ok(Patch::Unchanged);
                }
            }
        }
        Ok(Patch::Replace(next))
    }
}

impl SyncUnit<MessagesSource> {
    /// Send `text` to the other participant; blank text makes no remote call
    pub async fn send(&self, text: &str) -> Option<Message> {
        let content = text.trim();
        if content.is_empty() {
            return None;
        }

        let source = self.source();
        let sender = self.caller(source.viewer)?;
        match self
            .backend()
            .messages
            .send(sender, source.other, content)
            .await
        {
            Ok(message) => Some(message),
            Err(err) => {
                self.report("Error sending message", &err);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;
    use crate::sync::test_support::within;
    use crate::toast::Toaster;

    fn conversation(platform: &TestPlatform, viewer: Uuid, other: Uuid) -> MessagesUnit {
        SyncUnit::new(
            MessagesSource::new(platform.backend.clone(), viewer, other),
            platform.backend.clone(),
            Arc::new(Toaster::new()),
        )
    }

    #[tokio::test]
    async fn test_both_sides_see_the_conversation() {
        let platform = TestPlatform::new().await;
        let ann = platform.user("ann").await;
        let ben = platform.user("ben").await;
        let ann_view = conversation(&platform, ann, ben);
        let ben_view = conversation(&platform, ben, ann);
        ann_view.mount().await;
        ben_view.mount().await;

        ann_view.send("hi ben").await.unwrap();
        ben_view.send("hi ann").await.unwrap();

        let seen = within(ben_view.wait_for(|s| s.len() == 2)).await;
        assert_eq!(seen[0].message.content, "hi ben");
        assert!(!seen[0].is_outgoing(ben));
        assert!(seen[1].is_outgoing(ben));
        within(ann_view.wait_for(|s| s.len() == 2)).await;
    }

    #[tokio::test]
    async fn test_other_conversations_are_filtered_out() {
        let platform = TestPlatform::new().await;
        let ann = platform.user("ann").await;
        let ben = platform.user("ben").await;
        let cat = platform.user("cat").await;
        let unit = conversation(&platform, ann, ben);
        unit.mount().await;

        platform.backend.messages.send(cat, ann, "psst").await.unwrap();
        platform.backend.messages.send(ben, ann, "hello").await.unwrap();

        let seen = within(unit.wait_for(|s| !s.is_empty())).await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].message.content, "hello");
    }

    #[tokio::test]
    async fn test_blank_message_is_noop() {
        let platform = TestPlatform::new().await;
        let ann = platform.user("ann").await;
        let ben = platform.user("ben").await;
        let unit = conversation(&platform, ann, ben);

        assert!(unit.send("   ").await.is_none());
        assert_eq!(platform.backend.realtime.last_seq(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_toasts() {
        let platform = TestPlatform::new().await;
        let ann = platform.user("ann").await;
        let unit = conversation(&platform, ann, Uuid::new_v4());

        assert!(unit.send("anyone?").await.is_none());
        let toast = &unit.toaster().active()[0];
        assert_eq!(toast.title, "Error sending message");
        assert!(toast.description.is_some());
    }
}
