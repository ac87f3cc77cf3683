//! Likes and comments on the viewer's posts

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::{Patch, SyncSource, SyncUnit};
use crate::models::Notification;
use crate::realtime::{ChangeEvent, ChangeFilter, Collection, Predicate};
use crate::services::{Backend, ServiceError};

pub type NotificationsUnit = SyncUnit<NotificationsSource>;

pub struct NotificationsSource {
    backend: Arc<Backend>,
    owner: Uuid,
}

impl NotificationsSource {
    pub fn new(backend: Arc<Backend>, owner: Uuid) -> Self {
        Self { backend, owner }
    }

    /// Whether a like or comment on `post_id` concerns the owner
    async fn concerns_owner(
        &self,
        snapshot: &[Notification],
        post_id: Uuid,
    ) -> Result<bool, ServiceError> {
        if snapshot.iter().any(|n| n.post_id == post_id) {
            return Ok(true);
        }
        let post = self.backend.posts.get(post_id).await?;
        Ok(post.map(|p| p.post.author_id == self.owner).unwrap_or(false))
    }
}

#[async_trait]
impl SyncSource for NotificationsSource {
    type Snapshot = Vec<Notification>;

    fn label(&self) -> &'static str {
        "notifications"
    }

    fn channel_name(&self) -> String {
        format!("notifications:{}", self.owner)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        vec![
            ChangeFilter::new(Collection::Posts, Predicate::eq_id("author_id", self.owner)),
            ChangeFilter::all(Collection::Likes),
            ChangeFilter::all(Collection::Comments),
        ]
    }

    async fn fetch(&self, _current: &Vec<Notification>) -> Result<Vec<Notification>, ServiceError> {
        self.backend.notifications.list(self.owner).await
    }

    async fn patch(
        &self,
        snapshot: &Vec<Notification>,
        event: &ChangeEvent,
    ) -> Result<Patch<Vec<Notification>>, ServiceError> {
        if event.collection == Collection::Posts {
            return Ok(Patch::Reload);
        }

        let Some(post_id) = event.field_uuid("post_id") else {
            return Ok(Patch::Reload);
        };
        if self.concerns_owner(snapshot, post_id).await? {
            Ok(Patch::Reload)
        } else {
            Ok(Patch::Unchanged)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateCommentInput, NotificationKind};
    use crate::services::testing::TestPlatform;
    use crate::sync::test_support::within;
    use crate::toast::Toaster;

    fn notifications(platform: &TestPlatform, owner: Uuid) -> NotificationsUnit {
        SyncUnit::new(
            NotificationsSource::new(platform.backend.clone(), owner),
            platform.backend.clone(),
            Arc::new(Toaster::new()),
        )
    }

    #[tokio::test]
    async fn test_activity_on_own_posts_arrives() {
        let platform = TestPlatform::new().await;
        let owner = platform.user("olga").await;
        let fan = platform.user("fan").await;
        let mine = platform.post(owner, &"a".repeat(60)).await;
        let theirs = platform.post(fan, "not olga's").await;
        let unit = notifications(&platform, owner);
        unit.mount().await;
        assert!(unit.snapshot().is_empty());

        platform.backend.likes.like(fan, theirs).await.unwrap();
        platform.backend.likes.like(fan, mine).await.unwrap();
        platform
            .backend
            .comments
            .create(fan, CreateCommentInput {
                post_id: mine,
                content: "great".to_string(),
            })
            .await
            .unwrap();

        let seen = within(unit.wait_for(|s| s.len() == 2)).await;
        assert_eq!(seen[0].kind, NotificationKind::Comment);
        assert_eq!(seen[1].kind, NotificationKind::Like);
        assert_eq!(
            seen[1].describe(),
            format!("fan liked your post: \"{}...\"", "a".repeat(50))
        );
    }

    #[tokio::test]
    async fn test_deleting_own_post_clears_notifications() {
        let platform = TestPlatform::new().await;
        let owner = platform.user("olga").await;
        let fan = platform.user("fan").await;
        let mine = platform.post(owner, "short").await;
        platform.backend.likes.like(fan, mine).await.unwrap();

        let unit = notifications(&platform, owner);
        unit.mount().await;
        assert_eq!(unit.snapshot().len(), 1);

        platform.backend.posts.delete(owner, mine).await.unwrap();
        within(unit.wait_for(|s| s.is_empty())).await;
    }

    #[tokio::test]
    async fn test_unlike_removes_notification() {
        let platform = TestPlatform::new().await;
        let owner = platform.user("olga").await;
        let fan = platform.user("fan").await;
        let mine = platform.post(owner, "short").await;
        platform.backend.likes.like(fan, mine).await.unwrap();

        let unit = notifications(&platform, owner);
        unit.mount().await;
        platform.backend.likes.unlike(fan, mine).await.unwrap();
        within(unit.wait_for(|s| s.is_empty())).await;
    }
}
