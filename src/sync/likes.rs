//! Like state of one post for the current user

use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{ignore_conflict, SyncSource, SyncUnit};
use crate::models::LikeState;
use crate::realtime::{ChangeFilter, Collection, Predicate};
use crate::services::{Backend, ServiceError};
use crate::toast::Toast;

pub type LikesUnit = SyncUnit<LikesSource>;

pub struct LikesSource {
    backend: Arc<Backend>,
    post_id: Uuid,
    viewer: Uuid,
}

impl LikesSource {
    pub fn new(backend: Arc<Backend>, post_id: Uuid, viewer: Uuid) -> Self {
        Self {
            backend,
            post_id,
            viewer,
        }
    }

    pub fn post_id(&self) -> Uuid {
        self.post_id
    }
}

#[async_trait]
impl SyncSource for LikesSource {
    type Snapshot = LikeState;

    fn label(&self) -> &'static str {
        "likes"
    }

    fn channel_name(&self) -> String {
        format!("likes:{}", self.post_id)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        vec![ChangeFilter::new(
            Collection::Likes,
            Predicate::eq_id("post_id", self.post_id),
        )]
    }

    async fn fetch(&self, _current: &LikeState) -> Result<LikeState, ServiceError> {
        self.backend.likes.state(self.post_id, self.viewer).await
    }

    fn load_failed(&self, _err: &ServiceError) -> Toast {
        Toast::destructive("Error").with_description("Failed to update like")
    }
}

impl SyncUnit<LikesSource> {
    /// Like or unlike depending on the current state
    ///
    /// The count is never adjusted locally; it is reloaded after the write.
    /// Returns false if the write failed.
    pub async fn toggle(&self) -> bool {
        let source = self.source();
        let Some(viewer) = self.caller(source.viewer) else {
            return false;
        };
        let likes = &self.backend().likes;

        let result = if self.snapshot().liked {
            likes.unlike(viewer, source.post_id).await.map(|_| ())
        } else {
            ignore_conflict(likes.like(viewer, source.post_id).await).map(|_| ())
        };

        if let Err(err) = result {
            debug!("Like toggle on {} failed: {}", source.post_id, err);
            self.toaster()
                .push(Toast::destructive("Error").with_description("Failed to update like"));
            return false;
        }

        self.load().await;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;
    use crate::sync::test_support::within;
    use crate::toast::Toaster;

    fn likes(platform: &TestPlatform, post_id: Uuid, viewer: Uuid) -> LikesUnit {
        SyncUnit::new(
            LikesSource::new(platform.backend.clone(), post_id, viewer),
            platform.backend.clone(),
            Arc::new(Toaster::new()),
        )
    }

    #[tokio::test]
    async fn test_toggle() {
        let platform = TestPlatform::new().await;
        let viewer = platform.user("ivy").await;
        let post = platform.post(viewer, "like me").await;
        let unit = likes(&platform, post, viewer);
        unit.mount().await;
        assert_eq!(unit.snapshot(), LikeState { count: 0, liked: false });

        assert!(unit.toggle().await);
        assert_eq!(unit.snapshot(), LikeState { count: 1, liked: true });

        assert!(unit.toggle().await);
        assert_eq!(unit.snapshot(), LikeState { count: 0, liked: false });
    }

    #[tokio::test]
    async fn test_duplicate_like_is_swallowed() {
        let platform = TestPlatform::new().await;
        let viewer = platform.user("ivy").await;
        let post = platform.post(viewer, "like me").await;
        let unit = likes(&platform, post, viewer);
        unit.load().await;

        // Another tab liked first; this unit still believes it has not
        platform.backend.likes.like(viewer, post).await.unwrap();
        assert!(unit.toggle().await);

        assert_eq!(unit.snapshot(), LikeState { count: 1, liked: true });
        assert!(unit.toaster().active().is_empty());
    }

    #[tokio::test]
    async fn test_other_users_likes_arrive() {
        let platform = TestPlatform::new().await;
        let viewer = platform.user("ivy").await;
        let fan = platform.user("fan").await;
        let post = platform.post(viewer, "like me").await;
        let unit = likes(&platform, post, viewer);
        unit.mount().await;

        platform.backend.likes.like(fan, post).await.unwrap();
        let state = within(unit.wait_for(|s| s.count == 1)).await;
        assert!(!state.liked);
    }

    #[tokio::test]
    async fn test_like_on_missing_post_toasts() {
        let platform = TestPlatform::new().await;
        let viewer = platform.user("ivy").await;
        let unit = likes(&platform, Uuid::new_v4(), viewer);

        assert!(!unit.toggle().await);
        let toast = &unit.toaster().active()[0];
        assert_eq!(toast.title, "Error");
        assert_eq!(toast.description.as_deref(), Some("Failed to update like"));
    }
}
