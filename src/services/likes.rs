//! Like service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::LikeRepository;
use crate::models::{Like, LikeState};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct LikeService {
    repo: Arc<dyn LikeRepository>,
    hub: Arc<RealtimeHub>,
}

impl LikeService {
    pub fn new(repo: Arc<dyn LikeRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    /// Like a post as `caller`
    ///
    /// A second like of the same post fails with `Conflict`.
    pub async fn like(&self, caller: Uuid, post_id: Uuid) -> Result<Like, ServiceError> {
        let like = self.repo.create(post_id, caller).await?;
        debug!("User {} liked post {}", caller, post_id);
        self.hub.publish(Collection::Likes, ChangeKind::Insert, &like);
        Ok(like)
    }

    /// Remove the like of `caller`; `None` when there was none
    pub async fn unlike(&self, caller: Uuid, post_id: Uuid) -> Result<Option<Like>, ServiceError> {
        let removed = self.repo.delete_by_pair(post_id, caller).await?;
        if let Some(like) = &removed {
            debug!("User {} unliked post {}", caller, post_id);
            self.hub.publish(Collection::Likes, ChangeKind::Delete, like);
        }
        Ok(removed)
    }

    /// Like count of a post and whether `viewer` is among the likers
    pub async fn state(&self, post_id: Uuid, viewer: Uuid) -> Result<LikeState, ServiceError> {
        let (count, own) = futures::try_join!(
            self.repo.count_for_post(post_id),
            self.repo.find(post_id, viewer)
        )?;

        Ok(LikeState {
            count,
            liked: own.is_some(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;

    #[tokio::test]
    async fn test_like_state_follows_likes() {
        let platform = TestPlatform::new().await;
        let owner = platform.user("owner").await;
        let fan = platform.user("fan").await;
        let post_id = platform.post(owner, "like me").await;
        let likes = &platform.backend.likes;

        assert_eq!(likes.state(post_id, fan).await.unwrap(), LikeState::default());

        likes.like(fan, post_id).await.unwrap();
        assert_eq!(
            likes.state(post_id, fan).await.unwrap(),
            LikeState { count: 1, liked: true }
        );
        assert_eq!(
            likes.state(post_id, owner).await.unwrap(),
            LikeState { count: 1, liked: false }
        );

        assert!(likes.unlike(fan, post_id).await.unwrap().is_some());
        assert!(likes.unlike(fan, post_id).await.unwrap().is_none());
        assert_eq!(likes.state(post_id, fan).await.unwrap().count, 0);
    }

    #[tokio::test]
    async fn test_duplicate_like_is_conflict() {
        let platform = TestPlatform::new().await;
        let owner = platform.user("owner").await;
        let post_id = platform.post(owner, "once").await;

        platform.backend.likes.like(owner, post_id).await.unwrap();
        let err = platform.backend.likes.like(owner, post_id).await.unwrap_err();
        assert!(err.is_conflict());
        assert_eq!(err.code(), "23505");
    }

    #[tokio::test]
    async fn test_like_missing_post_is_not_found() {
        let platform = TestPlatform::new().await;
        let fan = platform.user("fan").await;

        let err = platform.backend.likes.like(fan, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
