//! Follow service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::FollowRepository;
use crate::models::{Follow, FollowStats};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct FollowService {
    repo: Arc<dyn FollowRepository>,
    hub: Arc<RealtimeHub>,
}

impl FollowService {
    pub fn new(repo: Arc<dyn FollowRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    /// Make `caller` follow `target`
    ///
    /// Following yourself is rejected; following twice is a `Conflict`.
    pub async fn follow(&self, caller: Uuid, target: Uuid) -> Result<Follow, ServiceError> {
        if caller == target {
            return Err(ServiceError::Validation("Cannot follow yourself".to_string()));
        }

        let follow = self.repo.create(caller, target).await?;
        debug!("{} now follows {}", caller, target);
        self.hub.publish(Collection::Follows, ChangeKind::Insert, &follow);

        Ok(follow)
    }

    pub async fn unfollow(&self, caller: Uuid, target: Uuid) -> Result<Option<Follow>, ServiceError> {
        let removed = self.repo.delete_by_pair(caller, target).await?;
        if let Some(follow) = &removed {
            debug!("{} unfollowed {}", caller, target);
            self.hub.publish(Collection::Follows, ChangeKind::Delete, follow);
        }
        Ok(removed)
    }

    pub async fn stats(&self, profile_id: Uuid, viewer: Uuid) -> Result<FollowStats, ServiceError> {
        Ok(self.repo.stats(profile_id, viewer).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;

    #[tokio::test]
    async fn test_unfollow_follow_unfollow_returns_to_baseline() {
        let platform = TestPlatform::new().await;
        let fan = platform.user("fan").await;
        let star = platform.user("star").await;
        let follows = &platform.backend.follows;
        let baseline = follows.stats(star, fan).await.unwrap();

        assert!(follows.unfollow(fan, star).await.unwrap().is_none());
        follows.follow(fan, star).await.unwrap();
        assert_eq!(follows.stats(star, fan).await.unwrap().followers, baseline.followers + 1);
        assert!(follows.unfollow(fan, star).await.unwrap().is_some());

        let after = follows.stats(star, fan).await.unwrap();
        assert_eq!(after, baseline);
        assert!(!after.is_following);
    }

    #[tokio::test]
    async fn test_self_follow_rejected() {
        let platform = TestPlatform::new().await;
        let me = platform.user("me").await;
        let result = platform.backend.follows.follow(me, me).await;
        assert!(matches!(result, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicate_follow_is_conflict() {
        let platform = TestPlatform::new().await;
        let fan = platform.user("fan").await;
        let star = platform.user("star").await;

        platform.backend.follows.follow(fan, star).await.unwrap();
        let err = platform.backend.follows.follow(fan, star).await.unwrap_err();
        assert!(err.is_conflict());
    }
}
