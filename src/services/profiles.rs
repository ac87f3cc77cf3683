//! Profile service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::ProfileRepository;
use crate::models::{Profile, ProfileOverview, UpdateProfileInput};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct ProfileService {
    repo: Arc<dyn ProfileRepository>,
    hub: Arc<RealtimeHub>,
}

impl ProfileService {
    pub fn new(repo: Arc<dyn ProfileRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Profile>, ServiceError> {
        Ok(self.repo.get_by_id(id).await?)
    }

    /// Profile with post and follow counters
    pub async fn overview(&self, id: Uuid) -> Result<Option<ProfileOverview>, ServiceError> {
        Ok(self.repo.overview(id).await?)
    }

    /// Update the caller's own profile
    ///
    /// Unset fields are left as they are. A taken username is a `Conflict`.
    pub async fn update(
        &self,
        caller: Uuid,
        id: Uuid,
        input: UpdateProfileInput,
    ) -> Result<Profile, ServiceError> {
        if caller != id {
            return Err(ServiceError::Forbidden(
                "Profiles can only be edited by their owner".to_string(),
            ));
        }
        if input.is_empty() {
            return Err(ServiceError::Validation("Nothing to update".to_string()));
        }
        if input.username.as_deref().map(str::trim) == Some("") {
            return Err(ServiceError::Validation("Username cannot be empty".to_string()));
        }

        let profile = self
            .repo
            .update(id, &input)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Profile {}", id)))?;
        debug!("Updated profile {}", id);
        self.hub.publish(Collection::Profiles, ChangeKind::Update, &profile);

        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;

    #[tokio::test]
    async fn test_update_own_profile() {
        let platform = TestPlatform::new().await;
        let ivy = platform.user("ivy").await;

        let updated = platform
            .backend
            .profiles
            .update(ivy, ivy, UpdateProfileInput {
                bio: Some("gardener".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.bio.as_deref(), Some("gardener"));
        assert_eq!(updated.username.as_deref(), Some("ivy"));
    }

    #[tokio::test]
    async fn test_cannot_update_someone_else() {
        let platform = TestPlatform::new().await;
        let ivy = platform.user("ivy").await;
        let jay = platform.user("jay").await;

        let result = platform
            .backend
            .profiles
            .update(jay, ivy, UpdateProfileInput {
                bio: Some("pwned".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_taken_username_is_conflict() {
        let platform = TestPlatform::new().await;
        let ivy = platform.user("ivy").await;
        platform.user("jay").await;

        let result = platform
            .backend
            .profiles
            .update(ivy, ivy, UpdateProfileInput {
                username: Some("jay".to_string()),
                ..Default::default()
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_overview_counts() {
        let platform = TestPlatform::new().await;
        let ivy = platform.user("ivy").await;
        let jay = platform.user("jay").await;
        platform.post(ivy, "one").await;
        platform.post(ivy, "two").await;
        platform.backend.follows.follow(jay, ivy).await.unwrap();

        let overview = platform.backend.profiles.overview(ivy).await.unwrap().unwrap();
        assert_eq!(overview.posts_count, 2);
        assert_eq!(overview.followers_count, 1);
        assert_eq!(overview.following_count, 0);
    }
}
