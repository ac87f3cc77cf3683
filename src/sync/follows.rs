//! Follower counts of a profile and the viewer's follow relationship

use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

use super::{ignore_conflict, SyncSource, SyncUnit};
use crate::models::FollowStats;
use crate::realtime::{ChangeFilter, Collection, Predicate};
use crate::services::{Backend, ServiceError};

pub type FollowsUnit = SyncUnit<FollowsSource>;

pub struct FollowsSource {
    backend: Arc<Backend>,
    profile_id: Uuid,
    viewer: Uuid,
}

impl FollowsSource {
    pub fn new(backend: Arc<Backend>, profile_id: Uuid, viewer: Uuid) -> Self {
        Self {
            backend,
            profile_id,
            viewer,
        }
    }

    pub fn is_own_profile(&self) -> bool {
        self.profile_id == self.viewer
    }
}

#[async_trait]
impl SyncSource for FollowsSource {
    type Snapshot = FollowStats;

    fn label(&self) -> &'static str {
        "follows"
    }

    fn channel_name(&self) -> String {
        format!("follows:{}", self.profile_id)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        let touches_profile = Predicate::eq_id("follower_id", self.profile_id)
            .or(Predicate::eq_id("following_id", self.profile_id));
        vec![ChangeFilter::new(Collection::Follows, touches_profile)]
    }

    async fn fetch(&self, _current: &FollowStats) -> Result<FollowStats, ServiceError> {
        self.backend.follows.stats(self.profile_id, self.viewer).await
    }
}

impl SyncUnit<FollowsSource> {
    /// Follow the profile; already following is not an error
    pub async fn follow(&self) -> bool {
        let source = self.source();
        if source.is_own_profile() {
            return false;
        }
        let Some(follower) = self.caller(source.viewer) else {
            return false;
        };

        let result = self.backend().follows.follow(follower, source.profile_id).await;
        if let Err(err) = ignore_conflict(result) {
            self.report("Error following user", &err);
            return false;
        }

        self.load().await;
        true
    }

    pub async fn unfollow(&self) -> bool {
        let source = self.source();
        let Some(follower) = self.caller(source.viewer) else {
            return false;
        };
        let result = self.backend().follows.unfollow(follower, source.profile_id).await;
        if let Err(err) = result {
            self.report("Error unfollowing user", &err);
            return false;
        }

        self.load().await;
        true
    }
}
