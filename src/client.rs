//! Client entry point
//!
//! [`SpiralClient`] bundles the platform handle with the per-client session
//! context and toaster. Every view is opened through it: the route guard
//! runs first, then a sync unit scoped to the signed-in user is built and
//! mounted. Signing out unmounts every unit opened under the session.

use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use crate::config::{Config, FeedConfig};
use crate::models::FeedPost;
use crate::services::Backend;
use crate::session::{Route, SessionContext};
use crate::sync::{
    search_posts, CommentsSource, CommentsUnit, FeedSource, FeedUnit, FollowsSource, FollowsUnit,
    LikesSource, LikesUnit, MessagesSource, MessagesUnit, NotificationsSource, NotificationsUnit,
    ProfileSource, ProfileUnit, SyncSource, SyncUnit,
};
use crate::toast::{Toast, Toaster};

pub struct SpiralClient {
    backend: Arc<Backend>,
    session: Arc<SessionContext>,
    toaster: Arc<Toaster>,
    page_size: usize,
}

impl SpiralClient {
    pub fn new(backend: Arc<Backend>) -> Self {
        Self {
            session: Arc::new(SessionContext::new(backend.clone())),
            toaster: Arc::new(Toaster::new()),
            page_size: FeedConfig::default().page_size,
            backend,
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Boot the local platform described by `config` and attach a client
    pub async fn connect(config: &Config) -> Result<Self> {
        let backend = Backend::connect(config).await?;
        Ok(Self::new(backend).with_page_size(config.feed.page_size))
    }

    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn toaster(&self) -> &Arc<Toaster> {
        &self.toaster
    }

    /// Build and mount a unit for the signed-in user
    async fn open<S, F>(&self, build: F) -> Result<SyncUnit<S>, Route>
    where
        S: SyncSource,
        F: FnOnce(Arc<Backend>, Uuid) -> S,
    {
        let session = self.session.guard()?;
        let source = build(self.backend.clone(), session.user_id);
        let unit = SyncUnit::with_session(
            source,
            self.backend.clone(),
            self.toaster.clone(),
            self.session.clone(),
        );
        unit.mount().await;
        Ok(unit)
    }

    /// End the session; open units unmount themselves
    ///
    /// A failure is toasted and leaves the session in place.
    pub async fn sign_out(&self) -> bool {
        match self.session.sign_out().await {
            Ok(()) => true,
            Err(err) => {
                self.toaster
                    .push(Toast::destructive("Error signing out").with_description(err.to_string()));
                false
            }
        }
    }

    /// Everyone's posts
    pub async fn feed(&self) -> Result<FeedUnit, Route> {
        let page_size = self.page_size;
        self.open(|backend, me| FeedSource::new(backend, me, page_size))
            .await
    }

    /// Posts by one author
    pub async fn author_feed(&self, author: Uuid) -> Result<FeedUnit, Route> {
        let page_size = self.page_size;
        self.open(|backend, me| FeedSource::new(backend, me, page_size).by_author(author))
            .await
    }

    pub async fn likes(&self, post_id: Uuid) -> Result<LikesUnit, Route> {
        self.open(|backend, me| LikesSource::new(backend, post_id, me))
            .await
    }

    pub async fn comments(&self, post_id: Uuid) -> Result<CommentsUnit, Route> {
        self.open(|backend, me| CommentsSource::new(backend, post_id, me))
            .await
    }

    /// Conversation with `other`
    pub async fn messages(&self, other: Uuid) -> Result<MessagesUnit, Route> {
        self.open(|backend, me| MessagesSource::new(backend, me, other))
            .await
    }

    pub async fn notifications(&self) -> Result<NotificationsUnit, Route> {
        self.open(NotificationsSource::new).await
    }

    pub async fn follows(&self, profile_id: Uuid) -> Result<FollowsUnit, Route> {
        self.open(|backend, me| FollowsSource::new(backend, profile_id, me))
            .await
    }

    pub async fn profile(&self, profile_id: Uuid) -> Result<ProfileUnit, Route> {
        self.open(|backend, me| ProfileSource::new(backend, profile_id, me))
            .await
    }

    /// The signed-in user's own profile
    pub async fn my_profile(&self) -> Result<ProfileUnit, Route> {
        self.open(|backend, me| ProfileSource::new(backend, me, me))
            .await
    }

    pub async fn search(&self, query: &str) -> Result<Vec<FeedPost>, Route> {
        self.session.guard()?;
        Ok(search_posts(&self.backend, &self.toaster, query).await)
    }
}
