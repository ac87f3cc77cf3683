//! Post service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::PostRepository;
use crate::models::{CreatePostInput, FeedCursor, FeedPost, Post};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct PostService {
    repo: Arc<dyn PostRepository>,
    hub: Arc<RealtimeHub>,
}

impl PostService {
    pub fn new(repo: Arc<dyn PostRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    /// Publish a post authored by `caller`
    pub async fn create(&self, caller: Uuid, input: CreatePostInput) -> Result<Post, ServiceError> {
        if input.content.trim().is_empty() && input.image_ref.is_none() {
            return Err(ServiceError::Validation(
                "Post needs content or an image".to_string(),
            ));
        }

        let post = self.repo.create(caller, &input).await?;
        debug!("Created post {}", post.id);
        self.hub.publish(Collection::Posts, ChangeKind::Insert, &post);

        Ok(post)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<FeedPost>, ServiceError> {
        Ok(self.repo.get_feed_post(id).await?)
    }

    /// One feed page, newest first
    pub async fn feed(
        &self,
        author_id: Option<Uuid>,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<FeedPost>, ServiceError> {
        Ok(self.repo.list_feed(author_id, before, limit).await?)
    }

    /// Case-insensitive substring search over post content
    pub async fn search(&self, query: &str) -> Result<Vec<FeedPost>, ServiceError> {
        Ok(self.repo.search(query).await?)
    }

    /// Replace the content of a post owned by `caller`
    pub async fn update(&self, caller: Uuid, id: Uuid, content: &str) -> Result<Post, ServiceError> {
        if content.trim().is_empty() {
            return Err(ServiceError::Validation("Content cannot be empty".to_string()));
        }
        self.owned(caller, id).await?;

        let post = self
            .repo
            .update_content(id, content)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post {}", id)))?;
        self.hub.publish(Collection::Posts, ChangeKind::Update, &post);

        Ok(post)
    }

    /// Delete a post owned by `caller`
    pub async fn delete(&self, caller: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        self.owned(caller, id).await?;

        let post = self
            .repo
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post {}", id)))?;
        debug!("Deleted post {}", post.id);
        self.hub.publish(Collection::Posts, ChangeKind::Delete, &post);

        Ok(post)
    }

    async fn owned(&self, caller: Uuid, id: Uuid) -> Result<Post, ServiceError> {
        let post = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Post {}", id)))?;

        if post.author_id != caller {
            return Err(ServiceError::Forbidden(
                "Only the author can change this post".to_string(),
            ));
        }
        Ok(post)
    }
}
