//! Comment service

use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::CommentRepository;
use crate::models::{Comment, CommentWithAuthor, CreateCommentInput};
use crate::realtime::{ChangeKind, Collection, RealtimeHub};

pub struct CommentService {
    repo: Arc<dyn CommentRepository>,
    hub: Arc<RealtimeHub>,
}

impl CommentService {
    pub fn new(repo: Arc<dyn CommentRepository>, hub: Arc<RealtimeHub>) -> Self {
        Self { repo, hub }
    }

    /// Comment on a post as `caller`
    pub async fn create(
        &self,
        caller: Uuid,
        input: CreateCommentInput,
    ) -> Result<Comment, ServiceError> {
        if input.content.trim().is_empty() {
            return Err(ServiceError::Validation("Comment cannot be empty".to_string()));
        }

        let comment = self.repo.create(caller, &input).await?;
        debug!("Created comment {} on post {}", comment.id, comment.post_id);
        self.hub.publish(Collection::Comments, ChangeKind::Insert, &comment);

        Ok(comment)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<CommentWithAuthor>, ServiceError> {
        Ok(self.repo.get_with_author(id).await?)
    }

    /// Comments of a post, newest first
    pub async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentWithAuthor>, ServiceError> {
        Ok(self.repo.list_for_post(post_id).await?)
    }

    /// Delete a comment written by `caller`
    pub async fn delete(&self, caller: Uuid, id: Uuid) -> Result<Comment, ServiceError> {
        let comment = self
            .repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Comment {}", id)))?;

        if comment.user_id != caller {
            return Err(ServiceError::Forbidden(
                "Only the author can delete this comment".to_string(),
            ));
        }

        let removed = self
            .repo
            .delete(id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Comment {}", id)))?;
        self.hub.publish(Collection::Comments, ChangeKind::Delete, &removed);

        Ok(removed)
    }
}
