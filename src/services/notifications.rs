//! Notification service
//!
//! Notifications are not stored; they are the likes and comments other
//! rows already record, read from the perspective of the post author.

use std::sync::Arc;
use uuid::Uuid;

use super::error::ServiceError;
use crate::db::repositories::{CommentRepository, LikeRepository};
use crate::models::Notification;

pub struct NotificationService {
    likes: Arc<dyn LikeRepository>,
    comments: Arc<dyn CommentRepository>,
}

impl NotificationService {
    pub fn new(likes: Arc<dyn LikeRepository>, comments: Arc<dyn CommentRepository>) -> Self {
        Self { likes, comments }
    }

    /// Likes and comments on posts of `owner`, merged newest first
    pub async fn list(&self, owner: Uuid) -> Result<Vec<Notification>, ServiceError> {
        let (likes, comments) = futures::try_join!(
            self.likes.list_on_posts_of(owner),
            self.comments.list_on_posts_of(owner)
        )?;

        let mut merged: Vec<Notification> = likes.into_iter().chain(comments).collect();
        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(merged)
    }
}
