//! Comment repository
//!
//! Database operations for comments. Listings are joined with the author's
//! profile so that a view can render them without a second round-trip.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use super::like::row_to_notification;
use crate::db::get_uuid;
use crate::models::{
    Comment, CommentWithAuthor, CreateCommentInput, Notification, NotificationKind,
    ProfileSummary,
};

/// Comment repository trait
#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Create a new comment
    async fn create(&self, user_id: Uuid, input: &CreateCommentInput) -> Result<Comment>;

    /// Get comment by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Get comment joined with its author
    async fn get_with_author(&self, id: Uuid) -> Result<Option<CommentWithAuthor>>;

    /// Comments of a post, newest first
    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentWithAuthor>>;

    /// Delete a comment, returning the removed row
    async fn delete(&self, id: Uuid) -> Result<Option<Comment>>;

    /// Comments on posts authored by `owner_id`, newest first
    async fn list_on_posts_of(&self, owner_id: Uuid) -> Result<Vec<Notification>>;
}

/// SQLx-based comment repository
pub struct SqlxCommentRepository {
    pool: SqlitePool,
}

impl SqlxCommentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn CommentRepository> {
        Arc::new(Self::new(pool))
    }
}

const WITH_AUTHOR_SELECT: &str = r#"
    SELECT c.id, c.post_id, c.user_id, c.content, c.created_at,
           pr.username AS author_username, pr.avatar_ref AS author_avatar_ref
    FROM comments c
    LEFT JOIN profiles pr ON pr.id = c.user_id
"#;

#[async_trait]
impl CommentRepository for SqlxCommentRepository {
    async fn create(&self, user_id: Uuid, input: &CreateCommentInput) -> Result<Comment> {
        let comment = Comment {
            id: Uuid::new_v4(),
            post_id: input.post_id,
            user_id,
            content: input.content.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO comments (id, post_id, user_id, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(comment.id.to_string())
        .bind(comment.post_id.to_string())
        .bind(comment.user_id.to_string())
        .bind(&comment.content)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create comment")?;

        Ok(comment)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Comment>> {
        let row = sqlx::query(
            "SELECT id, post_id, user_id, content, created_at FROM comments WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get comment by ID")?;

        row.as_ref().map(row_to_comment).transpose()
    }

    async fn get_with_author(&self, id: Uuid) -> Result<Option<CommentWithAuthor>> {
        let sql = format!("{} WHERE c.id = ?", WITH_AUTHOR_SELECT);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get comment with author")?;

        row.as_ref().map(row_to_comment_with_author).transpose()
    }

    async fn list_for_post(&self, post_id: Uuid) -> Result<Vec<CommentWithAuthor>> {
        let sql = format!(
            "{} WHERE c.post_id = ? ORDER BY c.created_at DESC, c.id DESC",
            WITH_AUTHOR_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(post_id.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list comments for post")?;

        rows.iter().map(row_to_comment_with_author).collect()
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Comment>> {
        let Some(comment) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete comment")?;

        Ok(Some(comment))
    }

    async fn list_on_posts_of(&self, owner_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.created_at, c.post_id, p.content AS post_content,
                   pr.username AS actor_username
            FROM comments c
            JOIN posts p ON p.id = c.post_id
            LEFT JOIN profiles pr ON pr.id = c.user_id
            WHERE p.author_id = ?
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list comments on posts")?;

        rows.iter()
            .map(|row| row_to_notification(row, NotificationKind::Comment))
            .collect()
    }
}

fn row_to_comment(row: &SqliteRow) -> Result<Comment> {
    Ok(Comment {
        id: get_uuid(row, "id")?,
        post_id: get_uuid(row, "post_id")?,
        user_id: get_uuid(row, "user_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_comment_with_author(row: &SqliteRow) -> Result<CommentWithAuthor> {
    let comment = row_to_comment(row)?;
    let author = ProfileSummary {
        id: comment.user_id,
        username: row.try_get("author_username")?,
        avatar_ref: row.try_get("author_avatar_ref")?,
    };
    Ok(CommentWithAuthor { comment, author })
}
