//! Post repository
//!
//! Besides plain CRUD this repository serves the joined feed listing
//! (author profile plus like/comment counters), keyset pagination and the
//! content search.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{CreatePostInput, FeedCursor, FeedPost, Post, ProfileSummary};

/// Columns of a joined feed row
const FEED_SELECT: &str = r#"
    SELECT p.id, p.author_id, p.content, p.image_ref, p.created_at,
           pr.username AS author_username, pr.avatar_ref AS author_avatar_ref,
           (SELECT COUNT(*) FROM likes l WHERE l.post_id = p.id) AS like_count,
           (SELECT COUNT(*) FROM comments c WHERE c.post_id = p.id) AS comment_count
    FROM posts p
    JOIN profiles pr ON pr.id = p.author_id
"#;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Create a new post
    async fn create(&self, author_id: Uuid, input: &CreatePostInput) -> Result<Post>;

    /// Get a post by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>>;

    /// Get a joined feed row by post ID
    async fn get_feed_post(&self, id: Uuid) -> Result<Option<FeedPost>>;

    /// Newest-first feed page, optionally restricted to one author and
    /// starting strictly after `before`
    async fn list_feed(
        &self,
        author_id: Option<Uuid>,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<FeedPost>>;

    /// Posts whose content contains `query`, case-insensitively, newest first
    async fn search(&self, query: &str) -> Result<Vec<FeedPost>>;

    /// Replace the content of a post
    async fn update_content(&self, id: Uuid, content: &str) -> Result<Option<Post>>;

    /// Delete a post, returning the removed row
    async fn delete(&self, id: Uuid) -> Result<Option<Post>>;
}

/// SQLx-based post repository
pub struct SqlxPostRepository {
    pool: SqlitePool,
}

impl SqlxPostRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn create(&self, author_id: Uuid, input: &CreatePostInput) -> Result<Post> {
        let post = Post {
            id: Uuid::new_v4(),
            author_id,
            content: input.content.clone(),
            image_ref: input.image_ref.clone(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO posts (id, author_id, content, content_folded, image_ref, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(post.id.to_string())
        .bind(post.author_id.to_string())
        .bind(&post.content)
        .bind(post.content.to_lowercase())
        .bind(&post.image_ref)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create post")?;

        Ok(post)
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Post>> {
        let row = sqlx::query(
            "SELECT id, author_id, content, image_ref, created_at FROM posts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get post by ID")?;

        row.as_ref().map(row_to_post).transpose()
    }

    async fn get_feed_post(&self, id: Uuid) -> Result<Option<FeedPost>> {
        let sql = format!("{} WHERE p.id = ?", FEED_SELECT);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get feed post")?;

        row.as_ref().map(row_to_feed_post).transpose()
    }

    async fn list_feed(
        &self,
        author_id: Option<Uuid>,
        before: Option<FeedCursor>,
        limit: usize,
    ) -> Result<Vec<FeedPost>> {
        let sql = format!(
            r#"{}
            WHERE (?1 IS NULL OR p.author_id = ?1)
              AND (?2 IS NULL OR p.created_at < ?2 OR (p.created_at = ?2 AND p.id < ?3))
            ORDER BY p.created_at DESC, p.id DESC
            LIMIT ?4
            "#,
            FEED_SELECT
        );

        let rows = sqlx::query(&sql)
            .bind(author_id.map(|id| id.to_string()))
            .bind(before.map(|c| c.created_at))
            .bind(before.map(|c| c.id.to_string()))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list feed")?;

        rows.iter().map(row_to_feed_post).collect()
    }

    async fn search(&self, query: &str) -> Result<Vec<FeedPost>> {
        let sql = format!(
            r#"{}
            WHERE p.content_folded LIKE ? ESCAPE '\'
            ORDER BY p.created_at DESC, p.id DESC
            "#,
            FEED_SELECT
        );

        let rows = sqlx::query(&sql)
            .bind(format!("%{}%", escape_like(&query.to_lowercase())))
            .fetch_all(&self.pool)
            .await
            .context("Failed to search posts")?;

        rows.iter().map(row_to_feed_post).collect()
    }

    async fn update_content(&self, id: Uuid, content: &str) -> Result<Option<Post>> {
        let result = sqlx::query("UPDATE posts SET content = ?, content_folded = ? WHERE id = ?")
            .bind(content)
            .bind(content.to_lowercase())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update post")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    async fn delete(&self, id: Uuid) -> Result<Option<Post>> {
        let Some(post) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete post")?;

        Ok(Some(post))
    }
}

/// Escape LIKE wildcards so user input matches literally
pub(crate) fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    Ok(Post {
        id: get_uuid(row, "id")?,
        author_id: get_uuid(row, "author_id")?,
        content: row.try_get("content")?,
        image_ref: row.try_get("image_ref")?,
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_feed_post(row: &SqliteRow) -> Result<FeedPost> {
    let post = row_to_post(row)?;
    let author = ProfileSummary {
        id: post.author_id,
        username: row.try_get("author_username")?,
        avatar_ref: row.try_get("author_avatar_ref")?,
    };

    Ok(FeedPost {
        post,
        author,
        like_count: row.try_get("like_count")?,
        comment_count: row.try_get("comment_count")?,
    })
}
