//! Like repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{Like, Notification, NotificationKind};

/// Like repository trait
#[async_trait]
pub trait LikeRepository: Send + Sync {
    /// Insert a like; fails with a unique violation when the pair exists
    async fn create(&self, post_id: Uuid, user_id: Uuid) -> Result<Like>;

    /// Find the like of `user_id` on `post_id`
    async fn find(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Like>>;

    /// Remove the like of `user_id` on `post_id`, returning the removed row
    async fn delete_by_pair(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Like>>;

    /// Number of likes on a post
    async fn count_for_post(&self, post_id: Uuid) -> Result<i64>;

    /// Likes on posts authored by `owner_id`, newest first
    async fn list_on_posts_of(&self, owner_id: Uuid) -> Result<Vec<Notification>>;
}

/// SQLx-based like repository
pub struct SqlxLikeRepository {
    pool: SqlitePool,
}

impl SqlxLikeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn LikeRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LikeRepository for SqlxLikeRepository {
    async fn create(&self, post_id: Uuid, user_id: Uuid) -> Result<Like> {
        let like = Like {
            id: Uuid::new_v4(),
            post_id,
            user_id,
            created_at: Utc::now(),
        };

        sqlx::query("INSERT INTO likes (id, post_id, user_id, created_at) VALUES (?, ?, ?, ?)")
            .bind(like.id.to_string())
            .bind(like.post_id.to_string())
            .bind(like.user_id.to_string())
            .bind(like.created_at)
            .execute(&self.pool)
            .await
            .context("Failed to create like")?;

        Ok(like)
    }

    async fn find(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Like>> {
        let row = sqlx::query(
            "SELECT id, post_id, user_id, created_at FROM likes WHERE post_id = ? AND user_id = ?",
        )
        .bind(post_id.to_string())
        .bind(user_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find like")?;

        row.as_ref().map(row_to_like).transpose()
    }

    async fn delete_by_pair(&self, post_id: Uuid, user_id: Uuid) -> Result<Option<Like>> {
        let Some(like) = self.find(post_id, user_id).await? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM likes WHERE id = ?")
            .bind(like.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete like")?;

        Ok(Some(like))
    }

    async fn count_for_post(&self, post_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM likes WHERE post_id = ?")
            .bind(post_id.to_string())
            .fetch_one(&self.pool)
            .await
            .context("Failed to count likes")?;

        Ok(count)
    }

    async fn list_on_posts_of(&self, owner_id: Uuid) -> Result<Vec<Notification>> {
        let rows = sqlx::query(
            r#"
            SELECT l.id, l.created_at, l.post_id, p.content AS post_content,
                   pr.username AS actor_username
            FROM likes l
            JOIN posts p ON p.id = l.post_id
            LEFT JOIN profiles pr ON pr.id = l.user_id
            WHERE p.author_id = ?
            ORDER BY l.created_at DESC
            "#,
        )
        .bind(owner_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list likes on posts")?;

        rows.iter()
            .map(|row| row_to_notification(row, NotificationKind::Like))
            .collect()
    }
}

fn row_to_like(row: &SqliteRow) -> Result<Like> {
    Ok(Like {
        id: get_uuid(row, "id")?,
        post_id: get_uuid(row, "post_id")?,
        user_id: get_uuid(row, "user_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Shared by the like and comment notification listings
pub(crate) fn row_to_notification(row: &SqliteRow, kind: NotificationKind) -> Result<Notification> {
    Ok(Notification {
        id: get_uuid(row, "id")?,
        kind,
        created_at: row.try_get("created_at")?,
        post_id: get_uuid(row, "post_id")?,
        post_content: row.try_get("post_content")?,
        actor_username: row.try_get("actor_username")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{
        AccountRepository, PostRepository, SqlxAccountRepository, SqlxPostRepository,
    };
    use crate::db::{create_test_pool, migrations};
    use crate::models::CreatePostInput;

    struct Fixture {
        repo: SqlxLikeRepository,
        owner: Uuid,
        fan: Uuid,
        post_id: Uuid,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let accounts = SqlxAccountRepository::new(pool.clone());
        let (owner, _) = accounts
            .create_with_profile("owner@example.com", "hash", Some("owner"))
            .await
            .unwrap();
        let (fan, _) = accounts
            .create_with_profile("fan@example.com", "hash", Some("fan"))
            .await
            .unwrap();
        let post = SqlxPostRepository::new(pool.clone())
            .create(owner.id, &CreatePostInput {
                content: "likeable".to_string(),
                image_ref: None,
            })
            .await
            .unwrap();

        Fixture {
            repo: SqlxLikeRepository::new(pool),
            owner: owner.id,
            fan: fan.id,
            post_id: post.id,
        }
    }

    #[tokio::test]
    async fn test_like_and_unlike() {
        let f = setup().await;

        f.repo.create(f.post_id, f.fan).await.unwrap();
        assert_eq!(f.repo.count_for_post(f.post_id).await.unwrap(), 1);
        assert!(f.repo.find(f.post_id, f.fan).await.unwrap().is_some());

        let removed = f.repo.delete_by_pair(f.post_id, f.fan).await.unwrap();
        assert!(removed.is_some());
        assert_eq!(f.repo.count_for_post(f.post_id).await.unwrap(), 0);
        assert!(f.repo.delete_by_pair(f.post_id, f.fan).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_like_is_unique_violation() {
        let f = setup().await;
        f.repo.create(f.post_id, f.fan).await.unwrap();

        let err = f.repo.create(f.post_id, f.fan).await.unwrap_err();
        let is_unique = err
            .downcast_ref::<sqlx::Error>()
            .and_then(|e| e.as_database_error())
            .map(|e| e.is_unique_violation())
            .unwrap_or(false);
        assert!(is_unique);
        assert_eq!(f.repo.count_for_post(f.post_id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_notifications_for_owner() {
        let f = setup().await;
        f.repo.create(f.post_id, f.fan).await.unwrap();

        let notifications = f.repo.list_on_posts_of(f.owner).await.unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Like);
        assert_eq!(notifications[0].actor_username.as_deref(), Some("fan"));
        assert_eq!(notifications[0].post_content, "likeable");

        assert!(f.repo.list_on_posts_of(f.fan).await.unwrap().is_empty());
    }
}
