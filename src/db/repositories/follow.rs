//! Follow repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{Follow, FollowStats};

/// Follow repository trait
#[async_trait]
pub trait FollowRepository: Send + Sync {
    /// Insert a follow edge; fails with a unique violation when it exists
    async fn create(&self, follower_id: Uuid, following_id: Uuid) -> Result<Follow>;

    /// Remove a follow edge, returning the removed row
    async fn delete_by_pair(&self, follower_id: Uuid, following_id: Uuid)
        -> Result<Option<Follow>>;

    /// Follower/following counts of `profile_id` as seen by `viewer_id`
    async fn stats(&self, profile_id: Uuid, viewer_id: Uuid) -> Result<FollowStats>;
}

/// SQLx-based follow repository
pub struct SqlxFollowRepository {
    pool: SqlitePool,
}

impl SqlxFollowRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn FollowRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl FollowRepository for SqlxFollowRepository {
    async fn create(&self, follower_id: Uuid, following_id: Uuid) -> Result<Follow> {
        let follow = Follow {
            id: Uuid::new_v4(),
            follower_id,
            following_id,
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO follows (id, follower_id, following_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(follow.id.to_string())
        .bind(follow.follower_id.to_string())
        .bind(follow.following_id.to_string())
        .bind(follow.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create follow")?;

        Ok(follow)
    }

    async fn delete_by_pair(
        &self,
        follower_id: Uuid,
        following_id: Uuid,
    ) -> Result<Option<Follow>> {
        let row = sqlx::query(
            r#"
            SELECT id, follower_id, following_id, created_at
            FROM follows
            WHERE follower_id = ? AND following_id = ?
            "#,
        )
        .bind(follower_id.to_string())
        .bind(following_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to find follow")?;

        let Some(follow) = row.as_ref().map(row_to_follow).transpose()? else {
            return Ok(None);
        };

        sqlx::query("DELETE FROM follows WHERE id = ?")
            .bind(follow.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete follow")?;

        Ok(Some(follow))
    }

    async fn stats(&self, profile_id: Uuid, viewer_id: Uuid) -> Result<FollowStats> {
        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM follows WHERE following_id = ?1) AS followers,
                (SELECT COUNT(*) FROM follows WHERE follower_id = ?1) AS following,
                EXISTS(
                    SELECT 1 FROM follows WHERE follower_id = ?2 AND following_id = ?1
                ) AS is_following
            "#,
        )
        .bind(profile_id.to_string())
        .bind(viewer_id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to load follow stats")?;

        Ok(FollowStats {
            followers: row.try_get("followers")?,
            following: row.try_get("following")?,
            is_following: row.try_get("is_following")?,
        })
    }
}

fn row_to_follow(row: &SqliteRow) -> Result<Follow> {
    Ok(Follow {
        id: get_uuid(row, "id")?,
        follower_id: get_uuid(row, "follower_id")?,
        following_id: get_uuid(row, "following_id")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{AccountRepository, SqlxAccountRepository};
    use crate::db::{create_test_pool, migrations};

    async fn setup() -> (SqlxFollowRepository, Uuid, Uuid) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool).await.expect("Failed to run migrations");
        let accounts = SqlxAccountRepository::new(pool.clone());
        let (a, _) = accounts.create_with_profile("a@example.com", "hash", None).await.unwrap();
        let (b, _) = accounts.create_with_profile("b@example.com", "hash", None).await.unwrap();
        (SqlxFollowRepository::new(pool), a.id, b.id)
    }

    #[tokio::test]
    async fn test_follow_stats() {
        let (repo, a, b) = setup().await;

        assert_eq!(repo.stats(b, a).await.unwrap(), FollowStats::default());

        repo.create(a, b).await.unwrap();
        let stats = repo.stats(b, a).await.unwrap();
        assert_eq!(stats.followers, 1);
        assert_eq!(stats.following, 0);
        assert!(stats.is_following);

        let reverse = repo.stats(a, b).await.unwrap();
        assert_eq!(reverse.following, 1);
        assert!(!reverse.is_following);
    }

    #[tokio::test]
    async fn test_duplicate_follow_rejected() {
        let (repo, a, b) = setup().await;
        repo.create(a, b).await.unwrap();
        assert!(repo.create(a, b).await.is_err());
        assert_eq!(repo.stats(b, a).await.unwrap().followers, 1);
    }

    #[tokio::test]
    async fn test_unfollow() {
        let (repo, a, b) = setup().await;
        repo.create(a, b).await.unwrap();

        assert!(repo.delete_by_pair(a, b).await.unwrap().is_some());
        assert!(repo.delete_by_pair(a, b).await.unwrap().is_none());
        assert_eq!(repo.stats(b, a).await.unwrap(), FollowStats::default());
    }
}
