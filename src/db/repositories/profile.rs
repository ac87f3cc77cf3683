//! Profile repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{Profile, ProfileOverview, UpdateProfileInput};

/// Profile repository trait
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    /// Get a profile by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Profile>>;

    /// Apply the set fields of `input`; returns the updated profile
    async fn update(&self, id: Uuid, input: &UpdateProfileInput) -> Result<Option<Profile>>;

    /// Profile with post and follow counters
    async fn overview(&self, id: Uuid) -> Result<Option<ProfileOverview>>;
}

/// SQLx-based profile repository
pub struct SqlxProfileRepository {
    pool: SqlitePool,
}

impl SqlxProfileRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn ProfileRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ProfileRepository for SqlxProfileRepository {
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Profile>> {
        let row = sqlx::query(
            r#"
            SELECT id, username, avatar_ref, bio, verified, created_at
            FROM profiles
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get profile by ID")?;

        row.as_ref().map(row_to_profile).transpose()
    }

    async fn update(&self, id: Uuid, input: &UpdateProfileInput) -> Result<Option<Profile>> {
        let result = sqlx::query(
            r#"
            UPDATE profiles
            SET username = COALESCE(?, username),
                bio = COALESCE(?, bio),
                avatar_ref = COALESCE(?, avatar_ref)
            WHERE id = ?
            "#,
        )
        .bind(&input.username)
        .bind(&input.bio)
        .bind(&input.avatar_ref)
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update profile")?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    async fn overview(&self, id: Uuid) -> Result<Option<ProfileOverview>> {
        let Some(profile) = self.get_by_id(id).await? else {
            return Ok(None);
        };

        let row = sqlx::query(
            r#"
            SELECT
                (SELECT COUNT(*) FROM posts WHERE author_id = ?1) AS posts_count,
                (SELECT COUNT(*) FROM follows WHERE following_id = ?1) AS followers_count,
                (SELECT COUNT(*) FROM follows WHERE follower_id = ?1) AS following_count
            "#,
        )
        .bind(id.to_string())
        .fetch_one(&self.pool)
        .await
        .context("Failed to count profile activity")?;

        Ok(Some(ProfileOverview {
            profile,
            posts_count: row.try_get("posts_count")?,
            followers_count: row.try_get("followers_count")?,
            following_count: row.try_get("following_count")?,
        }))
    }
}

fn row_to_profile(row: &SqliteRow) -> Result<Profile> {
    Ok(Profile {
        id: get_uuid(row, "id")?,
        username: row.try_get("username")?,
        avatar_ref: row.try_get("avatar_ref")?,
        bio: row.try_get("bio")?,
        verified: row.try_get("verified")?,
        created_at: row.try_get("created_at")?,
    })
}
