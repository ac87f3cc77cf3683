//! Account repository
//!
//! Credentials live in `accounts`; creating an account also creates the
//! profile row that shares its id.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{Account, Profile};

/// Account repository trait
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Create an account and its profile in one transaction
    async fn create_with_profile(
        &self,
        email: &str,
        password_hash: &str,
        username: Option<&str>,
    ) -> Result<(Account, Profile)>;

    /// Get an account by email (case-insensitive)
    async fn get_by_email(&self, email: &str) -> Result<Option<Account>>;

    /// Get an account by ID
    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>>;
}

/// SQLx-based account repository
pub struct SqlxAccountRepository {
    pool: SqlitePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn AccountRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn create_with_profile(
        &self,
        email: &str,
        password_hash: &str,
        username: Option<&str>,
    ) -> Result<(Account, Profile)> {
        let now = Utc::now();
        let account = Account {
            id: Uuid::new_v4(),
            email: email.trim().to_lowercase(),
            password_hash: password_hash.to_string(),
            created_at: now,
        };
        let profile = Profile {
            id: account.id,
            username: username.map(str::to_string),
            avatar_ref: None,
            bio: None,
            verified: Some(false),
            created_at: now,
        };

        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO accounts (id, email, password_hash, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(account.id.to_string())
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create account")?;

        sqlx::query(
            r#"
            INSERT INTO profiles (id, username, verified, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(profile.id.to_string())
        .bind(&profile.username)
        .bind(profile.verified)
        .bind(profile.created_at)
        .execute(&mut *tx)
        .await
        .context("Failed to create profile")?;

        tx.commit().await?;

        Ok((account, profile))
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get account by email")?;

        row.as_ref().map(row_to_account).transpose()
    }

    async fn get_by_id(&self, id: Uuid) -> Result<Option<Account>> {
        let row = sqlx::query(
            "SELECT id, email, password_hash, created_at FROM accounts WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to get account by ID")?;

        row.as_ref().map(row_to_account).transpose()
    }
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: get_uuid(row, "id")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> SqlxAccountRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxAccountRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_with_profile() {
        let repo = setup_test_repo().await;

        let (account, profile) = repo
            .create_with_profile("Alice@Example.com ", "hash", Some("alice"))
            .await
            .expect("Failed to create account");

        assert_eq!(account.email, "alice@example.com");
        assert_eq!(profile.id, account.id);
        assert_eq!(profile.username.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_get_by_email_is_case_insensitive() {
        let repo = setup_test_repo().await;
        let (account, _) = repo
            .create_with_profile("bob@example.com", "hash", None)
            .await
            .unwrap();

        let found = repo
            .get_by_email("BOB@example.com")
            .await
            .unwrap()
            .expect("Account not found");
        assert_eq!(found.id, account.id);
        assert!(repo.get_by_email("nobody@example.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let repo = setup_test_repo().await;
        repo.create_with_profile("carol@example.com", "hash", Some("carol"))
            .await
            .unwrap();

        let duplicate = repo
            .create_with_profile("carol@example.com", "hash", Some("carol2"))
            .await;
        assert!(duplicate.is_err());

        // The failed transaction must not leave a dangling profile behind
        assert!(repo.get_by_email("carol@example.com").await.unwrap().is_some());
    }
}
