//! Message repository

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::get_uuid;
use crate::models::{Message, MessageWithSender, ProfileSummary};

/// Message repository trait
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a direct message
    async fn create(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message>;

    /// Get message joined with its sender
    async fn get_with_sender(&self, id: Uuid) -> Result<Option<MessageWithSender>>;

    /// Messages exchanged between two users, oldest first
    async fn list_conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<MessageWithSender>>;
}

/// SQLx-based message repository
pub struct SqlxMessageRepository {
    pool: SqlitePool,
}

impl SqlxMessageRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: SqlitePool) -> Arc<dyn MessageRepository> {
        Arc::new(Self::new(pool))
    }
}

const WITH_SENDER_SELECT: &str = r#"
    SELECT m.id, m.sender_id, m.receiver_id, m.content, m.created_at,
           pr.username AS sender_username, pr.avatar_ref AS sender_avatar_ref
    FROM messages m
    LEFT JOIN profiles pr ON pr.id = m.sender_id
"#;

#[async_trait]
impl MessageRepository for SqlxMessageRepository {
    async fn create(&self, sender_id: Uuid, receiver_id: Uuid, content: &str) -> Result<Message> {
        let message = Message {
            id: Uuid::new_v4(),
            sender_id,
            receiver_id,
            content: content.to_string(),
            created_at: Utc::now(),
        };

        sqlx::query(
            r#"
            INSERT INTO messages (id, sender_id, receiver_id, content, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(message.id.to_string())
        .bind(message.sender_id.to_string())
        .bind(message.receiver_id.to_string())
        .bind(&message.content)
        .bind(message.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to create message")?;

        Ok(message)
    }

    async fn get_with_sender(&self, id: Uuid) -> Result<Option<MessageWithSender>> {
        let sql = format!("{} WHERE m.id = ?", WITH_SENDER_SELECT);
        let row = sqlx::query(&sql)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to get message")?;

        row.as_ref().map(row_to_message_with_sender).transpose()
    }

    async fn list_conversation(&self, a: Uuid, b: Uuid) -> Result<Vec<MessageWithSender>> {
        let sql = format!(
            r#"{}
            WHERE (m.sender_id = ?1 AND m.receiver_id = ?2)
               OR (m.sender_id = ?2 AND m.receiver_id = ?1)
            ORDER BY m.created_at ASC, m.id ASC
            "#,
            WITH_SENDER_SELECT
        );
        let rows = sqlx::query(&sql)
            .bind(a.to_string())
            .bind(b.to_string())
            .fetch_all(&self.pool)
            .await
            .context("Failed to list conversation")?;

        rows.iter().map(row_to_message_with_sender).collect()
    }
}

fn row_to_message_with_sender(row: &SqliteRow) -> Result<MessageWithSender> {
    let message = Message {
        id: get_uuid(row, "id")?,
        sender_id: get_uuid(row, "sender_id")?,
        receiver_id: get_uuid(row, "receiver_id")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
    };
    let sender = ProfileSummary {
        id: message.sender_id,
        username: row.try_get("sender_username")?,
        avatar_ref: row.try_get("sender_avatar_ref")?,
    };
    Ok(MessageWithSender { message, sender })
}
