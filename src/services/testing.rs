//! Test fixtures: an in-memory platform with throwaway storage

use std::sync::Arc;
use tempfile::TempDir;
use uuid::Uuid;

use super::{Backend, SignUpInput};
use crate::config::Config;
use crate::db::{create_test_pool, migrations};
use crate::models::{CreatePostInput, Session};

pub(crate) struct TestPlatform {
    pub backend: Arc<Backend>,
    pub config: Config,
    _storage: TempDir,
}

impl TestPlatform {
    pub async fn new() -> Self {
        let storage = TempDir::new().expect("Failed to create storage dir");
        let config = Config::in_memory(storage.path().to_path_buf());
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        Self {
            backend: Arc::new(Backend::with_pool(pool, &config)),
            config,
            _storage: storage,
        }
    }

    /// Register `name` and return the new session
    pub async fn session(&self, name: &str) -> Session {
        self.backend
            .auth
            .sign_up(
                SignUpInput::new(format!("{}@example.com", name), "password1").with_username(name),
            )
            .await
            .expect("Failed to sign up test user")
    }

    /// Register `name` and return the user id
    pub async fn user(&self, name: &str) -> Uuid {
        self.session(name).await.user_id
    }

    /// Publish a text post and return its id
    pub async fn post(&self, author: Uuid, content: &str) -> Uuid {
        self.backend
            .posts
            .create(author, CreatePostInput {
                content: content.to_string(),
                image_ref: None,
            })
            .await
            .expect("Failed to create test post")
            .id
    }
}
