//! Services layer - the platform capability set
//!
//! Everything the client delegates to its backend lives behind
//! [`Backend`]:
//! - Query and mutation per collection, with ownership checks
//! - Change publication to the realtime hub after every successful write
//! - Object storage
//! - Session management
//!
//! Services map repository failures into [`ServiceError`] so that callers
//! can tell a duplicate key from a permission failure.

pub mod auth;
pub mod comments;
pub mod error;
pub mod follows;
pub mod likes;
pub mod messages;
pub mod notifications;
pub mod password;
pub mod posts;
pub mod profiles;

#[cfg(test)]
pub(crate) mod testing;

pub use auth::{AuthService, SignUpInput};
pub use comments::CommentService;
pub use error::ServiceError;
pub use follows::FollowService;
pub use likes::LikeService;
pub use messages::MessageService;
pub use notifications::NotificationService;
pub use password::{hash_password, verify_password};
pub use posts::PostService;
pub use profiles::ProfileService;

use anyhow::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

use crate::config::Config;
use crate::db::repositories::{
    SqlxAccountRepository, SqlxCommentRepository, SqlxFollowRepository, SqlxLikeRepository,
    SqlxMessageRepository, SqlxPostRepository, SqlxProfileRepository, SqlxSessionRepository,
};
use crate::db::{create_pool, migrations};
use crate::realtime::RealtimeHub;
use crate::storage::{LocalObjectStore, ObjectStore};

/// Handle to the platform
pub struct Backend {
    pub auth: AuthService,
    pub posts: PostService,
    pub likes: LikeService,
    pub comments: CommentService,
    pub messages: MessageService,
    pub follows: FollowService,
    pub profiles: ProfileService,
    pub notifications: NotificationService,
    pub realtime: Arc<RealtimeHub>,
    pub storage: Arc<dyn ObjectStore>,
    pool: SqlitePool,
}

impl Backend {
    /// Open the database, apply migrations and wire up every service
    pub async fn connect(config: &Config) -> Result<Arc<Self>> {
        let pool = create_pool(&config.database).await?;
        let applied = migrations::run_migrations(&pool).await?;
        if applied > 0 {
            info!("Applied {} migrations", applied);
        }

        Ok(Arc::new(Self::with_pool(pool, config)))
    }

    /// Wire services over an already migrated pool
    pub fn with_pool(pool: SqlitePool, config: &Config) -> Self {
        let realtime = Arc::new(RealtimeHub::from_config(&config.realtime));
        let likes = SqlxLikeRepository::boxed(pool.clone());
        let comments = SqlxCommentRepository::boxed(pool.clone());

        Self {
            auth: AuthService::with_session_expiration(
                SqlxAccountRepository::boxed(pool.clone()),
                SqlxSessionRepository::boxed(pool.clone()),
                config.session.expiration_days,
            ),
            posts: PostService::new(SqlxPostRepository::boxed(pool.clone()), realtime.clone()),
            likes: LikeService::new(likes.clone(), realtime.clone()),
            comments: CommentService::new(comments.clone(), realtime.clone()),
            messages: MessageService::new(
                SqlxMessageRepository::boxed(pool.clone()),
                realtime.clone(),
            ),
            follows: FollowService::new(SqlxFollowRepository::boxed(pool.clone()), realtime.clone()),
            profiles: ProfileService::new(
                SqlxProfileRepository::boxed(pool.clone()),
                realtime.clone(),
            ),
            notifications: NotificationService::new(likes, comments),
            realtime,
            storage: LocalObjectStore::boxed(config.storage.clone()),
            pool,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close the database pool
    pub async fn close(&self) {
        self.pool.close().await;
    }
}
