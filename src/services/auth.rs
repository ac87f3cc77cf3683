//! Auth service
//!
//! Implements the session capability of the platform:
//! - Sign-up (account + profile, then an immediate session)
//! - Sign-in with email and password
//! - Sign-out
//! - Session lookup by token, rejecting and purging expired sessions

use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::error::ServiceError;
use super::password::{hash_password, password_problem, verify_password};
use crate::db::repositories::{AccountRepository, SessionRepository};
use crate::models::Session;

/// Default session expiration time in days
const DEFAULT_SESSION_EXPIRATION_DAYS: i64 = 7;

/// Generic sign-in failure; never reveals which half was wrong
const INVALID_CREDENTIALS: &str = "Invalid login credentials";

/// Input for sign-up
#[derive(Debug, Clone)]
pub struct SignUpInput {
    pub email: String,
    pub password: String,
    pub username: Option<String>,
}

impl SignUpInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            username: None,
        }
    }

    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }
}

pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    sessions: Arc<dyn SessionRepository>,
    session_expiration_days: i64,
}

impl AuthService {
    pub fn new(accounts: Arc<dyn AccountRepository>, sessions: Arc<dyn SessionRepository>) -> Self {
        Self::with_session_expiration(accounts, sessions, DEFAULT_SESSION_EXPIRATION_DAYS)
    }

    pub fn with_session_expiration(
        accounts: Arc<dyn AccountRepository>,
        sessions: Arc<dyn SessionRepository>,
        session_expiration_days: i64,
    ) -> Self {
        Self {
            accounts,
            sessions,
            session_expiration_days,
        }
    }

    /// Register an account and sign it in
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed email, short password or blank username
    /// - `Conflict` if the email or username is taken
    pub async fn sign_up(&self, input: SignUpInput) -> Result<Session, ServiceError> {
        let email = input.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ServiceError::Validation("Invalid email format".to_string()));
        }
        if let Some(problem) = password_problem(&input.password) {
            return Err(ServiceError::Validation(problem));
        }
        let username = input.username.as_deref().map(str::trim);
        if username == Some("") {
            return Err(ServiceError::Validation("Username cannot be empty".to_string()));
        }

        if self.accounts.get_by_email(email).await?.is_some() {
            return Err(ServiceError::Conflict("User already registered".to_string()));
        }

        let password_hash = hash_password(&input.password)?;
        let (account, _profile) = self
            .accounts
            .create_with_profile(email, &password_hash, username)
            .await?;

        info!("Registered account {}", account.id);
        self.create_session(account.id).await
    }

    /// Exchange credentials for a new session
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let account = self
            .accounts
            .get_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string()))?;

        if !verify_password(password, &account.password_hash)? {
            debug!("Rejected sign-in for account {}", account.id);
            return Err(ServiceError::Unauthenticated(INVALID_CREDENTIALS.to_string()));
        }

        info!("Account {} signed in", account.id);
        self.create_session(account.id).await
    }

    /// Invalidate a session; unknown tokens are not an error
    pub async fn sign_out(&self, token: &str) -> Result<(), ServiceError> {
        self.sessions.delete(token).await?;
        Ok(())
    }

    /// Look up a live session
    ///
    /// Returns `None` for unknown tokens and for expired sessions, which are
    /// deleted on the way.
    pub async fn get_session(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        let Some(session) = self.sessions.get_by_token(token).await? else {
            return Ok(None);
        };

        if session.is_expired() {
            debug!("Session for {} expired", session.user_id);
            self.sessions.delete(token).await?;
            return Ok(None);
        }

        Ok(Some(session))
    }

    /// Delete all expired sessions; returns how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<u64, ServiceError> {
        Ok(self.sessions.delete_expired().await?)
    }

    async fn create_session(&self, user_id: Uuid) -> Result<Session, ServiceError> {
        let now = Utc::now();
        let session = Session {
            token: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_expiration_days),
            created_at: now,
        };

        Ok(self.sessions.create(&session).await?)
    }
}
