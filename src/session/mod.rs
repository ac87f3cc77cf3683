//! Session context
//!
//! One [`SessionContext`] per client holds the signed-in session. Views
//! subscribe to it explicitly and are told about sign-in and sign-out;
//! mounting any data view goes through [`SessionContext::guard`], which
//! sends anonymous users to the entry view.

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::Session;
use crate::services::{Backend, ServiceError, SignUpInput};

/// Top-level views of the client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Landing page with the sign-in form
    Entry,
    Feed,
    Search,
    Notifications,
    Messages,
    Profile,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Self::Entry => "/",
            Self::Feed => "/feed",
            Self::Search => "/search",
            Self::Notifications => "/notifications",
            Self::Messages => "/messages",
            Self::Profile => "/profile",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
}

/// Subscription to session transitions; dropping it unsubscribes
pub struct SessionWatch {
    receiver: watch::Receiver<Option<Session>>,
}

impl SessionWatch {
    /// Wait for the next transition; `None` once the context is gone
    pub async fn next(&mut self) -> Option<AuthEvent> {
        self.receiver.changed().await.ok()?;
        let event = match self.receiver.borrow_and_update().as_ref() {
            Some(session) => AuthEvent::SignedIn(session.clone()),
            None => AuthEvent::SignedOut,
        };
        Some(event)
    }
}

pub struct SessionContext {
    backend: Arc<Backend>,
    current: watch::Sender<Option<Session>>,
}

impl SessionContext {
    pub fn new(backend: Arc<Backend>) -> Self {
        let (current, _) = watch::channel(None);
        Self { backend, current }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        username: Option<&str>,
    ) -> Result<Session, ServiceError> {
        let mut input = SignUpInput::new(email, password);
        if let Some(username) = username {
            input = input.with_username(username);
        }

        let session = self.backend.auth.sign_up(input).await?;
        self.set(Some(session.clone()));
        Ok(session)
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session, ServiceError> {
        let session = self.backend.auth.sign_in(email, password).await?;
        self.set(Some(session.clone()));
        Ok(session)
    }

    /// End the current session, if any
    pub async fn sign_out(&self) -> Result<(), ServiceError> {
        let Some(session) = self.current() else {
            return Ok(());
        };

        self.backend.auth.sign_out(&session.token).await?;
        self.set(None);
        Ok(())
    }

    /// Resume a session from a stored token
    ///
    /// Unknown and expired tokens leave the context signed out.
    pub async fn restore(&self, token: &str) -> Result<Option<Session>, ServiceError> {
        let session = self.backend.auth.get_session(token).await?;
        self.set(session.clone());
        Ok(session)
    }

    pub fn current(&self) -> Option<Session> {
        self.current.borrow().clone()
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.current.borrow().as_ref().map(|s| s.user_id)
    }

    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            receiver: self.current.subscribe(),
        }
    }

    /// Number of live [`SessionWatch`]es
    pub fn subscriber_count(&self) -> usize {
        self.current.receiver_count()
    }

    /// The live session, or the route to redirect to
    pub fn guard(&self) -> Result<Session, Route> {
        match self.current() {
            Some(session) if !session.is_expired() => Ok(session),
            Some(_) => {
                debug!("Session expired, redirecting to {}", Route::Entry.path());
                self.set(None);
                Err(Route::Entry)
            }
            None => Err(Route::Entry),
        }
    }

    fn set(&self, session: Option<Session>) {
        let changed = self.current.send_if_modified(|current| {
            let same = match (current.as_ref(), session.as_ref()) {
                (Some(a), Some(b)) => a.token == b.token,
                (None, None) => true,
                _ => false,
            };
            if !same {
                *current = session.clone();
            }
            !same
        });

        if changed {
            match &session {
                Some(s) => info!("Signed in as {}", s.user_id),
                None => info!("Signed out"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_guard_redirects_until_signed_in() {
        let platform = TestPlatform::new().await;
        let context = SessionContext::new(platform.backend.clone());

        assert_eq!(context.guard(), Err(Route::Entry));

        context
            .sign_up("kim@example.com", "password1", Some("kim"))
            .await
            .unwrap();
        let session = context.guard().expect("Should be signed in");
        assert_eq!(context.user_id(), Some(session.user_id));

        context.sign_out().await.unwrap();
        assert_eq!(context.guard(), Err(Route::Entry));
    }

    #[tokio::test]
    async fn test_watch_sees_transitions() {
        let platform = TestPlatform::new().await;
        platform.session("lee").await;
        let context = SessionContext::new(platform.backend.clone());
        let mut watch = context.subscribe();
        assert_eq!(context.subscriber_count(), 1);

        let session = context.sign_in("lee@example.com", "password1").await.unwrap();
        assert_eq!(watch.next().await, Some(AuthEvent::SignedIn(session)));

        context.sign_out().await.unwrap();
        assert_eq!(watch.next().await, Some(AuthEvent::SignedOut));

        drop(watch);
        assert_eq!(context.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_sign_in_stays_signed_out() {
        let platform = TestPlatform::new().await;
        platform.session("max").await;
        let context = SessionContext::new(platform.backend.clone());

        let result = context.sign_in("max@example.com", "wrong-password").await;
        assert!(matches!(result, Err(ServiceError::Unauthenticated(_))));
        assert!(context.current().is_none());
    }

    #[tokio::test]
    async fn test_restore() {
        let platform = TestPlatform::new().await;
        let stored = platform.session("ned").await;
        let context = SessionContext::new(platform.backend.clone());

        assert!(context.restore("bogus").await.unwrap().is_none());
        assert!(context.current().is_none());

        let restored = context.restore(&stored.token).await.unwrap();
        assert_eq!(restored.map(|s| s.user_id), Some(stored.user_id));
        assert!(context.guard().is_ok());
    }

    #[tokio::test]
    async fn test_guard_rejects_expired_session() {
        let platform = TestPlatform::new().await;
        let context = SessionContext::new(platform.backend.clone());
        let mut watch = context.subscribe();

        let mut session = platform.session("oz").await;
        session.expires_at = Utc::now() - Duration::minutes(1);
        context.set(Some(session));
        assert!(matches!(watch.next().await, Some(AuthEvent::SignedIn(_))));

        assert_eq!(context.guard(), Err(Route::Entry));
        assert_eq!(watch.next().await, Some(AuthEvent::SignedOut));
    }
}
