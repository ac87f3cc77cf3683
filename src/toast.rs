//! Transient user notifications
//!
//! Failures at the client boundary end up here instead of propagating.
//! Every toast is also written to the log.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Toasts kept on screen at once; older ones are dropped first
const DEFAULT_TOAST_LIMIT: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ToastVariant {
    Default,
    Destructive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub id: u64,
    pub variant: ToastVariant,
    pub title: String,
    pub description: Option<String>,
}

impl Toast {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: 0,
            variant: ToastVariant::Default,
            title: title.into(),
            description: None,
        }
    }

    pub fn destructive(title: impl Into<String>) -> Self {
        Self {
            variant: ToastVariant::Destructive,
            ..Self::new(title)
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn is_destructive(&self) -> bool {
        self.variant == ToastVariant::Destructive
    }
}

pub struct Toaster {
    next_id: AtomicU64,
    limit: usize,
    active: Mutex<Vec<Toast>>,
}

impl Default for Toaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Toaster {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_TOAST_LIMIT)
    }

    pub fn with_limit(limit: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            limit: limit.max(1),
            active: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Toast>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Show a toast and return its id
    pub fn push(&self, mut toast: Toast) -> u64 {
        toast.id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let description = toast.description.as_deref().unwrap_or("");
        if toast.is_destructive() {
            warn!("{}: {}", toast.title, description);
        } else {
            info!("{}: {}", toast.title, description);
        }

        let id = toast.id;
        let mut active = self.lock();
        active.insert(0, toast);
        active.truncate(self.limit);
        id
    }

    /// Remove a toast; false if it was already gone
    pub fn dismiss(&self, id: u64) -> bool {
        let mut active = self.lock();
        let before = active.len();
        active.retain(|t| t.id != id);
        active.len() != before
    }

    /// Toasts on screen, newest first
    pub fn active(&self) -> Vec<Toast> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_and_dismiss() {
        let toaster = Toaster::new();
        let first = toaster.push(Toast::new("Success").with_description("Saved"));
        let second = toaster.push(Toast::destructive("Error"));

        let active = toaster.active();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, second);
        assert!(active[0].is_destructive());
        assert_eq!(active[1].description.as_deref(), Some("Saved"));

        assert!(toaster.dismiss(first));
        assert!(!toaster.dismiss(first));
        assert_eq!(toaster.active().len(), 1);
    }

    #[test]
    fn test_limit_drops_oldest() {
        let toaster = Toaster::with_limit(2);
        toaster.push(Toast::new("one"));
        toaster.push(Toast::new("two"));
        toaster.push(Toast::new("three"));

        let titles: Vec<String> = toaster.active().into_iter().map(|t| t.title).collect();
        assert_eq!(titles, vec!["three", "two"]);
    }
}
