//! Activity notifications derived from likes and comments on a user's posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Characters of the post shown in a notification line
pub const EXCERPT_CHARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Like,
    Comment,
}

impl std::fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "liked"),
            Self::Comment => write!(f, "commented on"),
        }
    }
}

/// A like or comment someone left on one of the viewer's posts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Id of the underlying like or comment
    pub id: Uuid,
    pub kind: NotificationKind,
    pub created_at: DateTime<Utc>,
    pub post_id: Uuid,
    pub post_content: String,
    pub actor_username: Option<String>,
}

impl Notification {
    /// First characters of the post, with "..." when cut
    pub fn excerpt(&self) -> String {
        excerpt(&self.post_content)
    }

    /// One-line rendering, e.g. `alice liked your post: "hello"`
    pub fn describe(&self) -> String {
        format!(
            "{} {} your post: \"{}\"",
            self.actor_username.as_deref().unwrap_or("Someone"),
            self.kind,
            self.excerpt()
        )
    }
}

/// Cut `content` to [`EXCERPT_CHARS`] characters
pub fn excerpt(content: &str) -> String {
    let mut chars = content.chars();
    let head: String = chars.by_ref().take(EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{}...", head)
    } else {
        head
    }
}
