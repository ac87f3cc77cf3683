//! Post model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ProfileSummary;

/// Post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    /// Storage key of the attached image in the `post-images` bucket
    pub image_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a post
#[derive(Debug, Clone, Deserialize)]
pub struct CreatePostInput {
    pub content: String,
    pub image_ref: Option<String>,
}

/// Post joined with its author and engagement counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedPost {
    #[serde(flatten)]
    pub post: Post,
    pub author: ProfileSummary,
    pub like_count: i64,
    pub comment_count: i64,
}

/// Keyset position in a newest-first post listing.
///
/// The next page holds posts strictly older than the cursor, with the post
/// id breaking timestamp ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCursor {
    pub created_at: DateTime<Utc>,
    pub id: Uuid,
}

impl From<&Post> for FeedCursor {
    fn from(post: &Post) -> Self {
        Self {
            created_at: post.created_at,
            id: post.id,
        }
    }
}
