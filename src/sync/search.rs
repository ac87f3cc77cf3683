//! Post search
//!
//! A one-shot query rather than a sync unit: results are not kept fresh.

use tracing::debug;

use crate::models::FeedPost;
use crate::services::Backend;
use crate::toast::{Toast, Toaster};

/// Posts whose content contains `query`, case-insensitively, newest first
///
/// A blank query returns nothing without touching the backend. Failures are
/// toasted and yield an empty result.
pub async fn search_posts(backend: &Backend, toaster: &Toaster, query: &str) -> Vec<FeedPost> {
    let query = query.trim();
    if query.is_empty() {
        return Vec::new();
    }

    match backend.posts.search(query).await {
        Ok(posts) => {
            debug!("Search for {:?} matched {} posts", query, posts.len());
            posts
        }
        Err(err) => {
            toaster.push(Toast::destructive("Error searching posts").with_description(err.to_string()));
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::testing::TestPlatform;

    #[tokio::test]
    async fn test_case_insensitive_match() {
        let platform = TestPlatform::new().await;
        let author = platform.user("sol").await;
        platform.post(author, "Rust is fun").await;
        platform.post(author, "gardening").await;
        let toaster = Toaster::new();

        let found = search_posts(&platform.backend, &toaster, "rUST").await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].post.content, "Rust is fun");
        assert_eq!(found[0].author.username.as_deref(), Some("sol"));
    }

    #[tokio::test]
    async fn test_wildcards_match_literally() {
        let platform = TestPlatform::new().await;
        let author = platform.user("sol").await;
        platform.post(author, "100% sure").await;
        platform.post(author, "1000 times").await;
        platform.post(author, "snake_case").await;
        platform.post(author, "snakeXcase").await;
        let toaster = Toaster::new();

        let percent = search_posts(&platform.backend, &toaster, "100%").await;
        assert_eq!(percent.len(), 1);
        assert_eq!(percent[0].post.content, "100% sure");

        let underscore = search_posts(&platform.backend, &toaster, "e_c").await;
        assert_eq!(underscore.len(), 1);
        assert_eq!(underscore[0].post.content, "snake_case");
    }

    #[tokio::test]
    async fn test_blank_query_makes_no_call() {
        let platform = TestPlatform::new().await;
        let toaster = Toaster::new();
        // Any backend call would now fail and toast
        platform.backend.close().await;

        assert!(search_posts(&platform.backend, &toaster, "   ").await.is_empty());
        assert!(toaster.active().is_empty());

        assert!(search_posts(&platform.backend, &toaster, "x").await.is_empty());
        assert_eq!(toaster.active()[0].title, "Error searching posts");
    }
}
