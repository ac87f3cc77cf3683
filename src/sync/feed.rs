//! Post feed
//!
//! All posts, or one author's, newest first and paginated by a
//! `(created_at, id)` cursor. Post changes are patched in place; like and
//! comment changes refetch only the affected post so its counts stay exact.

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{contains_key, remove_by_key, upsert_sorted, Keyed, Patch, SyncSource, SyncUnit, Upload};
use crate::models::{CreatePostInput, FeedCursor, FeedPost, Post};
use crate::realtime::{ChangeEvent, ChangeFilter, ChangeKind, Collection, Predicate};
use crate::services::{Backend, ServiceError};
use crate::storage::{object_key, POST_IMAGES_BUCKET};

pub type FeedUnit = SyncUnit<FeedSource>;

impl Keyed for FeedPost {
    fn key(&self) -> Uuid {
        self.post.id
    }
}

fn newest_first(a: &FeedPost, b: &FeedPost) -> Ordering {
    b.post
        .created_at
        .cmp(&a.post.created_at)
        .then_with(|| b.post.id.cmp(&a.post.id))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedSnapshot {
    pub posts: Vec<FeedPost>,
    /// More pages exist past the last loaded post
    pub has_more: bool,
}

impl FeedSnapshot {
    fn cursor(&self) -> Option<FeedCursor> {
        self.posts.last().map(|p| FeedCursor::from(&p.post))
    }

    /// Whether `post` falls inside the loaded window
    fn covers(&self, post: &FeedPost) -> bool {
        if !self.has_more {
            return true;
        }
        self.posts
            .last()
            .map(|last| newest_first(post, last) != Ordering::Greater)
            .unwrap_or(false)
    }
}

pub struct FeedSource {
    backend: Arc<Backend>,
    viewer: Uuid,
    author: Option<Uuid>,
    page_size: usize,
}

impl FeedSource {
    /// Everyone's posts
    pub fn new(backend: Arc<Backend>, viewer: Uuid, page_size: usize) -> Self {
        Self {
            backend,
            viewer,
            author: None,
            page_size: page_size.max(1),
        }
    }

    /// Only posts by `author`
    pub fn by_author(mut self, author: Uuid) -> Self {
        self.author = Some(author);
        self
    }

    pub fn author(&self) -> Option<Uuid> {
        self.author
    }

    async fn page(
        &self,
        before: Option<FeedCursor>,
        size: usize,
    ) -> Result<(Vec<FeedPost>, bool), ServiceError> {
        let mut posts = self.backend.posts.feed(self.author, before, size + 1).await?;
        let has_more = posts.len() > size;
        posts.truncate(size);
        Ok((posts, has_more))
    }

    /// Re-read one post into the snapshot, dropping it if it is gone
    async fn refresh_post(
        &self,
        snapshot: &FeedSnapshot,
        id: Uuid,
    ) -> Result<Patch<FeedSnapshot>, ServiceError> {
        if !contains_key(&snapshot.posts, id) {
            return Ok(Patch::Unchanged);
        }

        let mut next = snapshot.clone();
        match self.backend.posts.get(id).await? {
            Some(post) => upsert_sorted(&mut next.posts, post, newest_first),
            None => {
                remove_by_key(&mut next.posts, id);
            }
        }
        Ok(Patch::Replace(next))
    }
}

#[async_trait]
impl SyncSource for FeedSource {
    type Snapshot = FeedSnapshot;

    fn label(&self) -> &'static str {
        "posts"
    }

    fn channel_name(&self) -> String {
        match self.author {
            Some(author) => format!("public:posts:author_id=eq.{}", author),
            None => "public:posts".to_string(),
        }
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        let posts = match self.author {
            Some(author) => ChangeFilter::new(Collection::Posts, Predicate::eq_id("author_id", author)),
            None => ChangeFilter::all(Collection::Posts),
        };
        vec![
            posts,
            ChangeFilter::all(Collection::Likes),
            ChangeFilter::all(Collection::Comments),
        ]
    }

    async fn fetch(&self, current: &FeedSnapshot) -> Result<FeedSnapshot, ServiceError> {
        let window = current.posts.len().max(self.page_size);
        let (posts, has_more) = self.page(None, window).await?;
        Ok(FeedSnapshot { posts, has_more })
    }

    async fn patch(
        &self,
        snapshot: &FeedSnapshot,
        event: &ChangeEvent,
    ) -> Result<Patch<FeedSnapshot>, ServiceError> {
        match event.collection {
            Collection::Posts => {
                let Some(id) = event.record_id() else {
                    return Ok(Patch::Reload);
                };
                match event.kind {
                    ChangeKind::Insert => {
                        let Some(post) = self.backend.posts.get(id).await? else {
                            return Ok(Patch::Unchanged);
                        };
                        if !snapshot.covers(&post) {
                            return Ok(Patch::Unchanged);
                        }
                        let mut next = snapshot.clone();
                        upsert_sorted(&mut next.posts, post, newest_first);
                        Ok(Patch::Replace(next))
                    }
                    ChangeKind::Update => self.refresh_post(snapshot, id).await,
                    ChangeKind::Delete => {
                        let mut next = snapshot.clone();
                        if remove_by_key(&mut next.posts, id) {
                            Ok(Patch::Replace(next))
                        } else {
                            Ok(Patch::Unchanged)
                        }
                    }
                }
            }
            Collection::Likes | Collection::Comments => match event.field_uuid("post_id") {
                Some(post_id) => self.refresh_post(snapshot, post_id).await,
                None => Ok(Patch::Reload),
            },
            _ => Ok(Patch::Unchanged),
        }
    }
}

impl SyncUnit<FeedSource> {
    /// Append the next page; false when nothing was appended
    pub async fn load_more(&self) -> bool {
        let (snapshot, generation) = self.versioned_snapshot();
        if !snapshot.has_more {
            return false;
        }

        let page_size = self.source().page_size;
        let (page, has_more) = match self.source().page(snapshot.cursor(), page_size).await {
            Ok(page) => page,
            Err(err) => {
                self.report("Error fetching posts", &err);
                return false;
            }
        };

        let mut next = snapshot;
        for post in page {
            upsert_sorted(&mut next.posts, post, newest_first);
        }
        next.has_more = has_more;
        self.replace_if_current(generation, next)
    }

    /// Publish a post as the viewer
    ///
    /// The content is trimmed. Empty content without an image makes no
    /// remote call. An attached image is uploaded to the post image bucket
    /// first and referenced by its key, and removed again if the post
    /// cannot be created.
    pub async fn create_post(&self, content: &str, image: Option<Upload>) -> Option<Post> {
        let content = content.trim();
        if content.is_empty() && image.is_none() {
            return None;
        }
        let author = self.caller(self.source().viewer)?;

        let backend = self.backend();
        let image_ref = match image {
            Some(upload) => {
                let key = object_key(&upload.file_name, &upload.content_type);
                let stored = backend
                    .storage
                    .upload(POST_IMAGES_BUCKET, &key, &upload.data, &upload.content_type)
                    .await;
                if let Err(err) = stored {
                    self.report("Error uploading image", &ServiceError::from(err));
                    return None;
                }
                Some(key)
            }
            None => None,
        };

        let input = CreatePostInput {
            content: content.to_string(),
            image_ref: image_ref.clone(),
        };
        match backend.posts.create(author, input).await {
            Ok(post) => {
                debug!("Posted {}", post.id);
                Some(post)
            }
            Err(err) => {
                if let Some(key) = image_ref {
                    if let Err(cleanup) = backend.storage.remove(POST_IMAGES_BUCKET, &key).await {
                        warn!("Failed to remove unused image {}: {}", key, cleanup);
                    }
                }
                self.report("Error creating post", &err);
                None
            }
        }
    }

    pub async fn update_post(&self, id: Uuid, content: &str) -> Option<Post> {
        let author = self.caller(self.source().viewer)?;
        let result = self
            .backend()
            .posts
            .update(author, id, content.trim())
            .await;
        match result {
            Ok(post) => Some(post),
            Err(err) => {
                self.report("Error updating post", &err);
                None
            }
        }
    }

    pub async fn delete_post(&self, id: Uuid) -> bool {
        let Some(author) = self.caller(self.source().viewer) else {
            return false;
        };
        match self.backend().posts.delete(author, id).await {
            Ok(_) => true,
            Err(err) => {
                self.report("Error deleting post", &err);
                false
            }
        }
    }

    /// Public URL of a post's image
    pub fn image_url(&self, post: &Post) -> Option<String> {
        post.image_ref
            .as_deref()
            .map(|key| self.backend().storage.public_url(POST_IMAGES_BUCKET, key))
    }
}
