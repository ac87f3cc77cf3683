//! Comments of one post, newest first

use async_trait::async_trait;
use std::cmp::Ordering;
use std::sync::Arc;
use uuid::Uuid;

use super::{remove_by_key, upsert_sorted, Keyed, Patch, SyncSource, SyncUnit};
use crate::models::{Comment, CommentWithAuthor, CreateCommentInput};
use crate::realtime::{ChangeEvent, ChangeFilter, ChangeKind, Collection, Predicate};
use crate::services::{Backend, ServiceError};
use crate::toast::Toast;

pub type CommentsUnit = SyncUnit<CommentsSource>;

impl Keyed for CommentWithAuthor {
    fn key(&self) -> Uuid {
        self.comment.id
    }
}

fn newest_first(a: &CommentWithAuthor, b: &CommentWithAuthor) -> Ordering {
    b.comment
        .created_at
        .cmp(&a.comment.created_at)
        .then_with(|| b.comment.id.cmp(&a.comment.id))
}

pub struct CommentsSource {
    backend: Arc<Backend>,
    post_id: Uuid,
    viewer: Uuid,
}

impl CommentsSource {
    pub fn new(backend: Arc<Backend>, post_id: Uuid, viewer: Uuid) -> Self {
        Self {
            backend,
            post_id,
            viewer,
        }
    }
}

#[async_trait]
impl SyncSource for CommentsSource {
    type Snapshot = Vec<CommentWithAuthor>;

    fn label(&self) -> &'static str {
        "comments"
    }

    fn channel_name(&self) -> String {
        format!("comments:{}", self.post_id)
    }

    fn filters(&self) -> Vec<ChangeFilter> {
        vec![ChangeFilter::new(
            Collection::Comments,
            Predicate::eq_id("post_id", self.post_id),
        )]
    }

    async fn fetch(
        &self,
        _current: &Vec<CommentWithAuthor>,
    ) -> Result<Vec<CommentWithAuthor>, ServiceError> {
        self.backend.comments.list_for_post(self.post_id).await
    }

    async fn patch(
        &self,
        snapshot: &Vec<CommentWithAuthor>,
        event: &ChangeEvent,
    ) -> Result<Patch<Vec<CommentWithAuthor>>, ServiceError> {
        let Some(id) = event.record_id() else {
            return Ok(Patch::Reload);
        };

        let mut next = snapshot.clone();
        match event.kind {
            ChangeKind::Insert | ChangeKind::Update => {
                match self.backend.comments.get(id).await? {
                    Some(comment) => upsert_sorted(&mut next, comment, newest_first),
                    None => {
                        remove_by_key(&mut next, id);
                    }
                }
            }
            ChangeKind::Delete => {
                if !remove_by_key(&mut next, id) {
                    return Ok(Patch::Unchanged);
                }
            }
        }
        Ok(Patch::Replace(next))
    }

    fn load_failed(&self, _err: &ServiceError) -> Toast {
        Toast::destructive("Error").with_description("Failed to fetch comments")
    }
}

impl SyncUnit<CommentsSource> {
    /// Comment as the viewer; blank text makes no remote call
    pub async fn submit(&self, text: &str) -> Option<Comment> {
        let content = text.trim();
        if content.is_empty() {
            return None;
        }

        let source = self.source();
        let author = self.caller(source.viewer)?;
        let input = CreateCommentInput {
            post_id: source.post_id,
            content: content.to_string(),
        };
        match self.backend().comments.create(author, input).await {
            Ok(comment) => Some(comment),
            Err(_) => {
                self.toaster()
                    .push(Toast::destructive("Error").with_description("Failed to post comment"));
                None
            }
        }
    }

    /// Delete one of the viewer's comments
    pub async fn delete(&self, id: Uuid) -> bool {
        let Some(author) = self.caller(self.source().viewer) else {
            return false;
        };
        match self.backend().comments.delete(author, id).await {
            Ok(_) => true,
            Err(err) => {
                self.report("Error deleting comment", &err);
                false
            }
        }
    }
}
