//! Data models
//!
//! This module contains the data structures shared by the platform and the
//! client:
//! - Stored entities (Account, Profile, Session, Post, Like, Comment, Message, Follow)
//! - Joined view records (FeedPost, CommentWithAuthor, MessageWithSender, Notification)
//! - Mutation inputs

mod comment;
mod follow;
mod message;
mod notification;
mod post;
mod profile;
mod session;

pub use comment::{Comment, CommentWithAuthor, CreateCommentInput, Like, LikeState};
pub use follow::{Follow, FollowStats};
pub use message::{Message, MessageWithSender};
pub use notification::{excerpt, Notification, NotificationKind, EXCERPT_CHARS};
pub use post::{CreatePostInput, FeedCursor, FeedPost, Post};
pub use profile::{Account, Profile, ProfileOverview, ProfileSummary, UpdateProfileInput};
pub use session::Session;
