//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the rows of one table, plus the joined reads
//! its views need.

pub mod account;
pub mod comment;
pub mod follow;
pub mod like;
pub mod message;
pub mod post;
pub mod profile;
pub mod session;

pub use account::{AccountRepository, SqlxAccountRepository};
pub use comment::{CommentRepository, SqlxCommentRepository};
pub use follow::{FollowRepository, SqlxFollowRepository};
pub use like::{LikeRepository, SqlxLikeRepository};
pub use message::{MessageRepository, SqlxMessageRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use profile::{ProfileRepository, SqlxProfileRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
