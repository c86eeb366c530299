//! Client side of the perspectiva comment threads.
//!
//! - [`api`]: talks to `/api/comments` over HTTP.
//! - [`cache`]: per-theme comment lists with optimistic writes and
//!   coalesced revalidation.
//! - [`controller`]: the compose / reply / edit / delete state machine a
//!   page drives.
//! - [`session`]: the identity collaborator.

pub mod api;
pub mod cache;
pub mod controller;
pub mod error;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{CommentApi, HttpCommentApi};
pub use cache::{CacheEntry, CommentCache};
pub use controller::{CommentView, CommentsController, Confirm, Notifier};
pub use error::ClientError;
pub use session::{Identity, Session};
