use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A comment posted on a perspectiva content page.
///
/// `reply_of` is a single parent pointer: replies quote their parent's
/// payload inline, they do not form a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_email: String,
    pub payload: String,
    #[serde(default)]
    pub reply_of: Option<String>,
    pub theme: String,
}

impl Comment {
    pub fn parent(&self) -> Option<&str> {
        self.reply_of.as_deref()
    }

    /// True once the payload has been changed after creation.
    pub fn is_edited(&self) -> bool {
        self.updated_at != self.created_at
    }

    pub fn is_authored_by(&self, email: &str) -> bool {
        self.user_email == email
    }
}

/// Sorts comments for display: oldest first. Stable, so comments sharing a
/// timestamp keep the order they arrived in.
pub fn sort_for_display(comments: &mut [Comment]) {
    comments.sort_by(|a, b| a.created_at.cmp(&b.created_at));
}

/// Payload of the comment `reply_of` points at, or "" when it is not in `comments`.
pub fn quoted_payload<'a>(comments: &'a [Comment], reply_of: &str) -> &'a str {
    comments
        .iter()
        .find(|c| c.id == reply_of)
        .map(|c| c.payload.as_str())
        .unwrap_or("")
}
