//! Database row types. These map directly to SQLite rows and stay
//! independent of the wire types in perspectiva-types.

use chrono::{DateTime, SecondsFormat, Utc};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentRow {
    pub id: String,
    pub created_at: String,
    pub updated_at: String,
    pub user_email: String,
    pub payload: String,
    pub reply_of: Option<String>,
    pub theme: String,
}

/// Stored timestamp format: RFC 3339, millisecond precision, `Z` suffix.
/// Fixed width, so text ordering matches time ordering.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}
