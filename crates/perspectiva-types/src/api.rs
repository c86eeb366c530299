use serde::{Deserialize, Serialize};

// -- JWT Claims --

/// Claims of the bearer token issued by the identity provider. The API and
/// the client agree on this shape; `sub` carries the session email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: usize,
}

// -- Comments --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateCommentRequest {
    pub user_email: String,
    pub payload: String,
    #[serde(default)]
    pub reply_of: Option<String>,
    /// Redundant with the `theme` query parameter, which wins.
    #[serde(default)]
    pub theme: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateCommentRequest {
    pub payload: String,
    #[serde(rename = "commentId")]
    pub comment_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteCommentResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}
