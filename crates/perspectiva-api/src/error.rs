use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use perspectiva_types::api::ErrorResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Missing or invalid bearer token")]
    Unauthorized,

    #[error("Comment belongs to another user")]
    Forbidden,

    #[error("Comment not found")]
    NotFound,

    #[error("Malformed request: {0}")]
    Malformed(&'static str),

    /// Body that is not JSON or does not fit the request type.
    #[error("Malformed request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),

    #[error("Malformed query: {}", .0.body_text())]
    InvalidQuery(#[from] QueryRejection),

    #[error("reply_of does not reference a comment of this theme")]
    UnknownParent,

    #[error("Internal error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Malformed(_) | ApiError::InvalidBody(_) | ApiError::InvalidQuery(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::UnknownParent => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(e) => {
                error!("Store failure: {:#}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(ErrorResponse { error: self.to_string() })).into_response()
    }
}
