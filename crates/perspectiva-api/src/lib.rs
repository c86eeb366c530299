pub mod auth;
pub mod comments;
pub mod error;

use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::auth::AppState;

/// All API routes. Transport layers (CORS, tracing) are added by the binary.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/comments",
            get(comments::list_comments)
                .post(comments::create_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
