use anyhow::anyhow;
use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use perspectiva_db::models::{CommentRow, format_timestamp};
use perspectiva_db::queries::InsertOutcome;
use perspectiva_types::Comment;
use perspectiva_types::api::{CreateCommentRequest, DeleteCommentResponse, UpdateCommentRequest};

use crate::auth::{AppState, extract_claims};
use crate::error::ApiError;

pub const MAX_PAYLOAD_CHARS: usize = 2000;
pub const MAX_THEME_CHARS: usize = 128;

#[derive(Debug, Deserialize)]
pub struct CommentQuery {
    pub theme: Option<String>,
    pub comment_id: Option<String>,
}

impl CommentQuery {
    /// Themes are matched exactly, so padding is refused rather than
    /// silently stripped.
    fn theme(&self) -> Result<String, ApiError> {
        let theme = self.theme.as_deref().unwrap_or("");
        if theme.trim().is_empty() {
            return Err(ApiError::Malformed("theme is required"));
        }
        if theme.trim() != theme {
            return Err(ApiError::Malformed("theme has surrounding whitespace"));
        }
        if theme.chars().count() > MAX_THEME_CHARS {
            return Err(ApiError::Malformed("theme is too long"));
        }
        Ok(theme.to_string())
    }
}

fn validate_payload(payload: &str) -> Result<(), ApiError> {
    if payload.trim().is_empty() {
        return Err(ApiError::Malformed("payload is empty"));
    }
    if payload.chars().count() > MAX_PAYLOAD_CHARS {
        return Err(ApiError::Malformed("payload is too long"));
    }
    Ok(())
}

/// Run a blocking store call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow!("blocking task failed"))
    })?
}

fn parse_timestamp(raw: &str, field: &str, id: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt {} '{}' on comment '{}': {}", field, raw, id, e);
            DateTime::default()
        })
}

fn to_comment(row: CommentRow) -> Comment {
    Comment {
        created_at: parse_timestamp(&row.created_at, "created_at", &row.id),
        updated_at: parse_timestamp(&row.updated_at, "updated_at", &row.id),
        id: row.id,
        user_email: row.user_email,
        payload: row.payload,
        reply_of: row.reply_of,
        theme: row.theme,
    }
}

/// An edit always lands strictly after creation, even within the same
/// millisecond, so `updated_at != created_at` marks edited comments.
fn edit_timestamp(created_at: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(created_at + chrono::Duration::milliseconds(1))
}

/// Load a comment the caller is about to mutate, checking authorship.
fn load_owned(
    state: &AppState,
    id: &str,
    theme: &str,
    email: &str,
) -> Result<CommentRow, ApiError> {
    let row = state.db.get_comment(id, theme)?.ok_or(ApiError::NotFound)?;
    if row.user_email != email {
        return Err(ApiError::Forbidden);
    }
    Ok(row)
}

/// GET /api/comments?theme=<t>
pub async fn list_comments(
    State(state): State<AppState>,
    query: Result<Query<CommentQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let theme = query.theme()?;

    let rows = blocking(move || Ok(state.db.list_comments(&theme)?)).await?;
    let comments: Vec<Comment> = rows.into_iter().map(to_comment).collect();

    Ok(Json(comments))
}

/// POST /api/comments?theme=<t>
///
/// Responds with a one-element array holding the stored comment.
pub async fn create_comment(
    State(state): State<AppState>,
    query: Result<Query<CommentQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;
    let Query(query) = query?;
    let theme = query.theme()?;
    let Json(req) = body?;

    if req.user_email != claims.sub {
        return Err(ApiError::Forbidden);
    }
    validate_payload(&req.payload)?;
    if let Some(body_theme) = req.theme.as_deref() {
        if body_theme != theme {
            warn!("Body theme '{}' differs from query theme '{}'", body_theme, theme);
        }
    }

    let now = format_timestamp(Utc::now());
    let row = CommentRow {
        id: Uuid::new_v4().to_string(),
        created_at: now.clone(),
        updated_at: now,
        user_email: req.user_email,
        payload: req.payload,
        reply_of: req.reply_of.filter(|id| !id.is_empty()),
        theme,
    };

    let stored = row.clone();
    let outcome = blocking(move || Ok(state.db.insert_comment(&stored)?)).await?;
    if outcome == InsertOutcome::UnknownParent {
        return Err(ApiError::UnknownParent);
    }

    info!("Comment {} created on theme '{}' by {}", row.id, row.theme, claims.sub);

    Ok((StatusCode::CREATED, Json(vec![to_comment(row)])))
}

/// PATCH /api/comments?theme=<t>
pub async fn update_comment(
    State(state): State<AppState>,
    query: Result<Query<CommentQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Result<Json<UpdateCommentRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;
    let Query(query) = query?;
    let theme = query.theme()?;
    let Json(req) = body?;
    validate_payload(&req.payload)?;

    let email = claims.sub;
    let updated = blocking(move || {
        let current = load_owned(&state, &req.comment_id, &theme, &email)?;
        let created_at = parse_timestamp(&current.created_at, "created_at", &current.id);
        let updated_at = format_timestamp(edit_timestamp(created_at));

        state
            .db
            .update_comment_payload(&req.comment_id, &theme, &req.payload, &updated_at)?
            .ok_or(ApiError::NotFound)
    })
    .await?;

    info!("Comment {} edited", updated.id);

    Ok(Json(vec![to_comment(updated)]))
}

/// DELETE /api/comments?theme=<t>&comment_id=<id>
pub async fn delete_comment(
    State(state): State<AppState>,
    query: Result<Query<CommentQuery>, QueryRejection>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    let claims = extract_claims(&headers, &state.jwt_secret)?;
    let Query(query) = query?;
    let theme = query.theme()?;
    let comment_id = query
        .comment_id
        .filter(|id| !id.is_empty())
        .ok_or(ApiError::Malformed("comment_id is required"))?;

    let email = claims.sub;
    let id = comment_id.clone();
    blocking(move || {
        load_owned(&state, &id, &theme, &email)?;
        if !state.db.delete_comment(&id, &theme)? {
            return Err(ApiError::NotFound);
        }
        Ok(())
    })
    .await?;

    info!("Comment {} deleted", comment_id);

    Ok(Json(DeleteCommentResponse {
        message: "Comment deleted".to_string(),
    }))
}
