//! In-memory `CommentApi` for cache and controller tests.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::Notify;

use perspectiva_types::Comment;
use perspectiva_types::api::CreateCommentRequest;

use crate::api::CommentApi;
use crate::error::ClientError;

pub(crate) const ANA: &str = "ana@example.com";
pub(crate) const BEA: &str = "bea@example.com";

pub(crate) fn comment(id: &str, theme: &str, secs: i64) -> Comment {
    comment_by(id, theme, secs, ANA)
}

pub(crate) fn comment_by(id: &str, theme: &str, secs: i64, email: &str) -> Comment {
    let at = Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap();
    Comment {
        id: id.into(),
        created_at: at,
        updated_at: at,
        user_email: email.into(),
        payload: format!("payload {id}"),
        reply_of: None,
        theme: theme.into(),
    }
}

#[derive(Default)]
struct FakeState {
    comments: Vec<Comment>,
    fail_next: Option<ClientError>,
    reverse_lists: bool,
    seq: u64,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
    list_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
    held: AtomicBool,
    entered: Notify,
    released: Notify,
}

impl FakeApi {
    pub(crate) fn with_comments(comments: Vec<Comment>) -> Self {
        let api = Self::default();
        api.state.lock().unwrap().comments = comments;
        api
    }

    pub(crate) fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// The next call fails with `err` instead of touching the store.
    pub(crate) fn fail_next(&self, err: ClientError) {
        self.state.lock().unwrap().fail_next = Some(err);
    }

    /// Serve lists newest first, like a server that ignores ordering.
    pub(crate) fn reverse_lists(&self) {
        self.state.lock().unwrap().reverse_lists = true;
    }

    pub(crate) fn stored(&self) -> Vec<Comment> {
        self.state.lock().unwrap().comments.clone()
    }

    /// While held, each call parks after announcing itself until `release`.
    pub(crate) fn hold(&self, held: bool) {
        self.held.store(held, Ordering::SeqCst);
    }

    pub(crate) async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.released.notify_one();
    }

    async fn gate(&self) -> Result<(), ClientError> {
        if self.held.load(Ordering::SeqCst) {
            self.entered.notify_one();
            self.released.notified().await;
        }
        match self.state.lock().unwrap().fail_next.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn not_found() -> ClientError {
    ClientError::Rejected {
        status: 404,
        message: "Comment not found".into(),
    }
}

#[async_trait]
impl CommentApi for FakeApi {
    async fn list(&self, theme: &str) -> Result<Vec<Comment>, ClientError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let state = self.state.lock().unwrap();
        let mut list: Vec<Comment> = state.comments.iter().filter(|c| c.theme == theme).cloned().collect();
        if state.reverse_lists {
            list.reverse();
        }
        Ok(list)
    }

    async fn create(&self, theme: &str, req: &CreateCommentRequest) -> Result<Comment, ClientError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let mut state = self.state.lock().unwrap();
        if let Some(parent) = req.reply_of.as_deref() {
            if !state.comments.iter().any(|c| c.id == parent && c.theme == theme) {
                return Err(ClientError::Rejected {
                    status: 422,
                    message: "unknown reply_of".into(),
                });
            }
        }
        state.seq += 1;
        let now = Utc::now();
        let created = Comment {
            id: format!("srv-{}", state.seq),
            created_at: now,
            updated_at: now,
            user_email: req.user_email.clone(),
            payload: req.payload.clone(),
            reply_of: req.reply_of.clone(),
            theme: theme.to_string(),
        };
        state.comments.push(created.clone());
        Ok(created)
    }

    async fn update(&self, theme: &str, comment_id: &str, payload: &str) -> Result<Comment, ClientError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let mut state = self.state.lock().unwrap();
        let comment = state
            .comments
            .iter_mut()
            .find(|c| c.id == comment_id && c.theme == theme)
            .ok_or_else(not_found)?;
        comment.payload = payload.to_string();
        comment.updated_at = Utc::now().max(comment.created_at + chrono::Duration::milliseconds(1));
        Ok(comment.clone())
    }

    async fn delete(&self, theme: &str, comment_id: &str) -> Result<(), ClientError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.gate().await?;

        let mut state = self.state.lock().unwrap();
        let before = state.comments.len();
        state.comments.retain(|c| !(c.id == comment_id && c.theme == theme));
        if state.comments.len() == before {
            return Err(not_found());
        }
        Ok(())
    }
}
