use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use perspectiva_types::Comment;
use perspectiva_types::api::CreateCommentRequest;
use perspectiva_types::models::{quoted_payload, sort_for_display};

use crate::api::CommentApi;
use crate::cache::CommentCache;
use crate::error::ClientError;
use crate::session::Identity;

pub const DELETE_PROMPT: &str = "Delete comment?";

/// User-visible feedback after a mutation settles.
pub trait Notifier: Send + Sync {
    fn success(&self, message: &str);
    fn error(&self, message: &str);
}

/// Writes notifications to the log. For headless use and tooling.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn success(&self, message: &str) {
        info!("{}", message);
    }

    fn error(&self, message: &str) {
        warn!("{}", message);
    }
}

/// Synchronous yes/no gate in front of destructive actions.
pub trait Confirm {
    fn confirm(&self, prompt: &str) -> bool;
}

impl<F> Confirm for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, prompt: &str) -> bool {
        self(prompt)
    }
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Not signed in")]
    NotSignedIn,

    #[error("Comment is empty")]
    EmptyDraft,

    #[error("Comments have not been loaded yet")]
    NotLoaded,

    #[error("No comment is being edited")]
    NotEditing,

    #[error("Edited comment is unchanged")]
    Unchanged,

    #[error("Comment not found")]
    NotFound,

    #[error("Only the author can change this comment")]
    NotAuthor,

    #[error(transparent)]
    Api(#[from] ClientError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Create,
    Edit,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mutation {
    pub kind: MutationKind,
    pub state: MutationState,
}

/// Which controls a comment offers the current viewer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Affordances {
    pub edit: bool,
    pub delete: bool,
    pub reply: bool,
}

/// One rendered row of the thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub comment: Comment,
    /// Parent payload for replies; "" when the parent is not in the list.
    pub quoted: Option<String>,
    pub edited: bool,
    pub editing: bool,
    pub pending: bool,
    pub affordances: Affordances,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct EditDraft {
    id: String,
    payload: String,
}

/// Payload a failed edit falls back to, shared by overlapping edits of one
/// comment.
#[derive(Debug)]
struct EditBase {
    payload: String,
    in_flight: usize,
}

#[derive(Debug, Default)]
struct UiState {
    viewer: Option<String>,
    draft: String,
    reply_to: Option<String>,
    editing: Option<EditDraft>,
    mutations: HashMap<String, Mutation>,
    edit_bases: HashMap<String, EditBase>,
}

impl UiState {
    fn settle(&mut self, id: &str, kind: MutationKind, state: MutationState) {
        match state {
            MutationState::Confirmed => {
                self.mutations.remove(id);
            }
            _ => {
                self.mutations.insert(id.to_string(), Mutation { kind, state });
            }
        }
    }

    /// `current` becomes the fallback unless an earlier edit of `id` is
    /// still in flight, in which case that edit's fallback is kept.
    fn begin_edit(&mut self, id: &str, current: &str) {
        let base = self
            .edit_bases
            .entry(id.to_string())
            .or_insert_with(|| EditBase {
                payload: current.to_string(),
                in_flight: 0,
            });
        base.in_flight += 1;
        self.settle(id, MutationKind::Edit, MutationState::Pending);
    }

    /// Settle one edit of `id` and return the payload the server is last
    /// known to hold. The mutation stays pending while another edit of the
    /// same comment is outstanding.
    fn finish_edit(&mut self, id: &str, confirmed: Option<&str>) -> Option<String> {
        let base = self.edit_bases.get_mut(id)?;
        if let Some(payload) = confirmed {
            base.payload = payload.to_string();
        }
        base.in_flight = base.in_flight.saturating_sub(1);
        let payload = base.payload.clone();

        if base.in_flight == 0 {
            self.edit_bases.remove(id);
            let state = match confirmed {
                Some(_) => MutationState::Confirmed,
                None => MutationState::Failed,
            };
            self.settle(id, MutationKind::Edit, state);
        }
        Some(payload)
    }
}

/// Drives one theme's comment thread.
///
/// Every mutation writes its expected result into the cache before the
/// request goes out. A confirmed mutation revalidates the theme; a failed one
/// reverts its own optimistic change and reports the error. Methods take
/// `&self` so a page can keep rendering while a request is in flight.
pub struct CommentsController<A> {
    theme: String,
    cache: Arc<CommentCache<A>>,
    identity: Arc<dyn Identity>,
    notifier: Arc<dyn Notifier>,
    ui: Mutex<UiState>,
}

impl<A> CommentsController<A>
where
    A: CommentApi + 'static,
{
    pub fn new(
        theme: impl Into<String>,
        cache: Arc<CommentCache<A>>,
        identity: Arc<dyn Identity>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            theme: theme.into(),
            cache,
            identity,
            notifier,
            ui: Mutex::new(UiState::default()),
        }
    }

    fn ui(&self) -> MutexGuard<'_, UiState> {
        self.ui.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn theme(&self) -> &str {
        &self.theme
    }

    /// Look up the viewer once and load the thread. The email is not
    /// refreshed for the controller's lifetime.
    pub async fn mount(&self) {
        let viewer = self.identity.user_email().await;
        debug!("Mounted comments for '{}' as {:?}", self.theme, viewer);
        self.ui().viewer = viewer;

        if let Err(e) = self.cache.revalidate(&self.theme).await {
            warn!("Initial load of '{}' failed: {}", self.theme, e);
        }
    }

    pub fn viewer(&self) -> Option<String> {
        self.ui().viewer.clone()
    }

    /// The compose form is only offered to signed-in viewers.
    pub fn can_compose(&self) -> bool {
        self.ui().viewer.is_some()
    }

    pub fn load_error(&self) -> Option<String> {
        self.cache.read(&self.theme).error
    }

    fn comments(&self) -> Option<Vec<Comment>> {
        self.cache.read(&self.theme).data
    }

    fn find(&self, id: &str) -> Option<Comment> {
        self.comments()?.into_iter().find(|c| c.id == id)
    }

    fn affordances_for(viewer: Option<&str>, comment: &Comment) -> Affordances {
        let own = viewer.is_some_and(|email| comment.is_authored_by(email));
        Affordances {
            edit: own,
            delete: own,
            reply: own,
        }
    }

    pub fn affordances(&self, id: &str) -> Affordances {
        let viewer = self.viewer();
        self.find(id)
            .map(|c| Self::affordances_for(viewer.as_deref(), &c))
            .unwrap_or_default()
    }

    pub fn mutation(&self, id: &str) -> Option<Mutation> {
        self.ui().mutations.get(id).copied()
    }

    /// Every mutation still pending or left failed, keyed by comment id.
    pub fn mutations(&self) -> Vec<(String, Mutation)> {
        self.ui()
            .mutations
            .iter()
            .map(|(id, m)| (id.clone(), *m))
            .collect()
    }

    /// The thread as it should be rendered: oldest first.
    pub fn view(&self) -> Vec<CommentView> {
        let mut comments = self.comments().unwrap_or_default();
        sort_for_display(&mut comments);

        let ui = self.ui();
        let viewer = ui.viewer.as_deref();
        comments
            .iter()
            .map(|comment| CommentView {
                quoted: comment
                    .parent()
                    .map(|parent| quoted_payload(&comments, parent).to_string()),
                edited: comment.is_edited(),
                editing: ui.editing.as_ref().is_some_and(|e| e.id == comment.id),
                pending: ui
                    .mutations
                    .get(&comment.id)
                    .is_some_and(|m| m.state == MutationState::Pending),
                affordances: Self::affordances_for(viewer, comment),
                comment: comment.clone(),
            })
            .collect()
    }

    // -- Compose --

    pub fn set_draft(&self, text: impl Into<String>) {
        self.ui().draft = text.into();
    }

    pub fn draft(&self) -> String {
        self.ui().draft.clone()
    }

    // -- Reply --

    pub fn start_reply(&self, id: &str) -> Result<(), ControllerError> {
        self.require_own(id)?;
        self.ui().reply_to = Some(id.to_string());
        Ok(())
    }

    pub fn cancel_reply(&self) {
        self.ui().reply_to = None;
    }

    pub fn reply_target(&self) -> Option<String> {
        self.ui().reply_to.clone()
    }

    /// Payload quoted above the compose box while replying.
    pub fn reply_quote(&self) -> Option<String> {
        let target = self.reply_target()?;
        let comments = self.comments().unwrap_or_default();
        Some(quoted_payload(&comments, &target).to_string())
    }

    /// Post the draft, as a reply when a target is set.
    pub async fn submit(&self) -> Result<Comment, ControllerError> {
        let (email, payload, reply_of) = {
            let ui = self.ui();
            let email = ui.viewer.clone().ok_or(ControllerError::NotSignedIn)?;
            if ui.draft.trim().is_empty() {
                return Err(ControllerError::EmptyDraft);
            }
            (email, ui.draft.clone(), ui.reply_to.clone())
        };
        if self.comments().is_none() {
            return Err(ControllerError::NotLoaded);
        }

        let request = CreateCommentRequest {
            user_email: email.clone(),
            payload: payload.clone(),
            reply_of: reply_of.clone(),
            theme: Some(self.theme.clone()),
        };

        let local_id = format!("local-{}", Uuid::new_v4());
        let now = Utc::now();
        let optimistic = Comment {
            id: local_id.clone(),
            created_at: now,
            updated_at: now,
            user_email: email,
            payload,
            reply_of,
            theme: self.theme.clone(),
        };
        self.cache
            .optimistic_update(&self.theme, |list| list.push(optimistic));
        self.ui()
            .settle(&local_id, MutationKind::Create, MutationState::Pending);

        match self.cache.api().create(&self.theme, &request).await {
            Ok(created) => {
                let confirmed = created.clone();
                self.cache.optimistic_update(&self.theme, |list| {
                    list.retain(|c| c.id != local_id && c.id != confirmed.id);
                    list.push(confirmed);
                });
                {
                    let mut ui = self.ui();
                    ui.settle(&local_id, MutationKind::Create, MutationState::Confirmed);
                    ui.draft.clear();
                    ui.reply_to = None;
                }
                self.notifier.success("Comment added");
                self.reconcile().await;
                Ok(created)
            }
            Err(e) => {
                // The placeholder id dies with the rollback, so nothing is
                // left to track under it.
                self.cache
                    .optimistic_update(&self.theme, |list| list.retain(|c| c.id != local_id));
                self.ui().mutations.remove(&local_id);
                self.notifier.error(&format!("Could not add comment: {e}"));
                Err(e.into())
            }
        }
    }

    // -- Edit --

    pub fn start_edit(&self, id: &str) -> Result<(), ControllerError> {
        let comment = self.require_own(id)?;
        self.ui().editing = Some(EditDraft {
            id: comment.id,
            payload: comment.payload,
        });
        Ok(())
    }

    pub fn set_edit_draft(&self, text: impl Into<String>) {
        if let Some(editing) = self.ui().editing.as_mut() {
            editing.payload = text.into();
        }
    }

    pub fn cancel_edit(&self) {
        self.ui().editing = None;
    }

    /// Id and draft payload of the comment being edited.
    pub fn editing(&self) -> Option<(String, String)> {
        self.ui()
            .editing
            .as_ref()
            .map(|e| (e.id.clone(), e.payload.clone()))
    }

    /// Confirm is disabled while the draft matches the displayed payload.
    pub fn can_confirm_edit(&self) -> bool {
        let Some((id, draft)) = self.editing() else {
            return false;
        };
        self.find(&id).is_some_and(|c| c.payload != draft)
    }

    pub async fn confirm_edit(&self) -> Result<Comment, ControllerError> {
        let (id, draft) = self.editing().ok_or(ControllerError::NotEditing)?;
        let original = self.find(&id).ok_or(ControllerError::NotFound)?;
        if original.payload == draft {
            return Err(ControllerError::Unchanged);
        }
        if draft.trim().is_empty() {
            return Err(ControllerError::EmptyDraft);
        }

        self.cache.optimistic_update(&self.theme, |list| {
            if let Some(c) = list.iter_mut().find(|c| c.id == id) {
                c.payload = draft.clone();
            }
        });
        self.ui().begin_edit(&id, &original.payload);

        match self.cache.api().update(&self.theme, &id, &draft).await {
            Ok(updated) => {
                let confirmed = updated.clone();
                self.cache.optimistic_update(&self.theme, |list| {
                    if let Some(c) = list.iter_mut().find(|c| c.id == confirmed.id) {
                        *c = confirmed;
                    }
                });
                {
                    let mut ui = self.ui();
                    ui.finish_edit(&id, Some(&updated.payload));
                    if ui.editing.as_ref().is_some_and(|e| e.id == id) {
                        ui.editing = None;
                    }
                }
                self.notifier.success("Comment updated");
                self.reconcile().await;
                Ok(updated)
            }
            Err(e) => {
                let fallback = self
                    .ui()
                    .finish_edit(&id, None)
                    .unwrap_or(original.payload);
                // Only undo our own write; a later edit may already have replaced it.
                self.cache.optimistic_update(&self.theme, |list| {
                    if let Some(c) = list.iter_mut().find(|c| c.id == id && c.payload == draft) {
                        c.payload = fallback;
                    }
                });
                self.notifier.error(&format!("Could not update comment: {e}"));
                Err(e.into())
            }
        }
    }

    // -- Delete --

    /// Delete after `confirm` agrees. Returns `Ok(false)` when declined, in
    /// which case nothing was changed or sent.
    pub async fn delete(&self, id: &str, confirm: &dyn Confirm) -> Result<bool, ControllerError> {
        self.require_own(id)?;
        if !confirm.confirm(DELETE_PROMPT) {
            debug!("Delete of {} declined", id);
            return Ok(false);
        }

        let mut removed = None;
        self.cache.optimistic_update(&self.theme, |list| {
            if let Some(idx) = list.iter().position(|c| c.id == id) {
                removed = Some((idx, list.remove(idx)));
            }
        });
        self.ui().settle(id, MutationKind::Delete, MutationState::Pending);

        match self.cache.api().delete(&self.theme, id).await {
            Ok(()) => {
                {
                    let mut ui = self.ui();
                    ui.settle(id, MutationKind::Delete, MutationState::Confirmed);
                    if ui.reply_to.as_deref() == Some(id) {
                        ui.reply_to = None;
                    }
                    if ui.editing.as_ref().is_some_and(|e| e.id == id) {
                        ui.editing = None;
                    }
                }
                self.notifier.success("Comment removed");
                self.reconcile().await;
                Ok(true)
            }
            Err(e) => {
                if let Some((idx, comment)) = removed {
                    self.cache.optimistic_update(&self.theme, |list| {
                        if !list.iter().any(|c| c.id == comment.id) {
                            list.insert(idx.min(list.len()), comment);
                        }
                    });
                }
                self.ui().settle(id, MutationKind::Delete, MutationState::Failed);
                self.notifier.error(&format!("Could not remove comment: {e}"));
                Err(e.into())
            }
        }
    }

    fn require_own(&self, id: &str) -> Result<Comment, ControllerError> {
        let viewer = self.viewer().ok_or(ControllerError::NotSignedIn)?;
        let comment = self.find(id).ok_or(ControllerError::NotFound)?;
        if !comment.is_authored_by(&viewer) {
            return Err(ControllerError::NotAuthor);
        }
        Ok(comment)
    }

    /// Replace local state with the server's list after a confirmed write.
    async fn reconcile(&self) {
        if let Err(e) = self.cache.revalidate(&self.theme).await {
            warn!("Revalidation of '{}' after mutation failed: {}", self.theme, e);
        }
    }
}
