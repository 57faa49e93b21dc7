//! Optimistic status change and delete for a single task card.
//!
//! An [`OptimisticItem`] owns one task's view state independently of the
//! shared cache. Running a mutation snapshots the view, applies the change
//! locally, then awaits the remote call: on success the server's record is
//! reconciled (server wins), on failure the snapshot is restored exactly.
//! One mutation may be in flight per item; a second is rejected with
//! [`OptimisticError::Busy`] before its remote call is ever polled.
//!
//! If the mutation future is dropped before the remote call settles, the
//! snapshot is restored and the item is idle again.
//!
//! Outcomes are reported to the owning collection as [`ItemEvent`]s, which
//! can be folded into a [`TaskCache`] with [`ItemEvent::apply_to`]. The
//! owner channel is unbounded so no outcome is ever dropped.

use std::fmt;
use std::future::Future;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use taskdesk_proto::envelope::StatusEcho;
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::task::{Task, TaskStatus};

use crate::api::{ApiError, ErrorKind, TaskApi};
use crate::cache::TaskCache;

/// Which optimistic operation is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationKind {
    StatusChange,
    Delete,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StatusChange => write!(f, "status change"),
            Self::Delete => write!(f, "delete"),
        }
    }
}

/// What the card renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemView {
    /// The task as currently shown.
    pub task: Task,
    /// Hidden by an optimistic delete.
    pub hidden: bool,
    /// The operation in flight, if any.
    pub pending: Option<MutationKind>,
}

impl ItemView {
    #[must_use]
    pub const fn new(task: Task) -> Self {
        Self {
            task,
            hidden: false,
            pending: None,
        }
    }

    #[must_use]
    pub const fn is_visible(&self) -> bool {
        !self.hidden
    }

    /// Whether the transient "deleting" indicator should show.
    #[must_use]
    pub fn is_deleting(&self) -> bool {
        self.hidden && self.pending == Some(MutationKind::Delete)
    }

    #[must_use]
    pub const fn is_busy(&self) -> bool {
        self.pending.is_some()
    }
}

/// A change that can be shown before the server confirms it.
pub trait OptimisticMutation {
    /// What the server returns on success.
    type Confirmed;

    fn kind(&self) -> MutationKind;

    /// Applies the change to the local view.
    fn apply(&self, view: &mut ItemView);

    /// Folds the server's confirmation into the view.
    fn reconcile(&self, view: &mut ItemView, confirmed: Self::Confirmed);

    /// Event telling the owner the change is confirmed.
    fn confirmed_event(&self, view: &ItemView) -> ItemEvent;
}

/// Sets the task's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange(pub TaskStatus);

impl OptimisticMutation for StatusChange {
    type Confirmed = StatusEcho;

    fn kind(&self) -> MutationKind {
        MutationKind::StatusChange
    }

    fn apply(&self, view: &mut ItemView) {
        view.task.status = self.0.clone();
    }

    fn reconcile(&self, view: &mut ItemView, confirmed: StatusEcho) {
        match confirmed {
            StatusEcho::Record(task) if task.id == view.task.id => view.task = task,
            StatusEcho::Fields {
                id,
                status,
                updated_at,
            } if id == view.task.id => {
                view.task.status = status;
                if updated_at.is_some() {
                    view.task.updated_at = updated_at;
                }
            }
            StatusEcho::Record(Task { id, .. }) | StatusEcho::Fields { id, .. } => {
                tracing::warn!(task_id = %view.task.id, returned = %id, "status change echoed another task");
            }
            StatusEcho::Empty => {}
        }
    }

    fn confirmed_event(&self, view: &ItemView) -> ItemEvent {
        ItemEvent::Updated(view.task.clone())
    }
}

/// Removes the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delete;

impl OptimisticMutation for Delete {
    type Confirmed = ();

    fn kind(&self) -> MutationKind {
        MutationKind::Delete
    }

    fn apply(&self, view: &mut ItemView) {
        view.hidden = true;
    }

    fn reconcile(&self, _view: &mut ItemView, (): ()) {}

    fn confirmed_event(&self, view: &ItemView) -> ItemEvent {
        ItemEvent::Removed(view.task.id.clone())
    }
}

/// Outcome notifications for the collection owning the item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemEvent {
    /// The delete was confirmed.
    Removed(TaskId),
    /// A change was confirmed; this is the reconciled task.
    Updated(Task),
    /// The change failed and the item was restored.
    RolledBack {
        id: TaskId,
        kind: MutationKind,
        error: ApiError,
    },
}

impl ItemEvent {
    /// Reconciles the confirmed change into the shared cache. Rollbacks
    /// change nothing there.
    pub fn apply_to<A: TaskApi>(&self, cache: &TaskCache<A>) {
        match self {
            Self::Removed(id) => {
                cache.forget(id);
            }
            Self::Updated(task) => {
                cache.absorb(task);
            }
            Self::RolledBack { .. } => {}
        }
    }
}

/// Errors returned by optimistic operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OptimisticError {
    /// Another change to this item has not settled yet.
    #[error("task {0} already has a change in flight")]
    Busy(TaskId),

    /// The remote call failed; the item shows its previous state again.
    #[error("{kind} of task {id} failed and was rolled back: {source}")]
    RolledBack {
        id: TaskId,
        kind: MutationKind,
        #[source]
        source: ApiError,
    },
}

impl OptimisticError {
    /// Short, human-readable description for a notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Busy(_) => "Please wait for the previous change to finish.".to_string(),
            Self::RolledBack { source, .. } => source.user_message(),
        }
    }
}

#[derive(Debug)]
struct ItemState {
    view: ItemView,
    /// Present exactly while a mutation is in flight.
    snapshot: Option<ItemView>,
}

/// Optimistic controller for one task card.
#[derive(Debug)]
pub struct OptimisticItem {
    state: Mutex<ItemState>,
    owner: Option<mpsc::UnboundedSender<ItemEvent>>,
}

impl OptimisticItem {
    pub fn new(task: Task) -> Self {
        Self {
            state: Mutex::new(ItemState {
                view: ItemView::new(task),
                snapshot: None,
            }),
            owner: None,
        }
    }

    /// Reports outcomes on `owner`.
    #[must_use]
    pub fn with_owner(mut self, owner: mpsc::UnboundedSender<ItemEvent>) -> Self {
        self.owner = Some(owner);
        self
    }

    /// Current view of the item.
    pub fn view(&self) -> ItemView {
        self.state.lock().view.clone()
    }

    pub fn id(&self) -> TaskId {
        self.state.lock().view.task.id.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    /// Replaces the task with a fresher copy, e.g. after a list refetch.
    /// Ignored while a mutation is in flight. Returns whether it was applied.
    pub fn refresh(&self, task: Task) -> bool {
        let mut state = self.state.lock();
        if state.snapshot.is_some() {
            return false;
        }
        state.view.task = task;
        true
    }

    /// Changes the status through `api`.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn change_status<A: TaskApi>(
        &self,
        api: &A,
        status: TaskStatus,
    ) -> Result<ItemView, OptimisticError> {
        let id = self.id();
        let remote = api.change_task_status(&id, &status);
        self.run(StatusChange(status.clone()), remote).await
    }

    /// Deletes the task through `api`. A task the server no longer holds
    /// counts as deleted.
    ///
    /// # Errors
    ///
    /// See [`run`](Self::run).
    pub async fn delete<A: TaskApi>(&self, api: &A) -> Result<ItemView, OptimisticError> {
        let id = self.id();
        let remote = async {
            match api.delete_task(&id).await {
                Err(e) if e.kind == ErrorKind::NotFound => {
                    tracing::debug!(task_id = %id, "task already gone on server, treating delete as done");
                    Ok(())
                }
                other => other,
            }
        };
        self.run(Delete, remote).await
    }

    /// Applies `mutation` locally, awaits `remote`, then reconciles or rolls
    /// back. Returns the settled view.
    ///
    /// # Errors
    ///
    /// Returns [`OptimisticError::Busy`] without polling `remote` if another
    /// mutation is in flight, or [`OptimisticError::RolledBack`] if `remote`
    /// fails.
    pub async fn run<M: OptimisticMutation>(
        &self,
        mutation: M,
        remote: impl Future<Output = Result<M::Confirmed, ApiError>>,
    ) -> Result<ItemView, OptimisticError> {
        let kind = mutation.kind();
        {
            let mut state = self.state.lock();
            if state.snapshot.is_some() {
                return Err(OptimisticError::Busy(state.view.task.id.clone()));
            }
            state.snapshot = Some(state.view.clone());
            mutation.apply(&mut state.view);
            state.view.pending = Some(kind);
        }

        let mut guard = RestoreOnDrop {
            state: &self.state,
            armed: true,
        };
        let result = remote.await;
        guard.armed = false;

        let (event, outcome) = {
            let mut state = self.state.lock();
            let snapshot = state.snapshot.take();
            match result {
                Ok(confirmed) => {
                    mutation.reconcile(&mut state.view, confirmed);
                    state.view.pending = None;
                    let event = mutation.confirmed_event(&state.view);
                    (event, Ok(state.view.clone()))
                }
                Err(error) => {
                    if let Some(snapshot) = snapshot {
                        state.view = snapshot;
                    }
                    let id = state.view.task.id.clone();
                    tracing::warn!(task_id = %id, %kind, error = %error, "optimistic change rolled back");
                    let event = ItemEvent::RolledBack {
                        id: id.clone(),
                        kind,
                        error: error.clone(),
                    };
                    (event, Err(OptimisticError::RolledBack { id, kind, source: error }))
                }
            }
        };

        if let Some(owner) = &self.owner {
            if owner.send(event).is_err() {
                tracing::debug!(%kind, "item owner is gone, outcome not delivered");
            }
        }
        outcome
    }
}

/// Restores the snapshot if a mutation is abandoned before it settles.
struct RestoreOnDrop<'a> {
    state: &'a Mutex<ItemState>,
    armed: bool,
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut state = self.state.lock();
        if let Some(snapshot) = state.snapshot.take() {
            tracing::debug!(task_id = %snapshot.task.id, "optimistic change abandoned, restoring");
            state.view = snapshot;
        }
    }
}
