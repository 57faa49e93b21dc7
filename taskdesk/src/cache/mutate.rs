//! Write side of [`TaskCache`]: pessimistic mutations and local reconciliation.
//!
//! A mutation changes nothing until the API confirms it. On success the
//! confirmed entity is fanned out to every list holding it; on failure only
//! the operation's error slot is written.

use taskdesk_proto::identity::TaskId;
use taskdesk_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus};

use super::{CacheError, Operation, TaskCache};
use crate::api::{ApiError, ErrorKind, TaskApi};

impl<A: TaskApi> TaskCache<A> {
    /// Creates a task and puts it at the head of `allTasks` and
    /// `delegatedTasks`. `myTasks` is left alone.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::InvalidDraft`] without calling the API if the
    /// draft has no title, or [`CacheError::Api`] if the request fails. Both
    /// are stored under `create`.
    pub async fn create(&self, draft: &TaskDraft) -> Result<Task, CacheError> {
        if let Err(e) = draft.validate() {
            let err = CacheError::InvalidDraft(e);
            self.update(|state, events| state.fail_op(Operation::Create, err.clone(), events));
            return Err(err);
        }
        self.update(|state, events| state.begin_op(Operation::Create, events));

        match self.api.create_task(draft).await {
            Ok(task) => {
                tracing::debug!(task_id = %task.id, "task created");
                self.update(|state, events| {
                    state.insert_created(&task, events);
                    state.finish_op(Operation::Create, events);
                });
                Ok(task)
            }
            Err(e) => Err(self.record_failure(Operation::Create, e)),
        }
    }

    /// Edits a task and replaces every cached copy with the server's record.
    ///
    /// The record is kept under the requested id even if the server reports
    /// a different one.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Api`] if the request fails; lists are unchanged.
    pub async fn edit(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, CacheError> {
        self.update(|state, events| state.begin_op(Operation::Edit, events));

        match self.api.edit_task(id, patch).await {
            Ok(mut task) => {
                if task.id != *id {
                    tracing::warn!(task_id = %id, returned = %task.id, "edit returned a different id");
                    task.id = id.clone();
                }
                self.update(|state, events| {
                    state.replace_task(&task, events);
                    state.finish_op(Operation::Edit, events);
                });
                Ok(task)
            }
            Err(e) => Err(self.record_failure(Operation::Edit, e)),
        }
    }

    /// Deletes a task and prunes it from every list and the current task.
    ///
    /// A task the server no longer knows about counts as deleted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Api`] for any other failure; nothing is pruned.
    pub async fn delete(&self, id: &TaskId) -> Result<(), CacheError> {
        self.update(|state, events| state.begin_op(Operation::Delete, events));

        match self.api.delete_task(id).await {
            Ok(()) => {}
            Err(e) if e.kind == ErrorKind::NotFound => {
                tracing::debug!(task_id = %id, "task already gone on server");
            }
            Err(e) => return Err(self.record_failure(Operation::Delete, e)),
        }
        self.update(|state, events| {
            state.remove_task(id, events);
            state.finish_op(Operation::Delete, events);
        });
        Ok(())
    }

    /// Changes a task's status and patches only that field (plus the
    /// modification time, when the server reports one) in every cached copy.
    ///
    /// Returns the status that was applied: the server's if it echoed one,
    /// the requested one otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Api`] if the request fails; lists are unchanged.
    pub async fn change_status(
        &self,
        id: &TaskId,
        status: &TaskStatus,
    ) -> Result<TaskStatus, CacheError> {
        self.update(|state, events| state.begin_op(Operation::StatusChange, events));

        match self.api.change_task_status(id, status).await {
            Ok(echo) => {
                let applied = echo.status().cloned().unwrap_or_else(|| status.clone());
                let updated_at = echo.updated_at();
                self.update(|state, events| {
                    state.patch_status(id, &applied, updated_at, events);
                    state.finish_op(Operation::StatusChange, events);
                });
                Ok(applied)
            }
            Err(e) => Err(self.record_failure(Operation::StatusChange, e)),
        }
    }

    /// Loads a single task into `currentTask`. On failure `currentTask` is
    /// cleared.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Api`] if the request fails.
    pub async fn view(&self, id: &TaskId) -> Result<Task, CacheError> {
        self.update(|state, events| state.begin_op(Operation::View, events));

        match self.api.view_task(id).await {
            Ok(task) => {
                self.update(|state, events| {
                    state.set_current(Some(task.clone()), events);
                    state.finish_op(Operation::View, events);
                });
                Ok(task)
            }
            Err(e) => {
                self.update(|state, events| state.set_current(None, events));
                Err(self.record_failure(Operation::View, e))
            }
        }
    }

    /// Reconciles a change confirmed outside the cache into every cached
    /// copy. Returns whether any copy existed.
    pub fn absorb(&self, task: &Task) -> bool {
        self.update(|state, events| state.replace_task(task, events))
    }

    /// Prunes a task removed outside the cache. Returns whether any copy
    /// existed.
    pub fn forget(&self, id: &TaskId) -> bool {
        self.update(|state, events| state.remove_task(id, events))
    }

    /// Sets or clears the current task without a request.
    pub fn set_current(&self, task: Option<Task>) {
        self.update(|state, events| state.set_current(task, events));
    }

    /// Clears one operation's error slot.
    pub fn clear_error(&self, operation: impl Into<Operation>) {
        let operation = operation.into();
        self.update(|state, events| state.set_error(operation, None, events));
    }

    /// Drops all data, errors and request history, cancelling every fetch in
    /// flight.
    pub fn reset(&self) {
        tracing::debug!("task cache reset");
        self.update(|state, events| state.reset(events));
    }

    fn record_failure(&self, operation: Operation, e: ApiError) -> CacheError {
        tracing::warn!(%operation, kind = %e.kind, error = %e, "task operation failed");
        let err = CacheError::Api(e);
        self.update(|state, events| state.fail_op(operation, err.clone(), events));
        err
    }
}
