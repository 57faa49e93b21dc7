//! In-process task API for tests and demos.
//!
//! [`MemoryTaskApi`] keeps tasks in memory and answers every [`TaskApi`]
//! call from that store. Tests can script its behaviour per endpoint:
//! queue failures with [`fail_next`](MemoryTaskApi::fail_next), hold a call
//! until released with [`hold_next`](MemoryTaskApi::hold_next) to control
//! completion order, and count calls with [`calls`](MemoryTaskApi::calls).
//! Clones share the same store.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

use taskdesk_proto::counts::TaskCounts;
use taskdesk_proto::envelope::StatusEcho;
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus};

use super::{ApiError, ErrorKind, TaskApi};

/// Query keys treated as free-text search terms.
const SEARCH_KEYS: [&str; 3] = ["q", "search", "title"];

/// One method of the [`TaskApi`] surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Create,
    Edit,
    Delete,
    View,
    ChangeStatus,
    ListAll,
    ListAssigned,
    ListDelegated,
    Search,
    Filter,
    Category,
    Counts,
}

/// Releases a call held by [`MemoryTaskApi::hold_next`].
///
/// Dropping the gate without calling [`release`](Gate::release) also lets
/// the call proceed.
#[derive(Debug)]
pub struct Gate(oneshot::Sender<()>);

impl Gate {
    /// Lets the held call continue.
    pub fn release(self) {
        let _ = self.0.send(());
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    /// Server-side order: newest first.
    tasks: Vec<Task>,
    current_user: String,
    next_ids: VecDeque<TaskId>,
    echo_status: bool,
    failures: HashMap<Endpoint, VecDeque<ApiError>>,
    holds: HashMap<Endpoint, VecDeque<oneshot::Receiver<()>>>,
    calls: HashMap<Endpoint, usize>,
}

/// In-memory [`TaskApi`] implementation.
#[derive(Debug, Clone)]
pub struct MemoryTaskApi {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTaskApi {
    /// Creates an empty store acting on behalf of `current_user`.
    pub fn new(current_user: impl Into<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(MemoryState {
                current_user: current_user.into(),
                echo_status: true,
                ..MemoryState::default()
            })),
        }
    }

    /// Creates a store pre-populated with `tasks` (newest first).
    pub fn with_tasks(current_user: impl Into<String>, tasks: Vec<Task>) -> Self {
        let api = Self::new(current_user);
        api.state.lock().tasks = tasks;
        api
    }

    /// Inserts or replaces a task directly, bypassing the API surface.
    pub fn seed(&self, task: Task) {
        let mut state = self.state.lock();
        if let Some(existing) = state.tasks.iter_mut().find(|t| t.id == task.id) {
            *existing = task;
        } else {
            state.tasks.insert(0, task);
        }
    }

    /// Current server-side copy of a task.
    #[must_use]
    pub fn task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.iter().find(|t| t.id == *id).cloned()
    }

    /// Number of tasks held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Identifier to assign to the next created task instead of a UUID.
    pub fn queue_id(&self, id: impl Into<TaskId>) {
        self.state.lock().next_ids.push_back(id.into());
    }

    /// Whether status changes respond with the updated record (default) or
    /// with an empty body.
    pub fn set_status_echo(&self, echo: bool) {
        self.state.lock().echo_status = echo;
    }

    /// Makes the next call to `endpoint` fail with `error`.
    ///
    /// Failures queue up: calling this twice fails the next two calls.
    pub fn fail_next(&self, endpoint: Endpoint, error: ApiError) {
        self.state
            .lock()
            .failures
            .entry(endpoint)
            .or_default()
            .push_back(error);
    }

    /// Holds the next call to `endpoint` until the returned gate is released.
    #[must_use]
    pub fn hold_next(&self, endpoint: Endpoint) -> Gate {
        let (tx, rx) = oneshot::channel();
        self.state
            .lock()
            .holds
            .entry(endpoint)
            .or_default()
            .push_back(rx);
        Gate(tx)
    }

    /// How many times `endpoint` has been called.
    #[must_use]
    pub fn calls(&self, endpoint: Endpoint) -> usize {
        self.state.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Records the call, waits on any hold, then returns any queued failure.
    async fn intercept(&self, endpoint: Endpoint) -> Result<(), ApiError> {
        let hold = {
            let mut state = self.state.lock();
            *state.calls.entry(endpoint).or_insert(0) += 1;
            state.holds.get_mut(&endpoint).and_then(VecDeque::pop_front)
        };
        if let Some(hold) = hold {
            let _ = hold.await;
        }
        let failure = self
            .state
            .lock()
            .failures
            .get_mut(&endpoint)
            .and_then(VecDeque::pop_front);
        failure.map_or(Ok(()), Err)
    }

    fn select(&self, keep: impl Fn(&Task, &str) -> bool, query: &TaskQuery) -> Vec<Task> {
        let state = self.state.lock();
        state
            .tasks
            .iter()
            .filter(|task| keep(task, &state.current_user) && matches_query(task, query))
            .cloned()
            .collect()
    }
}

fn not_found(id: &TaskId) -> ApiError {
    ApiError::new(ErrorKind::NotFound)
        .with_status(404)
        .with_message(format!("Task {id} not found"))
}

/// Attribute equality for known keys, substring match for search keys.
/// Unknown keys (paging, sorting) are ignored.
fn matches_query(task: &Task, query: &TaskQuery) -> bool {
    query.iter().all(|(key, value)| {
        let Some(expected) = value.as_str() else {
            return true;
        };
        match key {
            "status" => task.status.as_str() == expected,
            "category" => task.category == expected,
            "assignee" => task.assignee.as_deref() == Some(expected),
            "priority" => task
                .priority
                .is_some_and(|p| p.to_string().eq_ignore_ascii_case(expected)),
            k if SEARCH_KEYS.contains(&k) => {
                let needle = expected.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task.description.to_lowercase().contains(&needle)
            }
            _ => true,
        }
    })
}

impl TaskApi for MemoryTaskApi {
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        self.intercept(Endpoint::Create).await?;
        if draft.validate().is_err() {
            return Err(ApiError::new(ErrorKind::Validation)
                .with_status(422)
                .with_message("Task validation failed")
                .with_field_error("title", "Title is required"));
        }
        let mut state = self.state.lock();
        let id = state
            .next_ids
            .pop_front()
            .unwrap_or_else(|| TaskId::new(Uuid::now_v7().to_string()));
        let mut task = draft.clone().into_task(id);
        task.created_by = Some(state.current_user.clone());
        task.created_at = Some(Utc::now());
        state.tasks.insert(0, task.clone());
        Ok(task)
    }

    async fn edit_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        self.intercept(Endpoint::Edit).await?;
        let mut state = self.state.lock();
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| not_found(id))?;
        patch.apply_to(task);
        task.updated_at = Some(Utc::now());
        Ok(task.clone())
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ApiError> {
        self.intercept(Endpoint::Delete).await?;
        let mut state = self.state.lock();
        let before = state.tasks.len();
        state.tasks.retain(|t| t.id != *id);
        if state.tasks.len() == before {
            return Err(not_found(id));
        }
        Ok(())
    }

    async fn view_task(&self, id: &TaskId) -> Result<Task, ApiError> {
        self.intercept(Endpoint::View).await?;
        self.task(id).ok_or_else(|| not_found(id))
    }

    async fn change_task_status(
        &self,
        id: &TaskId,
        status: &TaskStatus,
    ) -> Result<StatusEcho, ApiError> {
        self.intercept(Endpoint::ChangeStatus).await?;
        let mut state = self.state.lock();
        let echo = state.echo_status;
        let task = state
            .tasks
            .iter_mut()
            .find(|t| t.id == *id)
            .ok_or_else(|| not_found(id))?;
        task.status = status.clone();
        task.updated_at = Some(Utc::now());
        Ok(if echo {
            StatusEcho::Record(task.clone())
        } else {
            StatusEcho::Empty
        })
    }

    async fn list_all_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::ListAll).await?;
        Ok(self.select(|_, _| true, query))
    }

    async fn list_assigned_to_me(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::ListAssigned).await?;
        Ok(self.select(|task, me| task.assignee.as_deref() == Some(me), query))
    }

    async fn list_delegated_by_me(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::ListDelegated).await?;
        Ok(self.select(|task, me| task.created_by.as_deref() == Some(me), query))
    }

    async fn search_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::Search).await?;
        Ok(self.select(|_, _| true, query))
    }

    async fn filter_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::Filter).await?;
        Ok(self.select(|_, _| true, query))
    }

    async fn list_by_category(
        &self,
        category: &str,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, ApiError> {
        self.intercept(Endpoint::Category).await?;
        Ok(self.select(|task, _| task.category == category, query))
    }

    async fn task_counts(&self, query: &TaskQuery) -> Result<TaskCounts, ApiError> {
        self.intercept(Endpoint::Counts).await?;
        Ok(TaskCounts::tally(&self.select(|_, _| true, query)))
    }
}
