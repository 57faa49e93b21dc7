//! Task entity cache.
//!
//! [`TaskCache`] holds the named task lists, the current task, category and
//! counter projections, and per-operation loading and error slots. It owns
//! the write path: list fetches replace a whole list, while mutations fan
//! the confirmed entity out to every list that holds it. Mutations are
//! pessimistic; nothing changes until the API has confirmed.
//!
//! The operations are split across files by concern:
//! - [`fetch`] — list, search, filter, category and counter fetches, retries
//!   and cancellation
//! - [`mutate`] — create, edit, delete, status change, view, and local
//!   reconciliation
//!
//! State lives behind a synchronous mutex that is never held across an
//! await. Every change is announced as a [`CacheEvent`] on a broadcast
//! channel after the lock is released.

pub mod coordinator;
mod fetch;
pub mod lists;
mod mutate;
pub mod state;

use std::fmt;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use taskdesk_proto::counts::TaskCounts;
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::task::{DraftError, Task};

use crate::api::{ApiError, ErrorKind, TaskApi};
use crate::config::CacheConfig;

pub use coordinator::DEFAULT_MAX_RETRIES;
pub use lists::{ListName, TaskLists};
pub use state::{CacheSnapshot, CategoryRequest};

use coordinator::RetryRefused;
use state::CacheState;

/// Key for the loading and error slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Fetching one of the named lists.
    List(ListName),
    /// Fetching `categoryTasks`.
    Category,
    /// Fetching `taskCounts`.
    Counts,
    Create,
    Edit,
    Delete,
    StatusChange,
    View,
}

impl Operation {
    /// Key used for this operation in loading and error maps.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::List(list) => list.as_str(),
            Self::Category => "categoryTasks",
            Self::Counts => "taskCounts",
            Self::Create => "create",
            Self::Edit => "edit",
            Self::Delete => "delete",
            Self::StatusChange => "statusChange",
            Self::View => "view",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ListName> for Operation {
    fn from(list: ListName) -> Self {
        Self::List(list)
    }
}

/// Errors surfaced by cache operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The remote call failed.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The retry budget for the last request is used up.
    #[error("retry limit reached for {operation} after {max} attempts")]
    RetryLimit {
        /// Which fetch was retried.
        operation: Operation,
        /// The configured cap.
        max: u32,
    },

    /// A retry was requested before any request was made.
    #[error("nothing to retry for {0}")]
    NothingToRetry(Operation),

    /// The draft failed local validation; no request was sent.
    #[error("invalid task: {0}")]
    InvalidDraft(#[from] DraftError),
}

impl CacheError {
    pub(crate) const fn from_refusal(operation: Operation, refused: RetryRefused) -> Self {
        match refused {
            RetryRefused::Exhausted { max } => Self::RetryLimit { operation, max },
            RetryRefused::NothingToRetry => Self::NothingToRetry(operation),
        }
    }

    /// Short, human-readable description for a notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(err) => err.user_message(),
            other => other.to_string(),
        }
    }

    /// Classification of the remote failure, if this was one.
    #[must_use]
    pub const fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Api(err) => Some(err.kind),
            _ => None,
        }
    }

    /// The remote failure, if this was one.
    #[must_use]
    pub const fn as_api(&self) -> Option<&ApiError> {
        match self {
            Self::Api(err) => Some(err),
            _ => None,
        }
    }
}

/// Change notifications for the view layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
    /// A fetched collection was replaced (or emptied).
    ListReplaced {
        /// `List`, `Category` or `Counts`.
        operation: Operation,
        /// Number of entries now held.
        len: usize,
    },
    /// Every cached copy of the task was replaced or patched.
    TaskUpdated(TaskId),
    /// The task was pruned from every list.
    TaskRemoved(TaskId),
    /// A new task was added to the head of its lists.
    TaskCreated(TaskId),
    /// The current task changed.
    CurrentChanged(Option<TaskId>),
    /// An operation started or stopped loading.
    LoadingChanged { operation: Operation, loading: bool },
    /// An operation's error slot was set or cleared.
    ErrorChanged {
        operation: Operation,
        message: Option<String>,
    },
    /// All data was dropped.
    Reset,
}

/// Result of a fetch that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The response was applied; the collection now holds `len` entries.
    Applied { len: usize },
    /// A newer request or a cancellation made this response irrelevant.
    /// Nothing was changed.
    Superseded,
}

/// Multi-view task cache backed by a [`TaskApi`].
pub struct TaskCache<A: TaskApi> {
    api: A,
    state: Mutex<CacheState>,
    events: broadcast::Sender<CacheEvent>,
}

impl<A: TaskApi> TaskCache<A> {
    /// Creates a cache with default settings.
    pub fn new(api: A) -> Self {
        Self::with_config(api, &CacheConfig::default())
    }

    pub fn with_config(api: A, config: &CacheConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer.max(1));
        Self {
            api,
            state: Mutex::new(CacheState::new(config.max_retries)),
            events,
        }
    }

    /// The API the cache talks to.
    pub const fn api(&self) -> &A {
        &self.api
    }

    /// Subscribes to change notifications from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // -- reads --

    /// Owned copy of the whole state.
    pub fn snapshot(&self) -> CacheSnapshot {
        self.state.lock().data.clone()
    }

    pub fn list(&self, name: ListName) -> Vec<Task> {
        self.state.lock().data.lists.get(name).to_vec()
    }

    pub fn current_task(&self) -> Option<Task> {
        self.state.lock().data.current_task.clone()
    }

    /// Tasks from the last category fetch, with the category they belong to.
    pub fn category_tasks(&self) -> (Option<String>, Vec<Task>) {
        let state = self.state.lock();
        (state.data.category.clone(), state.data.category_tasks.clone())
    }

    pub fn task_counts(&self) -> Option<TaskCounts> {
        self.state.lock().data.task_counts.clone()
    }

    pub fn is_loading(&self, operation: impl Into<Operation>) -> bool {
        self.state.lock().data.is_loading(operation.into())
    }

    pub fn error(&self, operation: impl Into<Operation>) -> Option<CacheError> {
        self.state.lock().data.error(operation.into()).cloned()
    }

    /// The error slot rendered for display.
    pub fn error_message(&self, operation: impl Into<Operation>) -> Option<String> {
        self.error(operation).map(|e| e.user_message())
    }

    /// Runs `f` under the state lock, then publishes the events it recorded.
    fn update<T>(&self, f: impl FnOnce(&mut CacheState, &mut Vec<CacheEvent>) -> T) -> T {
        let mut events = Vec::new();
        let out = {
            let mut state = self.state.lock();
            f(&mut state, &mut events)
        };
        for event in events {
            // No receivers is fine.
            let _ = self.events.send(event);
        }
        out
    }
}

impl<A: TaskApi + fmt::Debug> fmt::Debug for TaskCache<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskCache")
            .field("api", &self.api)
            .field("subscribers", &self.events.receiver_count())
            .finish_non_exhaustive()
    }
}
