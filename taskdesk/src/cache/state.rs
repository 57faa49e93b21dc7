//! Mutable cache state and the write primitives every operation goes through.
//!
//! Each primitive records the [`CacheEvent`]s it caused so the caller can
//! publish them once the lock is released.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use taskdesk_proto::counts::TaskCounts;
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Task, TaskStatus};

use super::coordinator::{FetchCoordinator, Ticket};
use super::lists::{ListName, TaskLists, patch_matching, remove_matching, replace_matching};
use super::{CacheError, CacheEvent, Operation};

/// Everything a view can read from the cache.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// The five named lists.
    pub lists: TaskLists,
    /// The task open in the detail view.
    pub current_task: Option<Task>,
    /// Category the `category_tasks` list was requested for.
    pub category: Option<String>,
    /// Tasks in [`category`](Self::category).
    pub category_tasks: Vec<Task>,
    /// Per-status counters.
    pub task_counts: Option<TaskCounts>,
    /// Operations with a request in flight.
    pub loading: BTreeSet<Operation>,
    /// Last failure per operation.
    pub errors: BTreeMap<Operation, CacheError>,
}

impl CacheSnapshot {
    #[must_use]
    pub fn is_loading(&self, operation: Operation) -> bool {
        self.loading.contains(&operation)
    }

    #[must_use]
    pub fn error(&self, operation: Operation) -> Option<&CacheError> {
        self.errors.get(&operation)
    }
}

/// Parameters of a category fetch, kept for retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryRequest {
    pub category: String,
    pub query: TaskQuery,
}

/// A fetched collection with its own request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Feed {
    List(ListName),
    Category,
    Counts,
}

impl Feed {
    pub(crate) const fn operation(self) -> Operation {
        match self {
            Self::List(list) => Operation::List(list),
            Self::Category => Operation::Category,
            Self::Counts => Operation::Counts,
        }
    }
}

#[derive(Debug)]
pub(crate) struct CacheState {
    pub(crate) data: CacheSnapshot,
    pub(crate) list_feeds: [FetchCoordinator<TaskQuery>; 5],
    pub(crate) category_feed: FetchCoordinator<CategoryRequest>,
    pub(crate) counts_feed: FetchCoordinator<TaskQuery>,
}

impl CacheState {
    pub(crate) fn new(max_retries: u32) -> Self {
        Self {
            data: CacheSnapshot::default(),
            list_feeds: std::array::from_fn(|_| FetchCoordinator::new(max_retries)),
            category_feed: FetchCoordinator::new(max_retries),
            counts_feed: FetchCoordinator::new(max_retries),
        }
    }

    // -- loading / error bookkeeping --

    pub(crate) fn set_loading(&mut self, op: Operation, loading: bool, events: &mut Vec<CacheEvent>) {
        let changed = if loading {
            self.data.loading.insert(op)
        } else {
            self.data.loading.remove(&op)
        };
        if changed {
            events.push(CacheEvent::LoadingChanged {
                operation: op,
                loading,
            });
        }
    }

    pub(crate) fn set_error(
        &mut self,
        op: Operation,
        error: Option<CacheError>,
        events: &mut Vec<CacheEvent>,
    ) {
        let message = error.as_ref().map(CacheError::user_message);
        let previous = match error {
            Some(error) => self.data.errors.insert(op, error),
            None => self.data.errors.remove(&op),
        };
        if previous.is_some() || message.is_some() {
            events.push(CacheEvent::ErrorChanged {
                operation: op,
                message,
            });
        }
    }

    /// Marks an operation as started: loading set, previous error cleared.
    pub(crate) fn begin_op(&mut self, op: Operation, events: &mut Vec<CacheEvent>) {
        self.set_loading(op, true, events);
        self.set_error(op, None, events);
    }

    pub(crate) fn finish_op(&mut self, op: Operation, events: &mut Vec<CacheEvent>) {
        self.set_loading(op, false, events);
    }

    pub(crate) fn fail_op(&mut self, op: Operation, error: CacheError, events: &mut Vec<CacheEvent>) {
        self.set_loading(op, false, events);
        self.set_error(op, Some(error), events);
    }

    // -- feeds --

    pub(crate) fn is_current(&self, feed: Feed, ticket: &Ticket) -> bool {
        match feed {
            Feed::List(list) => self.list_feeds[list.index()].is_current(ticket),
            Feed::Category => self.category_feed.is_current(ticket),
            Feed::Counts => self.counts_feed.is_current(ticket),
        }
    }

    pub(crate) fn finish_feed(&mut self, feed: Feed, ticket: &Ticket, succeeded: bool) {
        match feed {
            Feed::List(list) => self.list_feeds[list.index()].finish(ticket, succeeded),
            Feed::Category => self.category_feed.finish(ticket, succeeded),
            Feed::Counts => self.counts_feed.finish(ticket, succeeded),
        }
    }

    /// Cancels the feed's in-flight request. Loading is cleared immediately.
    pub(crate) fn cancel_feed(&mut self, feed: Feed, events: &mut Vec<CacheEvent>) -> bool {
        let cancelled = match feed {
            Feed::List(list) => self.list_feeds[list.index()].cancel(),
            Feed::Category => self.category_feed.cancel(),
            Feed::Counts => self.counts_feed.cancel(),
        };
        if cancelled {
            self.set_loading(feed.operation(), false, events);
        }
        cancelled
    }

    /// Empties the feed's collection.
    pub(crate) fn clear_feed(&mut self, feed: Feed, events: &mut Vec<CacheEvent>) {
        match feed {
            Feed::List(list) => self.data.lists.get_mut(list).clear(),
            Feed::Category => self.data.category_tasks.clear(),
            Feed::Counts => self.data.task_counts = None,
        }
        events.push(CacheEvent::ListReplaced {
            operation: feed.operation(),
            len: 0,
        });
    }

    // -- entity fan-out --

    /// Replaces every copy of `task` (by id) in every list and the current
    /// task. Returns whether any copy existed.
    pub(crate) fn replace_task(&mut self, task: &Task, events: &mut Vec<CacheEvent>) -> bool {
        let mut found = false;
        for (_, list) in self.data.lists.iter_mut() {
            found |= replace_matching(list, task);
        }
        found |= replace_matching(&mut self.data.category_tasks, task);
        if let Some(current) = self.data.current_task.as_mut().filter(|c| c.id == task.id) {
            current.clone_from(task);
            found = true;
        }
        if found {
            events.push(CacheEvent::TaskUpdated(task.id.clone()));
        }
        found
    }

    /// Removes every copy of the task from every list and clears the current
    /// task if it matches. Returns whether any copy existed.
    pub(crate) fn remove_task(&mut self, id: &TaskId, events: &mut Vec<CacheEvent>) -> bool {
        let mut found = false;
        for (_, list) in self.data.lists.iter_mut() {
            found |= remove_matching(list, id);
        }
        found |= remove_matching(&mut self.data.category_tasks, id);
        if self.data.current_task.as_ref().is_some_and(|c| c.id == *id) {
            self.data.current_task = None;
            events.push(CacheEvent::CurrentChanged(None));
            found = true;
        }
        if found {
            events.push(CacheEvent::TaskRemoved(id.clone()));
        }
        found
    }

    /// Sets only the status (and, when known, the modification time) of every
    /// copy of the task, leaving order and other fields alone.
    pub(crate) fn patch_status(
        &mut self,
        id: &TaskId,
        status: &TaskStatus,
        updated_at: Option<DateTime<Utc>>,
        events: &mut Vec<CacheEvent>,
    ) -> bool {
        let patch = |task: &mut Task| {
            task.status = status.clone();
            if updated_at.is_some() {
                task.updated_at = updated_at;
            }
        };
        let mut found = false;
        for (_, list) in self.data.lists.iter_mut() {
            found |= patch_matching(list, id, patch);
        }
        found |= patch_matching(&mut self.data.category_tasks, id, patch);
        if let Some(current) = self.data.current_task.as_mut().filter(|c| c.id == *id) {
            patch(current);
            found = true;
        }
        if found {
            events.push(CacheEvent::TaskUpdated(id.clone()));
        }
        found
    }

    /// Puts a newly created task at the head of the lists it belongs to on
    /// creation: everything, and what the user delegated.
    pub(crate) fn insert_created(&mut self, task: &Task, events: &mut Vec<CacheEvent>) {
        for list in [ListName::AllTasks, ListName::DelegatedTasks] {
            let tasks = self.data.lists.get_mut(list);
            remove_matching(tasks, &task.id);
            tasks.insert(0, task.clone());
        }
        events.push(CacheEvent::TaskCreated(task.id.clone()));
    }

    pub(crate) fn set_current(&mut self, task: Option<Task>, events: &mut Vec<CacheEvent>) {
        if self.data.current_task == task {
            return;
        }
        let id = task.as_ref().map(|t| t.id.clone());
        self.data.current_task = task;
        events.push(CacheEvent::CurrentChanged(id));
    }

    /// Drops all data and forgets every request, cancelling those in flight.
    pub(crate) fn reset(&mut self, events: &mut Vec<CacheEvent>) {
        for feed in &mut self.list_feeds {
            feed.reset();
        }
        self.category_feed.reset();
        self.counts_feed.reset();
        self.data = CacheSnapshot::default();
        events.push(CacheEvent::Reset);
    }
}
