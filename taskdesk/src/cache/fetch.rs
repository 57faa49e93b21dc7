//! Fetch side of [`TaskCache`]: lists, search, filter, category, counters.
//!
//! Every fetch goes through the collection's [`FetchCoordinator`]; a result
//! is applied only if its ticket is still current when it arrives.
//!
//! [`FetchCoordinator`]: super::coordinator::FetchCoordinator

use std::future::Future;

use taskdesk_proto::query::TaskQuery;

use super::coordinator::Ticket;
use super::state::{CacheState, CategoryRequest, Feed};
use super::{CacheError, CacheEvent, FetchOutcome, ListName, Operation, TaskCache};
use crate::api::{ApiError, TaskApi};

impl<A: TaskApi> TaskCache<A> {
    /// Fetches a named list, replacing its contents on success and emptying
    /// it on failure.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Api`] if the request fails; the same error is
    /// stored under the list's key.
    pub async fn fetch(&self, list: ListName, query: TaskQuery) -> Result<FetchOutcome, CacheError> {
        let ticket = self.update(|state, events| {
            state.begin_op(list.into(), events);
            state.list_feeds[list.index()].begin(query.clone())
        });
        self.run_list(list, query, ticket).await
    }

    /// Replaces `searchResults`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn search(&self, query: TaskQuery) -> Result<FetchOutcome, CacheError> {
        self.fetch(ListName::SearchResults, query).await
    }

    /// Replaces `filteredResults`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn filter(&self, query: TaskQuery) -> Result<FetchOutcome, CacheError> {
        self.fetch(ListName::FilteredResults, query).await
    }

    /// Empties `searchResults` and clears its error. Any search in flight
    /// is superseded.
    pub fn clear_search(&self) {
        self.clear_results(ListName::SearchResults);
    }

    /// Empties `filteredResults` and clears its error. Any filter in flight
    /// is superseded.
    pub fn clear_filter(&self) {
        self.clear_results(ListName::FilteredResults);
    }

    fn clear_results(&self, list: ListName) {
        self.update(|state, events| {
            state.list_feeds[list.index()].supersede();
            state.set_loading(list.into(), false, events);
            state.set_error(list.into(), None, events);
            state.clear_feed(Feed::List(list), events);
        });
    }

    /// Re-issues the last request for `list` with the same parameters.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NothingToRetry`] if the list was never fetched,
    /// [`CacheError::RetryLimit`] once the retry budget is spent (no request
    /// is sent in either case), or the request's own failure.
    pub async fn retry(&self, list: ListName) -> Result<FetchOutcome, CacheError> {
        let (query, ticket) = self.update(|state, events| {
            let op = Operation::from(list);
            let (query, ticket) = state.list_feeds[list.index()]
                .begin_retry()
                .map_err(|refused| CacheError::from_refusal(op, refused))?;
            state.begin_op(op, events);
            Ok::<_, CacheError>((query, ticket))
        })?;
        tracing::debug!(list = %list, attempt = self.retry_attempts(list), "retrying task list fetch");
        self.run_list(list, query, ticket).await
    }

    /// Retries used for `list` since its last fresh request or success.
    pub fn retry_attempts(&self, list: ListName) -> u32 {
        self.state.lock().list_feeds[list.index()].attempts()
    }

    async fn run_list(
        &self,
        list: ListName,
        query: TaskQuery,
        ticket: Ticket,
    ) -> Result<FetchOutcome, CacheError> {
        let api = &self.api;
        let call = async {
            match list {
                ListName::AllTasks => api.list_all_tasks(&query).await,
                ListName::MyTasks => api.list_assigned_to_me(&query).await,
                ListName::DelegatedTasks => api.list_delegated_by_me(&query).await,
                ListName::SearchResults => api.search_tasks(&query).await,
                ListName::FilteredResults => api.filter_tasks(&query).await,
            }
        };
        self.run_fetch(Feed::List(list), ticket, call, |state, tasks| {
            let len = tasks.len();
            state.data.lists.replace(list, tasks);
            len
        })
        .await
    }

    /// Fetches the tasks of one category into `categoryTasks`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn fetch_category(
        &self,
        category: impl Into<String>,
        query: TaskQuery,
    ) -> Result<FetchOutcome, CacheError> {
        let request = CategoryRequest {
            category: category.into(),
            query,
        };
        let ticket = self.update(|state, events| {
            state.begin_op(Operation::Category, events);
            state.data.category = Some(request.category.clone());
            state.category_feed.begin(request.clone())
        });
        self.run_category(request, ticket).await
    }

    /// Re-issues the last category fetch.
    ///
    /// # Errors
    ///
    /// See [`retry`](Self::retry).
    pub async fn retry_category(&self) -> Result<FetchOutcome, CacheError> {
        let (request, ticket) = self.update(|state, events| {
            let (request, ticket) = state
                .category_feed
                .begin_retry()
                .map_err(|refused| CacheError::from_refusal(Operation::Category, refused))?;
            state.begin_op(Operation::Category, events);
            Ok::<_, CacheError>((request, ticket))
        })?;
        self.run_category(request, ticket).await
    }

    async fn run_category(
        &self,
        request: CategoryRequest,
        ticket: Ticket,
    ) -> Result<FetchOutcome, CacheError> {
        let call = self.api.list_by_category(&request.category, &request.query);
        self.run_fetch(Feed::Category, ticket, call, |state, tasks| {
            let len = tasks.len();
            state.data.category = Some(request.category.clone());
            state.data.category_tasks = tasks;
            len
        })
        .await
    }

    /// Fetches per-status counters into `taskCounts`.
    ///
    /// # Errors
    ///
    /// See [`fetch`](Self::fetch).
    pub async fn fetch_counts(&self, query: TaskQuery) -> Result<FetchOutcome, CacheError> {
        let ticket = self.update(|state, events| {
            state.begin_op(Operation::Counts, events);
            state.counts_feed.begin(query.clone())
        });
        self.run_counts(query, ticket).await
    }

    /// Re-issues the last counters fetch.
    ///
    /// # Errors
    ///
    /// See [`retry`](Self::retry).
    pub async fn retry_counts(&self) -> Result<FetchOutcome, CacheError> {
        let (query, ticket) = self.update(|state, events| {
            let (query, ticket) = state
                .counts_feed
                .begin_retry()
                .map_err(|refused| CacheError::from_refusal(Operation::Counts, refused))?;
            state.begin_op(Operation::Counts, events);
            Ok::<_, CacheError>((query, ticket))
        })?;
        self.run_counts(query, ticket).await
    }

    async fn run_counts(&self, query: TaskQuery, ticket: Ticket) -> Result<FetchOutcome, CacheError> {
        let call = self.api.task_counts(&query);
        self.run_fetch(Feed::Counts, ticket, call, |state, counts| {
            let len = counts.by_status.len();
            state.data.task_counts = Some(counts);
            len
        })
        .await
    }

    /// Aborts the in-flight fetch of `list`. Loading is cleared now and the
    /// aborted request changes nothing when it settles. Returns whether a
    /// request was in flight.
    pub fn cancel(&self, list: ListName) -> bool {
        self.update(|state, events| state.cancel_feed(Feed::List(list), events))
    }

    /// Aborts every in-flight fetch, e.g. when the view is torn down.
    pub fn cancel_all(&self) {
        self.update(|state, events| {
            for list in ListName::ALL {
                state.cancel_feed(Feed::List(list), events);
            }
            state.cancel_feed(Feed::Category, events);
            state.cancel_feed(Feed::Counts, events);
        });
    }

    /// Awaits `call` unless the ticket is cancelled first, then applies the
    /// result if the ticket is still current.
    async fn run_fetch<T>(
        &self,
        feed: Feed,
        ticket: Ticket,
        call: impl Future<Output = Result<T, ApiError>>,
        apply: impl FnOnce(&mut CacheState, T) -> usize,
    ) -> Result<FetchOutcome, CacheError> {
        let operation = feed.operation();
        let result = tokio::select! {
            biased;
            () = ticket.token.cancelled() => None,
            result = call => Some(result),
        };
        let Some(result) = result else {
            tracing::debug!(%operation, "fetch cancelled");
            return Ok(FetchOutcome::Superseded);
        };

        self.update(|state, events| {
            if !state.is_current(feed, &ticket) {
                tracing::debug!(%operation, "discarding superseded fetch result");
                return Ok(FetchOutcome::Superseded);
            }
            match result {
                Ok(value) => {
                    state.finish_feed(feed, &ticket, true);
                    let len = apply(state, value);
                    state.finish_op(operation, events);
                    events.push(CacheEvent::ListReplaced { operation, len });
                    Ok(FetchOutcome::Applied { len })
                }
                Err(e) => {
                    tracing::warn!(%operation, error = %e, "fetch failed");
                    state.finish_feed(feed, &ticket, false);
                    state.clear_feed(feed, events);
                    let err = CacheError::Api(e);
                    state.fail_op(operation, err.clone(), events);
                    Err(err)
                }
            }
        })
    }
}
