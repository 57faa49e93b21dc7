//! Request lifecycle for one fetched collection.
//!
//! A [`FetchCoordinator`] hands out a [`Ticket`] per request. Starting a new
//! request bumps the generation and cancels the previous ticket's token, so
//! only the newest ticket is ever current. The last request is remembered so
//! it can be retried, up to a fixed number of attempts.

use tokio_util::sync::CancellationToken;

/// Default number of manual retries allowed per request.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Proof that a request was issued, checked again when its result arrives.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub(crate) generation: u64,
    pub(crate) token: CancellationToken,
}

/// Why a retry was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryRefused {
    /// All retry attempts for the last request have been used.
    Exhausted { max: u32 },
    /// No request has been issued yet.
    NothingToRetry,
}

#[derive(Debug)]
pub struct FetchCoordinator<R> {
    generation: u64,
    token: Option<CancellationToken>,
    last_request: Option<R>,
    attempts: u32,
    max_retries: u32,
}

impl<R: Clone> FetchCoordinator<R> {
    pub const fn new(max_retries: u32) -> Self {
        Self {
            generation: 0,
            token: None,
            last_request: None,
            attempts: 0,
            max_retries,
        }
    }

    /// Starts a fresh request, superseding any in flight. Resets the retry
    /// budget.
    pub fn begin(&mut self, request: R) -> Ticket {
        self.attempts = 0;
        self.last_request = Some(request);
        self.issue()
    }

    /// Re-issues the last request, consuming one retry attempt.
    pub fn begin_retry(&mut self) -> Result<(R, Ticket), RetryRefused> {
        let request = self
            .last_request
            .clone()
            .ok_or(RetryRefused::NothingToRetry)?;
        if self.attempts >= self.max_retries {
            return Err(RetryRefused::Exhausted {
                max: self.max_retries,
            });
        }
        self.attempts += 1;
        Ok((request, self.issue()))
    }

    fn issue(&mut self) -> Ticket {
        if let Some(previous) = self.token.take() {
            previous.cancel();
        }
        self.generation += 1;
        let token = CancellationToken::new();
        self.token = Some(token.clone());
        Ticket {
            generation: self.generation,
            token,
        }
    }

    /// Whether `ticket` belongs to the newest request and was not cancelled.
    pub fn is_current(&self, ticket: &Ticket) -> bool {
        ticket.generation == self.generation && !ticket.token.is_cancelled()
    }

    /// Marks the ticket's request as settled. A success restores the full
    /// retry budget.
    pub fn finish(&mut self, ticket: &Ticket, succeeded: bool) {
        if ticket.generation != self.generation {
            return;
        }
        self.token = None;
        if succeeded {
            self.attempts = 0;
        }
    }

    /// Cancels the in-flight request, if any. Returns whether one was running.
    pub fn cancel(&mut self) -> bool {
        self.token.take().is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Cancels and supersedes any in-flight request without issuing a new one.
    /// The remembered request is kept.
    pub fn supersede(&mut self) {
        self.cancel();
        self.generation += 1;
    }

    /// Forgets everything, cancelling any in-flight request.
    pub fn reset(&mut self) {
        self.supersede();
        self.last_request = None;
        self.attempts = 0;
    }

    /// Retries used since the last fresh request or success.
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    pub const fn is_in_flight(&self) -> bool {
        self.token.is_some()
    }

    pub const fn last_request(&self) -> Option<&R> {
        self.last_request.as_ref()
    }
}
