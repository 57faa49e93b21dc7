//! Remote task API boundary for `TaskDesk`.
//!
//! Defines the [`TaskApi`] trait the cache calls into, and the [`ApiError`]
//! taxonomy every implementation reports failures with.
//! Implementations:
//! - [`http::HttpTaskApi`] — REST JSON over HTTP
//! - [`memory::MemoryTaskApi`] — in-process store with scriptable failures, for tests

pub mod http;
pub mod memory;

use std::fmt;
use std::future::Future;

use serde_json::Value;
use taskdesk_proto::counts::TaskCounts;
use taskdesk_proto::envelope::{self, StatusEcho};
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus};

/// Classification of a remote failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The request was rejected as invalid (4xx, usually with field errors).
    Validation,
    /// The session is not authenticated or not allowed (401/403).
    Auth,
    /// The addressed task does not exist (404).
    NotFound,
    /// The server failed (5xx).
    Server,
    /// No response was received (connect failure, timeout, reset).
    Transport,
    /// Anything else, including undecodable success responses.
    Unknown,
}

impl ErrorKind {
    /// Classifies an HTTP status code.
    #[must_use]
    pub const fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => Self::Auth,
            404 => Self::NotFound,
            400..=499 => Self::Validation,
            500..=599 => Self::Server,
            _ => Self::Unknown,
        }
    }

    /// Whether re-issuing the same request could plausibly succeed.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Server | Self::Transport)
    }

    /// Message shown when the failure carries no text of its own.
    #[must_use]
    pub const fn fallback_message(self) -> &'static str {
        match self {
            Self::Validation => "Some of the submitted fields are invalid.",
            Self::Auth => "Your session has expired, please log in again.",
            Self::NotFound => "The task no longer exists.",
            Self::Server => "The server ran into a problem, please try again.",
            Self::Transport => "Could not reach the server, please try again.",
            Self::Unknown => "Something went wrong.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => write!(f, "validation"),
            Self::Auth => write!(f, "auth"),
            Self::NotFound => write!(f, "not-found"),
            Self::Server => write!(f, "server"),
            Self::Transport => write!(f, "transport"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// A classified failure of a remote task API call.
///
/// `message` holds the most specific text available: the server's own
/// message for error responses, the transport's description when no
/// response arrived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    /// What kind of failure this is.
    pub kind: ErrorKind,
    /// HTTP status, when a response was received.
    pub status: Option<u16>,
    /// Server or transport message.
    pub message: Option<String>,
    /// Per-field validation messages as `(field, message)`.
    pub field_errors: Vec<(String, String)>,
}

impl ApiError {
    /// Creates an error of the given kind with no further detail.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            status: None,
            message: None,
            field_errors: Vec::new(),
        }
    }

    /// A failure where no response was received.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Transport).with_message(message)
    }

    /// A success response whose body could not be used.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown).with_message(message)
    }

    /// Builds an error from an HTTP error status and its (possibly empty) body.
    #[must_use]
    pub fn from_response(status: u16, body: &Value) -> Self {
        Self {
            kind: ErrorKind::from_status(status),
            status: Some(status),
            message: envelope::error_message(body),
            field_errors: envelope::field_errors(body),
        }
    }

    /// Returns the error with `message` attached.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Returns the error with an HTTP status attached.
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Returns the error with a field-level message added.
    #[must_use]
    pub fn with_field_error(mut self, field: impl Into<String>, message: impl Into<String>) -> Self {
        self.field_errors.push((field.into(), message.into()));
        self
    }

    /// Short, human-readable description for a notification.
    #[must_use]
    pub fn user_message(&self) -> String {
        self.message
            .clone()
            .unwrap_or_else(|| self.kind.fallback_message().to_string())
    }

    /// Message for a single form field, if the server reported one.
    #[must_use]
    pub fn field_error(&self, field: &str) -> Option<&str> {
        self.field_errors
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, message)| message.as_str())
    }

    /// Whether the session should be sent back to the login flow.
    #[must_use]
    pub const fn requires_login(&self) -> bool {
        matches!(self.kind, ErrorKind::Auth)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{} error ({status}): {}", self.kind, self.user_message()),
            None => write!(f, "{} error: {}", self.kind, self.user_message()),
        }
    }
}

impl std::error::Error for ApiError {}

/// Async boundary to the remote task service.
///
/// Every method is one request. Implementations classify their own failures
/// into [`ApiError`] and never panic on unexpected payloads; list methods
/// return an empty list for response shapes they do not recognize.
pub trait TaskApi: Send + Sync {
    /// Creates a task and returns the server's record of it.
    fn create_task(
        &self,
        draft: &TaskDraft,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Applies `patch` to the task and returns the server's updated record.
    fn edit_task(
        &self,
        id: &TaskId,
        patch: &TaskPatch,
    ) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Deletes the task.
    fn delete_task(&self, id: &TaskId) -> impl Future<Output = Result<(), ApiError>> + Send;

    /// Fetches a single task.
    fn view_task(&self, id: &TaskId) -> impl Future<Output = Result<Task, ApiError>> + Send;

    /// Changes the task's status.
    ///
    /// Returns whatever the server echoed back: the updated record, just
    /// its status fields, or nothing.
    fn change_task_status(
        &self,
        id: &TaskId,
        status: &TaskStatus,
    ) -> impl Future<Output = Result<StatusEcho, ApiError>> + Send;

    /// Lists every task visible to the session.
    fn list_all_tasks(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Lists tasks assigned to the session's user.
    fn list_assigned_to_me(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Lists tasks the session's user delegated to others.
    fn list_delegated_by_me(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Full-text task search.
    fn search_tasks(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Attribute-based task filtering.
    fn filter_tasks(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Lists tasks in one category.
    fn list_by_category(
        &self,
        category: &str,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<Vec<Task>, ApiError>> + Send;

    /// Per-status task counters.
    fn task_counts(
        &self,
        query: &TaskQuery,
    ) -> impl Future<Output = Result<TaskCounts, ApiError>> + Send;
}
