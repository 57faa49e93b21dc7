//! Tolerant unwrapping of REST response envelopes.
//!
//! Endpoints disagree on where they put the payload: a bare array, an array
//! under `data`, under `data.tasks`, or under `tasks`; single records bare,
//! under `data`, `data.task` or `task`. The functions here are the only
//! place those shapes are known. Unrecognized shapes are not errors: they
//! yield an empty list or no record.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::identity::{TaskId, extract_id};
use crate::task::{Task, TaskStatus, lenient};

/// JSON pointers to a task array, in lookup order.
const LIST_POINTERS: [&str; 4] = ["", "/data", "/data/tasks", "/tasks"];

/// JSON pointers to a single task record, in lookup order.
const RECORD_POINTERS: [&str; 4] = ["/data/task", "/data", "/task", ""];

/// Extracts the task list from a response body.
///
/// Elements that cannot be decoded as tasks are skipped with a warning so
/// that one bad record does not blank a whole view.
#[must_use]
pub fn unwrap_task_list(mut body: Value) -> Vec<Task> {
    let Some(items) = LIST_POINTERS.iter().find_map(|pointer| match body.pointer_mut(pointer) {
        Some(Value::Array(items)) => Some(std::mem::take(items)),
        _ => None,
    }) else {
        tracing::debug!("response body holds no task list, treating as empty");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match Task::from_value(item) {
            Ok(task) => Some(task),
            Err(e) => {
                tracing::warn!(error = %e, "skipping undecodable task record");
                None
            }
        })
        .collect()
}

/// Extracts a single task record from a response body.
///
/// The first candidate location holding an object with an identifier is
/// decoded. Returns `None` when no location qualifies or decoding fails.
#[must_use]
pub fn unwrap_task(mut body: Value) -> Option<Task> {
    let record = RECORD_POINTERS.iter().find_map(|pointer| {
        let candidate = body.pointer_mut(pointer)?;
        (candidate.is_object() && extract_id(candidate).is_some()).then(|| candidate.take())
    })?;

    match Task::from_value(record) {
        Ok(task) => Some(task),
        Err(e) => {
            tracing::warn!(error = %e, "task record in response could not be decoded");
            None
        }
    }
}

/// What a status-change response confirmed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum StatusEcho {
    /// The full updated record.
    Record(Task),
    /// A partial record carrying only identity and status fields.
    Fields {
        id: TaskId,
        status: TaskStatus,
        updated_at: Option<DateTime<Utc>>,
    },
    /// Nothing usable, e.g. an empty body.
    #[default]
    Empty,
}

impl StatusEcho {
    /// The status the server confirmed, if any.
    #[must_use]
    pub const fn status(&self) -> Option<&TaskStatus> {
        match self {
            Self::Record(task) => Some(&task.status),
            Self::Fields { status, .. } => Some(status),
            Self::Empty => None,
        }
    }

    /// The modification time the server reported, if any.
    #[must_use]
    pub const fn updated_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Record(task) => task.updated_at,
            Self::Fields { updated_at, .. } => *updated_at,
            Self::Empty => None,
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Extracts the confirmation from a status-change response body.
///
/// A fully decodable record wins. Otherwise the first record location
/// holding an identifier and a non-empty `status` string yields its status
/// and `updatedAt`.
#[must_use]
pub fn unwrap_status_echo(body: Value) -> StatusEcho {
    let partial = RECORD_POINTERS.iter().find_map(|pointer| {
        let candidate = body.pointer(pointer)?;
        let id = extract_id(candidate)?;
        let status = candidate
            .get("status")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())?;
        let updated_at = candidate
            .get("updatedAt")
            .cloned()
            .and_then(|v| lenient::timestamp(v).ok().flatten());
        Some(StatusEcho::Fields {
            id,
            status: TaskStatus::new(status),
            updated_at,
        })
    });
    match unwrap_task(body) {
        Some(task) => StatusEcho::Record(task),
        None => partial.unwrap_or_default(),
    }
}

/// Extracts a human-readable message from an error response body.
///
/// Looks at `message`, `error` (string or `{message}`), and `msg`.
#[must_use]
pub fn error_message(body: &Value) -> Option<String> {
    ["/message", "/error/message", "/error", "/msg", "/data/message"]
        .iter()
        .filter_map(|pointer| body.pointer(pointer).and_then(Value::as_str))
        .map(str::trim)
        .find(|message| !message.is_empty())
        .map(str::to_string)
}

/// Extracts per-field validation messages from an error response body.
///
/// Understands `errors` as an object (`{"title": "required"}` or
/// `{"title": ["required"]}`) and as an array of
/// `{field|path|param, message|msg}` entries.
#[must_use]
pub fn field_errors(body: &Value) -> Vec<(String, String)> {
    match body.get("errors") {
        Some(Value::Object(map)) => map
            .iter()
            .filter_map(|(field, value)| first_text(value).map(|m| (field.clone(), m)))
            .collect(),
        Some(Value::Array(entries)) => entries
            .iter()
            .filter_map(|entry| {
                let field = ["field", "path", "param"]
                    .iter()
                    .find_map(|key| entry.get(*key).and_then(Value::as_str))?;
                let message = ["message", "msg"]
                    .iter()
                    .find_map(|key| entry.get(*key).and_then(Value::as_str))?;
                Some((field.to_string(), message.to_string()))
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn first_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_text),
        Value::Object(object) => object.get("message").and_then(first_text),
        _ => None,
    }
}
