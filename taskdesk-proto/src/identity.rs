//! Canonical task identity.
//!
//! Task records arrive from several generations of the REST API, each of
//! which put the identifier under a different key. [`extract_id`] is the only
//! place that knows about those conventions; everything else matches tasks
//! through the [`TaskId`] it returns.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Record keys that may carry a task identifier, in lookup order.
///
/// `_id` may hold either a plain string or a `{ "$oid": "..." }` object.
pub const ID_FIELDS: [&str; 4] = ["_id", "id", "taskId", "task_id"];

/// Key used inside nested object identifiers (`{ "$oid": "..." }`).
const OBJECT_ID_KEY: &str = "$oid";

/// Opaque, stable identifier of a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Creates a task identifier from its canonical string form.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the canonical string form.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the identifier, returning the canonical string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for TaskId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Extracts the canonical identifier from a task record.
///
/// Candidates are tried in [`ID_FIELDS`] order and the first usable one wins.
/// Strings are taken verbatim, numbers are rendered in decimal, and objects
/// contribute their `$oid` member. Returns `None` for non-object records and
/// for records where no candidate holds a usable value.
#[must_use]
pub fn extract_id(record: &Value) -> Option<TaskId> {
    record.as_object().and_then(extract_id_from_object)
}

/// Same as [`extract_id`], for a record that is already known to be an object.
#[must_use]
pub fn extract_id_from_object(record: &Map<String, Value>) -> Option<TaskId> {
    ID_FIELDS
        .iter()
        .find_map(|field| record.get(*field).and_then(id_from_value))
}

fn id_from_value(value: &Value) -> Option<TaskId> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(TaskId::new(s.as_str())),
        Value::Number(n) => Some(TaskId::new(n.to_string())),
        Value::Object(inner) => inner
            .get(OBJECT_ID_KEY)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(TaskId::new),
        _ => None,
    }
}
