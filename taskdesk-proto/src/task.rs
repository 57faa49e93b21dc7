//! Task records as exchanged with the REST API.
//!
//! The API has accumulated several spellings for the same attribute over
//! time (array-valued assignees, bare-string attachments, numeric
//! timestamps). Decoding accepts all of them and normalizes into [`Task`];
//! encoding always produces the current camelCase shape. Fields the model
//! does not know about are kept in [`Task::extra`] and written back verbatim.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::identity::{ID_FIELDS, TaskId, extract_id_from_object};

/// Errors that can occur when decoding a task record.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The record is not a JSON object.
    #[error("task record is not a JSON object")]
    NotAnObject,

    /// None of the known identifier fields held a usable value.
    #[error("task record has no identifier")]
    MissingId,

    /// The record is an object but its fields do not form a task.
    #[error("malformed task record: {0}")]
    Json(#[from] serde_json::Error),
}

/// Error returned when parsing an enum-like attribute from free text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind}: {value:?}")]
pub struct UnknownVariant {
    /// Which attribute was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

/// Errors raised by local validation of a [`TaskDraft`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DraftError {
    /// The title is empty or whitespace only.
    #[error("task title cannot be empty")]
    EmptyTitle,
}

/// Task priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Priority {
    /// Needs attention first.
    High,
    /// Default urgency.
    Medium,
    /// Can wait.
    Low,
}

impl FromStr for Priority {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(UnknownVariant {
                kind: "priority",
                value: s.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::High => write!(f, "High"),
            Self::Medium => write!(f, "Medium"),
            Self::Low => write!(f, "Low"),
        }
    }
}

/// Task status.
///
/// The vocabulary belongs to the server and the UI; the cache treats the
/// value as opaque. The associated constants name the values the dashboard
/// currently uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskStatus(String);

impl TaskStatus {
    pub const PENDING: &'static str = "pending";
    pub const IN_PROGRESS: &'static str = "in-progress";
    pub const COMPLETED: &'static str = "completed";
    pub const OVERDUE: &'static str = "overdue";
    pub const DELAYED: &'static str = "delayed";
    pub const IN_TIME: &'static str = "in-time";

    /// Creates a status from its wire value.
    pub fn new(status: impl Into<String>) -> Self {
        Self(status.into())
    }

    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskStatus {
    fn default() -> Self {
        Self::new(Self::PENDING)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TaskStatus {
    fn from(status: &str) -> Self {
        Self::new(status)
    }
}

impl PartialEq<&str> for TaskStatus {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// How often a task recurs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Frequency {
    /// Happens once.
    #[default]
    OneTime,
    /// Every day.
    Daily,
    /// Every week.
    Weekly,
    /// Every month.
    Monthly,
    /// Every year.
    Yearly,
    /// On a custom schedule described by the frequency details.
    Periodically,
}

impl FromStr for Frequency {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace(['_', ' '], "-");
        match normalized.as_str() {
            "one-time" | "onetime" | "once" => Ok(Self::OneTime),
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "monthly" => Ok(Self::Monthly),
            "yearly" | "annually" => Ok(Self::Yearly),
            "periodically" | "periodic" => Ok(Self::Periodically),
            _ => Err(UnknownVariant {
                kind: "frequency",
                value: s.to_string(),
            }),
        }
    }
}

/// A file attached to a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    /// Display name of the file.
    #[serde(default, alias = "fileName", alias = "filename")]
    pub name: String,
    /// Where the file can be downloaded.
    #[serde(alias = "path", alias = "fileUrl")]
    pub url: String,
    /// MIME type, when the server reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// A comment on a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    /// User id of the author.
    #[serde(
        default,
        alias = "user",
        deserialize_with = "lenient::user_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub author: Option<String>,
    /// Comment body.
    #[serde(default, alias = "comment", deserialize_with = "lenient::null_as_default")]
    pub text: String,
    /// When the comment was written.
    #[serde(
        default,
        alias = "timestamp",
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
}

/// A task as held by the cache.
///
/// Build one from a wire record with [`Task::from_value`], which resolves
/// the identifier through [`extract_id`](crate::identity::extract_id)
/// before decoding the remaining fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Canonical identifier.
    pub id: TaskId,
    /// Short title.
    #[serde(deserialize_with = "lenient::null_as_default")]
    pub title: String,
    /// Free-form description, possibly empty.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub description: String,
    /// User id of the assignee.
    #[serde(
        default,
        alias = "assignedTo",
        deserialize_with = "lenient::user_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub assignee: Option<String>,
    /// Category label.
    #[serde(default, deserialize_with = "lenient::null_as_default")]
    pub category: String,
    /// Day the task is due.
    #[serde(
        default,
        deserialize_with = "lenient::date",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<NaiveDate>,
    /// Priority, if set.
    #[serde(
        default,
        deserialize_with = "lenient::priority",
        skip_serializing_if = "Option::is_none"
    )]
    pub priority: Option<Priority>,
    /// Current status.
    #[serde(default, deserialize_with = "lenient::status")]
    pub status: TaskStatus,
    /// Recurrence tag.
    #[serde(default, deserialize_with = "lenient::frequency")]
    pub frequency: Frequency,
    /// Structured recurrence detail (days of week, interval, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_details: Option<Value>,
    /// Attached file.
    #[serde(
        default,
        alias = "file",
        deserialize_with = "lenient::attachment",
        skip_serializing_if = "Option::is_none"
    )]
    pub attachment: Option<Attachment>,
    /// Comments, oldest first.
    #[serde(
        default,
        deserialize_with = "lenient::null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub comments: Vec<Comment>,
    /// User id of the creator (the delegator).
    #[serde(
        default,
        alias = "assignedBy",
        deserialize_with = "lenient::user_ref",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_by: Option<String>,
    /// Creation time.
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub created_at: Option<DateTime<Utc>>,
    /// Last modification time.
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub updated_at: Option<DateTime<Utc>>,
    /// Wire fields the model does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    /// Creates a task with the given identity and title and default attributes.
    pub fn new(id: impl Into<TaskId>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            assignee: None,
            category: String::new(),
            due_date: None,
            priority: None,
            status: TaskStatus::default(),
            frequency: Frequency::default(),
            frequency_details: None,
            attachment: None,
            comments: Vec::new(),
            created_by: None,
            created_at: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    /// Decodes a wire record into a task.
    ///
    /// The identifier is resolved from whichever legacy field carries it and
    /// all identifier candidates are removed, so they never leak into
    /// [`Task::extra`].
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError::NotAnObject`] for non-object records,
    /// [`DecodeError::MissingId`] when no identifier is present, and
    /// [`DecodeError::Json`] when the remaining fields are malformed
    /// (for example a missing title).
    pub fn from_value(record: Value) -> Result<Self, DecodeError> {
        let Value::Object(mut object) = record else {
            return Err(DecodeError::NotAnObject);
        };
        let id = extract_id_from_object(&object).ok_or(DecodeError::MissingId)?;
        for field in ID_FIELDS {
            object.remove(field);
        }
        object.insert("id".to_string(), Value::String(id.into_string()));
        Ok(serde_json::from_value(Value::Object(object))?)
    }
}

/// Payload for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDraft {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    pub frequency: Frequency,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl TaskDraft {
    /// Creates a draft with only a title set.
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Checks the draft before it is sent anywhere.
    ///
    /// # Errors
    ///
    /// Returns [`DraftError::EmptyTitle`] if the title is blank.
    pub fn validate(&self) -> Result<(), DraftError> {
        if self.title.trim().is_empty() {
            return Err(DraftError::EmptyTitle);
        }
        Ok(())
    }

    /// Materializes the draft as a task with the given identity.
    #[must_use]
    pub fn into_task(self, id: TaskId) -> Task {
        Task {
            description: self.description,
            assignee: self.assignee,
            category: self.category,
            due_date: self.due_date,
            priority: self.priority,
            status: self.status.unwrap_or_default(),
            frequency: self.frequency,
            frequency_details: self.frequency_details,
            attachment: self.attachment,
            ..Task::new(id, self.title)
        }
    }
}

/// Partial update for an existing task. Never carries an identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<Frequency>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency_details: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
}

impl TaskPatch {
    /// Returns `true` if the patch changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Writes every field present in the patch onto `task`.
    ///
    /// The task's identity is left untouched.
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title.clone_from(title);
        }
        if let Some(description) = &self.description {
            task.description.clone_from(description);
        }
        if let Some(assignee) = &self.assignee {
            task.assignee = Some(assignee.clone());
        }
        if let Some(category) = &self.category {
            task.category.clone_from(category);
        }
        if let Some(due_date) = self.due_date {
            task.due_date = Some(due_date);
        }
        if let Some(priority) = self.priority {
            task.priority = Some(priority);
        }
        if let Some(status) = &self.status {
            task.status = status.clone();
        }
        if let Some(frequency) = self.frequency {
            task.frequency = frequency;
        }
        if let Some(details) = &self.frequency_details {
            task.frequency_details = Some(details.clone());
        }
        if let Some(attachment) = &self.attachment {
            task.attachment = Some(attachment.clone());
        }
    }
}

/// Field deserializers that accept the legacy wire spellings.
///
/// Each one reads a generic [`Value`] first so that unexpected shapes turn
/// into a default instead of failing the whole record.
pub(crate) mod lenient {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    use super::{Attachment, Frequency, Priority, TaskStatus};
    use crate::identity::extract_id_from_object;

    pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: Default + Deserialize<'de>,
    {
        Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
    }

    /// A user reference: a plain id, an embedded user object, or (legacy)
    /// an array of either, of which only the first entry counts.
    pub fn user_ref<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(user_from_value(&Value::deserialize(deserializer)?))
    }

    fn user_from_value(value: &Value) -> Option<String> {
        match value {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Object(object) => extract_id_from_object(object).map(|id| id.into_string()),
            Value::Array(items) => items.first().and_then(user_from_value),
            _ => None,
        }
    }

    pub fn timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => parse_timestamp(&s),
            Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
            _ => None,
        })
    }

    fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
            return Some(parsed.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .ok()
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .ok()
                .or_else(|| parse_timestamp(&s).map(|ts| ts.date_naive())),
            Value::Number(n) => n
                .as_i64()
                .and_then(DateTime::from_timestamp_millis)
                .map(|ts| ts.date_naive()),
            _ => None,
        })
    }

    pub fn priority<'de, D>(deserializer: D) -> Result<Option<Priority>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().ok(),
            _ => None,
        })
    }

    pub fn status<'de, D>(deserializer: D) -> Result<TaskStatus, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) if !s.is_empty() => TaskStatus::new(s),
            _ => TaskStatus::default(),
        })
    }

    pub fn frequency<'de, D>(deserializer: D) -> Result<Frequency, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(s) => s.parse().unwrap_or_default(),
            _ => Frequency::default(),
        })
    }

    /// An attachment object, or a bare URL string.
    pub fn attachment<'de, D>(deserializer: D) -> Result<Option<Attachment>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Value::deserialize(deserializer)? {
            Value::String(url) if !url.is_empty() => Some(Attachment {
                name: url.rsplit('/').next().unwrap_or_default().to_string(),
                url,
                mime_type: None,
            }),
            value @ Value::Object(_) => serde_json::from_value(value).ok(),
            _ => None,
        })
    }
}
