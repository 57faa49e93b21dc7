//! Command-line front end over [`TaskCache`].
//!
//! Each command runs one cache operation and prints the affected tasks,
//! one tab-separated line per task: id, status, priority, due date, title.

use std::io::{self, Write};

use chrono::NaiveDate;
use serde_json::Value;

use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Frequency, Priority, Task, TaskDraft, TaskPatch, TaskStatus};

use crate::api::{ErrorKind, TaskApi};
use crate::cache::{CacheError, ListName, TaskCache};

/// Errors from running a command.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The cache operation failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Writing output failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),

    /// A task could not be rendered as JSON.
    #[error("failed to encode task: {0}")]
    Encode(#[from] serde_json::Error),

    /// `edit` was given no fields to change.
    #[error("nothing to change: pass at least one field to edit")]
    NothingToChange,
}

impl CliError {
    /// Message for stderr.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Cache(e) => e.user_message(),
            other => other.to_string(),
        }
    }

    /// Whether the failure means the token is missing or expired.
    #[must_use]
    pub fn requires_login(&self) -> bool {
        matches!(self, Self::Cache(e) if e.as_api().is_some_and(|api| api.requires_login()))
    }

    /// Whether running the same command again may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cache(e) if e.kind().is_some_and(ErrorKind::is_retryable))
    }
}

/// Role-based list to show.
#[derive(clap::ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ListView {
    /// Every task visible to you.
    #[default]
    All,
    /// Tasks assigned to you.
    Mine,
    /// Tasks you delegated.
    Delegated,
}

impl From<ListView> for ListName {
    fn from(view: ListView) -> Self {
        match view {
            ListView::All => Self::AllTasks,
            ListView::Mine => Self::MyTasks,
            ListView::Delegated => Self::DelegatedTasks,
        }
    }
}

/// Subcommands.
#[derive(clap::Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// List tasks.
    List {
        #[arg(value_enum, default_value_t)]
        view: ListView,
        /// Extra query parameters as key=value.
        #[arg(value_parser = TaskQuery::parse_pair)]
        params: Vec<(String, Value)>,
    },
    /// Full-text search.
    Search {
        term: String,
        #[arg(value_parser = TaskQuery::parse_pair)]
        params: Vec<(String, Value)>,
    },
    /// Filter by attributes, e.g. `status=completed priority=High`.
    Filter {
        #[arg(value_parser = TaskQuery::parse_pair)]
        params: Vec<(String, Value)>,
    },
    /// Tasks in one category.
    Category {
        name: String,
        #[arg(value_parser = TaskQuery::parse_pair)]
        params: Vec<(String, Value)>,
    },
    /// Task counts per status.
    Counts {
        #[arg(value_parser = TaskQuery::parse_pair)]
        params: Vec<(String, Value)>,
    },
    /// Show one task as JSON.
    Show { id: String },
    /// Create a task.
    Create {
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        category: Option<String>,
        /// Due date as YYYY-MM-DD.
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        frequency: Option<Frequency>,
    },
    /// Edit fields of a task.
    Edit {
        id: String,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        due: Option<NaiveDate>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long)]
        frequency: Option<Frequency>,
    },
    /// Change a task's status.
    Status { id: String, status: String },
    /// Delete a task.
    Delete { id: String },
}

impl Default for Command {
    fn default() -> Self {
        Self::List {
            view: ListView::All,
            params: Vec::new(),
        }
    }
}

/// Runs `command` against `cache`, writing results to `out`.
///
/// # Errors
///
/// Returns [`CliError`] if the operation fails or output cannot be written.
pub async fn run<A: TaskApi>(
    cache: &TaskCache<A>,
    command: Command,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        Command::List { view, params } => {
            let list = ListName::from(view);
            cache.fetch(list, params.into_iter().collect()).await?;
            write_tasks(out, &cache.list(list))?;
        }
        Command::Search { term, params } => {
            let query = params.into_iter().collect::<TaskQuery>().with("q", term);
            cache.search(query).await?;
            write_tasks(out, &cache.list(ListName::SearchResults))?;
        }
        Command::Filter { params } => {
            cache.filter(params.into_iter().collect()).await?;
            write_tasks(out, &cache.list(ListName::FilteredResults))?;
        }
        Command::Category { name, params } => {
            cache.fetch_category(name, params.into_iter().collect()).await?;
            write_tasks(out, &cache.category_tasks().1)?;
        }
        Command::Counts { params } => {
            cache.fetch_counts(params.into_iter().collect()).await?;
            let counts = cache.task_counts().unwrap_or_default();
            writeln!(out, "total\t{}", counts.total)?;
            for (status, count) in &counts.by_status {
                writeln!(out, "{status}\t{count}")?;
            }
        }
        Command::Show { id } => {
            let task = cache.view(&TaskId::new(id)).await?;
            serde_json::to_writer_pretty(&mut *out, &task)?;
            writeln!(out)?;
        }
        Command::Create {
            title,
            description,
            assignee,
            category,
            due,
            priority,
            frequency,
        } => {
            let draft = TaskDraft {
                description: description.unwrap_or_default(),
                assignee,
                category: category.unwrap_or_default(),
                due_date: due,
                priority,
                frequency: frequency.unwrap_or_default(),
                ..TaskDraft::new(title)
            };
            let task = cache.create(&draft).await?;
            write_tasks(out, &[task])?;
        }
        Command::Edit {
            id,
            title,
            description,
            assignee,
            category,
            due,
            priority,
            frequency,
        } => {
            let patch = TaskPatch {
                title,
                description,
                assignee,
                category,
                due_date: due,
                priority,
                frequency,
                ..TaskPatch::default()
            };
            if patch.is_empty() {
                return Err(CliError::NothingToChange);
            }
            let task = cache.edit(&TaskId::new(id), &patch).await?;
            write_tasks(out, &[task])?;
        }
        Command::Status { id, status } => {
            let id = TaskId::new(id);
            let applied = cache.change_status(&id, &TaskStatus::new(status)).await?;
            writeln!(out, "{id}\t{applied}")?;
        }
        Command::Delete { id } => {
            let id = TaskId::new(id);
            cache.delete(&id).await?;
            writeln!(out, "deleted\t{id}")?;
        }
    }
    Ok(())
}

fn write_tasks(out: &mut impl Write, tasks: &[Task]) -> io::Result<()> {
    for task in tasks {
        writeln!(out, "{}", task_line(task))?;
    }
    Ok(())
}

fn task_line(task: &Task) -> String {
    let priority = task.priority.map_or_else(|| "-".to_string(), |p| p.to_string());
    let due = task
        .due_date
        .map_or_else(|| "-".to_string(), |d| d.format("%Y-%m-%d").to_string());
    format!(
        "{}\t{}\t{priority}\t{due}\t{}",
        task.id, task.status, task.title
    )
}
