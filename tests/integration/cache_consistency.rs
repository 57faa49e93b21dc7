//! Integration tests for cross-list consistency of the task cache.
//!
//! Verifies that confirmed mutations reach every list holding the task,
//! that lists without the task are never touched, and that failed
//! mutations leave the cache exactly as it was.

#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::similar_names,
    clippy::redundant_clone
)]

use taskdesk::api::memory::{Endpoint, MemoryTaskApi};
use taskdesk::api::{ApiError, ErrorKind};
use taskdesk::cache::{CacheError, CacheEvent, ListName, Operation, TaskCache};
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

const ME: &str = "u-me";

fn task(id: &str, title: &str, assignee: &str, creator: &str) -> Task {
    let mut task = Task::new(id, title);
    task.assignee = Some(assignee.to_string());
    task.created_by = Some(creator.to_string());
    task
}

/// `t1` is assigned to me and delegated by me; `t2` is only assigned to me;
/// `t3` is only delegated by me; `t4` belongs to others.
fn seed() -> Vec<Task> {
    vec![
        task("t1", "Quarterly report", ME, ME),
        task("t2", "Call supplier", ME, "u-boss"),
        task("t3", "Review budget", "u-other", ME),
        task("t4", "Unrelated", "u-other", "u-boss"),
    ]
}

async fn loaded_cache() -> TaskCache<MemoryTaskApi> {
    let cache = TaskCache::new(MemoryTaskApi::with_tasks(ME, seed()));
    for list in [ListName::AllTasks, ListName::MyTasks, ListName::DelegatedTasks] {
        cache.fetch(list, TaskQuery::new()).await.unwrap();
    }
    cache
}

fn ids(tasks: &[Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Create
// ---------------------------------------------------------------------------

#[tokio::test]
async fn created_task_lands_at_head_of_all_and_delegated() {
    let cache = loaded_cache().await;
    cache.api().queue_id("t100");
    let my_tasks_before = cache.list(ListName::MyTasks);

    let created = cache.create(&TaskDraft::new("Report")).await.unwrap();

    assert_eq!(created.id, TaskId::new("t100"));
    assert_eq!(cache.list(ListName::AllTasks)[0].id, TaskId::new("t100"));
    assert_eq!(cache.list(ListName::DelegatedTasks)[0].id, TaskId::new("t100"));
    assert_eq!(cache.list(ListName::MyTasks), my_tasks_before);
    assert!(cache.error(Operation::Create).is_none());
    assert!(!cache.is_loading(Operation::Create));
}

#[tokio::test]
async fn failed_create_changes_no_list() {
    let cache = loaded_cache().await;
    let before = cache.snapshot().lists;
    cache.api().fail_next(
        Endpoint::Create,
        ApiError::new(ErrorKind::Validation)
            .with_status(422)
            .with_field_error("dueDate", "Due date must be in the future"),
    );

    let err = cache.create(&TaskDraft::new("Report")).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Validation));
    assert_eq!(
        err.as_api().unwrap().field_error("dueDate"),
        Some("Due date must be in the future")
    );
    assert_eq!(cache.snapshot().lists, before);
    assert_eq!(cache.error(Operation::Create), Some(err));
}

// ---------------------------------------------------------------------------
// Edit
// ---------------------------------------------------------------------------

#[tokio::test]
async fn edit_reaches_every_holder_and_skips_the_rest() {
    let cache = loaded_cache().await;
    cache
        .search(TaskQuery::new().with("q", "report"))
        .await
        .unwrap();
    cache
        .filter(TaskQuery::new().with("assignee", "u-other"))
        .await
        .unwrap();
    cache.view(&TaskId::new("t1")).await.unwrap();
    let filtered_before = cache.list(ListName::FilteredResults);

    let patch = TaskPatch {
        title: Some("Quarterly report v2".to_string()),
        ..TaskPatch::default()
    };
    let edited = cache.edit(&TaskId::new("t1"), &patch).await.unwrap();

    for list in [
        ListName::AllTasks,
        ListName::MyTasks,
        ListName::DelegatedTasks,
        ListName::SearchResults,
    ] {
        let copy = cache
            .list(list)
            .into_iter()
            .find(|t| t.id == edited.id)
            .unwrap_or_else(|| panic!("t1 missing from {list}"));
        assert_eq!(copy, edited, "stale copy in {list}");
    }
    assert_eq!(cache.current_task(), Some(edited));
    assert_eq!(cache.list(ListName::FilteredResults), filtered_before);
}

#[tokio::test]
async fn edit_preserves_list_order() {
    let cache = loaded_cache().await;
    let patch = TaskPatch {
        description: Some("Call before noon".to_string()),
        ..TaskPatch::default()
    };
    cache.edit(&TaskId::new("t2"), &patch).await.unwrap();
    assert_eq!(ids(&cache.list(ListName::AllTasks)), ["t1", "t2", "t3", "t4"]);
    assert_eq!(ids(&cache.list(ListName::MyTasks)), ["t1", "t2"]);
}

#[tokio::test]
async fn failed_edit_has_no_optimistic_prewrite() {
    let cache = loaded_cache().await;
    let before = cache.snapshot().lists;
    cache
        .api()
        .fail_next(Endpoint::Edit, ApiError::new(ErrorKind::Server).with_status(500));

    let patch = TaskPatch {
        title: Some("Never applied".to_string()),
        ..TaskPatch::default()
    };
    assert!(cache.edit(&TaskId::new("t1"), &patch).await.is_err());
    assert_eq!(cache.snapshot().lists, before);
    assert_eq!(
        cache.error_message(Operation::Edit).as_deref(),
        Some(ErrorKind::Server.fallback_message())
    );
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_prunes_every_list_and_current() {
    let cache = loaded_cache().await;
    cache
        .search(TaskQuery::new().with("q", "quarterly"))
        .await
        .unwrap();
    cache
        .filter(TaskQuery::new().with("assignee", ME))
        .await
        .unwrap();
    cache.view(&TaskId::new("t1")).await.unwrap();
    let mut events = cache.subscribe();

    cache.delete(&TaskId::new("t1")).await.unwrap();

    for list in ListName::ALL {
        assert!(
            cache.list(list).iter().all(|t| t.id != TaskId::new("t1")),
            "t1 still in {list}"
        );
    }
    assert!(cache.current_task().is_none());
    assert_eq!(ids(&cache.list(ListName::AllTasks)), ["t2", "t3", "t4"]);

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert!(seen.contains(&CacheEvent::TaskRemoved(TaskId::new("t1"))));
    assert!(seen.contains(&CacheEvent::CurrentChanged(None)));
}

#[tokio::test]
async fn delete_of_task_held_nowhere_is_harmless() {
    let cache = loaded_cache().await;
    cache.api().seed(task("t9", "Fresh", "u-other", "u-other"));
    let before = cache.snapshot().lists;

    cache.delete(&TaskId::new("t9")).await.unwrap();
    assert_eq!(cache.snapshot().lists, before);
}

#[tokio::test]
async fn failed_delete_changes_nothing() {
    let cache = loaded_cache().await;
    cache.view(&TaskId::new("t1")).await.unwrap();
    let before = cache.snapshot();
    cache
        .api()
        .fail_next(Endpoint::Delete, ApiError::transport("connection reset"));

    let err = cache.delete(&TaskId::new("t1")).await.unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Transport));
    let after = cache.snapshot();
    assert_eq!(after.lists, before.lists);
    assert_eq!(after.current_task, before.current_task);
    assert_eq!(
        after.error(Operation::Delete).map(CacheError::user_message),
        Some("connection reset".to_string())
    );
}

// ---------------------------------------------------------------------------
// Status change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_change_is_visible_in_every_list() {
    let cache = loaded_cache().await;
    cache.api().set_status_echo(false);

    cache
        .change_status(&TaskId::new("t1"), &TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap();

    for list in [ListName::AllTasks, ListName::MyTasks, ListName::DelegatedTasks] {
        let t1 = cache
            .list(list)
            .into_iter()
            .find(|t| t.id == TaskId::new("t1"))
            .unwrap();
        assert_eq!(t1.status, TaskStatus::COMPLETED, "status not updated in {list}");
    }
}

#[tokio::test]
async fn status_change_touches_only_status() {
    let cache = loaded_cache().await;
    cache.api().set_status_echo(false);
    let before = cache.list(ListName::AllTasks);

    cache
        .change_status(&TaskId::new("t3"), &TaskStatus::new(TaskStatus::DELAYED))
        .await
        .unwrap();

    let after = cache.list(ListName::AllTasks);
    assert_eq!(ids(&after), ids(&before));
    for (old, new) in before.iter().zip(&after) {
        if old.id == TaskId::new("t3") {
            let mut expected = old.clone();
            expected.status = TaskStatus::new(TaskStatus::DELAYED);
            assert_eq!(*new, expected);
        } else {
            assert_eq!(new, old);
        }
    }
}

#[tokio::test]
async fn server_echoed_status_and_timestamp_win() {
    let cache = loaded_cache().await;

    let applied = cache
        .change_status(&TaskId::new("t2"), &TaskStatus::new(TaskStatus::IN_PROGRESS))
        .await
        .unwrap();

    assert_eq!(applied, TaskStatus::IN_PROGRESS);
    let server_copy = cache.api().task(&TaskId::new("t2")).unwrap();
    let cached = cache
        .list(ListName::MyTasks)
        .into_iter()
        .find(|t| t.id == TaskId::new("t2"))
        .unwrap();
    assert_eq!(cached.updated_at, server_copy.updated_at);
    assert!(cached.updated_at.is_some());
}

#[tokio::test]
async fn failed_status_change_leaves_lists_alone() {
    let cache = loaded_cache().await;
    let before = cache.snapshot().lists;
    cache
        .api()
        .fail_next(Endpoint::ChangeStatus, ApiError::new(ErrorKind::Auth).with_status(401));

    let err = cache
        .change_status(&TaskId::new("t1"), &TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap_err();

    assert!(err.as_api().unwrap().requires_login());
    assert_eq!(cache.snapshot().lists, before);
    assert!(cache.error(Operation::StatusChange).is_some());
}

// ---------------------------------------------------------------------------
// Fetch failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failed_fetch_clears_list_and_records_server_error() {
    let cache = loaded_cache().await;
    assert!(!cache.list(ListName::MyTasks).is_empty());
    cache.api().fail_next(
        Endpoint::ListAssigned,
        ApiError::new(ErrorKind::Server)
            .with_status(500)
            .with_message("Database unavailable"),
    );

    let err = cache
        .fetch(ListName::MyTasks, TaskQuery::new())
        .await
        .unwrap_err();

    assert_eq!(err.kind(), Some(ErrorKind::Server));
    assert!(cache.list(ListName::MyTasks).is_empty());
    assert!(!cache.is_loading(ListName::MyTasks));
    assert_eq!(
        cache.error_message(ListName::MyTasks).as_deref(),
        Some("Database unavailable")
    );
    // Other lists keep their data.
    assert_eq!(cache.list(ListName::AllTasks).len(), 4);
}

#[tokio::test]
async fn successful_refetch_clears_previous_error() {
    let cache = loaded_cache().await;
    cache
        .api()
        .fail_next(Endpoint::ListAll, ApiError::transport("offline"));
    assert!(cache.fetch(ListName::AllTasks, TaskQuery::new()).await.is_err());

    cache.fetch(ListName::AllTasks, TaskQuery::new()).await.unwrap();
    assert!(cache.error(ListName::AllTasks).is_none());
    assert_eq!(cache.list(ListName::AllTasks).len(), 4);
}
