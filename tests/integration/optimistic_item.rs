//! Integration tests for optimistic task-card mutations.
//!
//! A card shows its status change or delete immediately, then either keeps
//! it (reconciled with the server's copy) or restores the exact previous
//! view when the server rejects it.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use chrono::NaiveDate;
use tokio::sync::mpsc;

use taskdesk::api::memory::{Endpoint, MemoryTaskApi};
use taskdesk::api::{ApiError, ErrorKind};
use taskdesk::cache::{ListName, TaskCache};
use taskdesk::optimistic::{ItemEvent, MutationKind, OptimisticError, OptimisticItem};
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Priority, Task, TaskStatus};

fn card_task() -> Task {
    let mut task = Task::new("t1", "Quarterly report");
    task.priority = Some(Priority::High);
    task.due_date = NaiveDate::from_ymd_opt(2024, 10, 1);
    task.assignee = Some("me".to_string());
    task
}

fn server() -> MemoryTaskApi {
    MemoryTaskApi::with_tasks("me", vec![card_task(), Task::new("t2", "Other")])
}

/// Polls `fut` briefly so it reaches its first suspension point.
async fn start<F: std::future::Future + Unpin>(fut: &mut F) {
    let _ = tokio::time::timeout(Duration::from_millis(20), fut).await;
}

// ---------------------------------------------------------------------------
// Status change
// ---------------------------------------------------------------------------

#[tokio::test]
async fn status_change_shows_immediately() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let gate = api.hold_next(Endpoint::ChangeStatus);

    let change = item.change_status(&api, TaskStatus::new(TaskStatus::COMPLETED));
    tokio::pin!(change);
    start(&mut change).await;

    let pending = item.view();
    assert_eq!(pending.task.status.as_str(), TaskStatus::COMPLETED);
    assert_eq!(pending.pending, Some(MutationKind::StatusChange));
    assert!(item.is_busy());

    gate.release();
    let settled = change.await.unwrap();
    assert_eq!(settled.task.status.as_str(), TaskStatus::COMPLETED);
    assert!(settled.pending.is_none());
    assert!(!item.is_busy());
}

#[tokio::test]
async fn failed_status_change_restores_exact_view() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let before = item.view();
    api.fail_next(
        Endpoint::ChangeStatus,
        ApiError::new(ErrorKind::Server)
            .with_status(500)
            .with_message("Database unavailable"),
    );

    let err = item
        .change_status(&api, TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap_err();

    assert_eq!(item.view(), before);
    let OptimisticError::RolledBack { id, kind, source } = &err else {
        panic!("expected rollback, got {err:?}");
    };
    assert_eq!(id.as_str(), "t1");
    assert_eq!(*kind, MutationKind::StatusChange);
    assert_eq!(source.kind, ErrorKind::Server);
    assert_eq!(err.user_message(), "Database unavailable");
}

#[tokio::test]
async fn server_copy_wins_after_confirmation() {
    let api = server();
    // The server knows a newer title than the card does.
    let mut newer = card_task();
    newer.title = "Quarterly report (final)".to_string();
    api.seed(newer);

    let item = OptimisticItem::new(card_task());
    let view = item
        .change_status(&api, TaskStatus::new(TaskStatus::IN_PROGRESS))
        .await
        .unwrap();

    assert_eq!(view.task.title, "Quarterly report (final)");
    assert_eq!(view.task.status.as_str(), TaskStatus::IN_PROGRESS);
    assert!(view.task.updated_at.is_some());
}

#[tokio::test]
async fn empty_confirmation_keeps_local_change() {
    let api = server();
    api.set_status_echo(false);
    let item = OptimisticItem::new(card_task());

    let view = item
        .change_status(&api, TaskStatus::new(TaskStatus::DELAYED))
        .await
        .unwrap();

    let mut expected = card_task();
    expected.status = TaskStatus::new(TaskStatus::DELAYED);
    assert_eq!(view.task, expected);
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_hides_then_confirms() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let gate = api.hold_next(Endpoint::Delete);

    let delete = item.delete(&api);
    tokio::pin!(delete);
    start(&mut delete).await;

    let pending = item.view();
    assert!(!pending.is_visible());
    assert!(pending.is_deleting());

    gate.release();
    let settled = delete.await.unwrap();
    assert!(!settled.is_visible());
    assert!(!settled.is_deleting());
    assert!(api.task(&TaskId::new("t1")).is_none());
}

#[tokio::test]
async fn delete_of_task_gone_on_server_stays_hidden() {
    let api = MemoryTaskApi::new("me");
    let (tx, mut rx) = mpsc::unbounded_channel();
    let item = OptimisticItem::new(card_task()).with_owner(tx);

    let view = item.delete(&api).await.unwrap();

    assert!(!view.is_visible());
    assert!(!item.is_busy());
    assert_eq!(rx.recv().await.unwrap(), ItemEvent::Removed(TaskId::new("t1")));
    assert_eq!(api.calls(Endpoint::Delete), 1);
}

#[tokio::test]
async fn dropped_delete_makes_card_reappear() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let before = item.view();
    let _gate = api.hold_next(Endpoint::Delete);

    let abandoned = tokio::time::timeout(Duration::from_millis(20), item.delete(&api)).await;
    assert!(abandoned.is_err());

    assert_eq!(item.view(), before);
    assert!(!item.is_busy());
    item.delete(&api).await.unwrap();
    assert!(api.task(&TaskId::new("t1")).is_none());
}

#[tokio::test]
async fn failed_delete_reappears() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let before = item.view();
    api.fail_next(
        Endpoint::Delete,
        ApiError::new(ErrorKind::Auth).with_status(403),
    );

    let err = item.delete(&api).await.unwrap_err();

    assert!(matches!(
        err,
        OptimisticError::RolledBack {
            kind: MutationKind::Delete,
            ..
        }
    ));
    assert_eq!(item.view(), before);
    assert!(item.view().is_visible());
    assert!(api.task(&TaskId::new("t1")).is_some());
}

// ---------------------------------------------------------------------------
// Single flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn second_mutation_is_rejected_without_request() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let gate = api.hold_next(Endpoint::ChangeStatus);

    let first = item.change_status(&api, TaskStatus::new(TaskStatus::COMPLETED));
    tokio::pin!(first);
    start(&mut first).await;

    let err = item.delete(&api).await.unwrap_err();
    assert_eq!(err, OptimisticError::Busy(TaskId::new("t1")));
    assert_eq!(api.calls(Endpoint::Delete), 0);

    let err = item
        .change_status(&api, TaskStatus::new(TaskStatus::PENDING))
        .await
        .unwrap_err();
    assert!(matches!(err, OptimisticError::Busy(_)));
    assert_eq!(api.calls(Endpoint::ChangeStatus), 1);

    gate.release();
    let view = first.await.unwrap();
    assert_eq!(view.task.status.as_str(), TaskStatus::COMPLETED);

    // Settled: the item accepts changes again.
    item.delete(&api).await.unwrap();
    assert_eq!(api.calls(Endpoint::Delete), 1);
}

#[tokio::test]
async fn refresh_is_ignored_while_pending() {
    let api = server();
    let item = OptimisticItem::new(card_task());
    let gate = api.hold_next(Endpoint::ChangeStatus);
    api.fail_next(Endpoint::ChangeStatus, ApiError::transport("offline"));

    let change = item.change_status(&api, TaskStatus::new(TaskStatus::COMPLETED));
    tokio::pin!(change);
    start(&mut change).await;

    let mut fresher = card_task();
    fresher.title = "Renamed".to_string();
    assert!(!item.refresh(fresher.clone()));

    gate.release();
    assert!(change.await.is_err());
    assert_eq!(item.view().task, card_task());
    assert!(item.refresh(fresher));
    assert_eq!(item.view().task.title, "Renamed");
}

// ---------------------------------------------------------------------------
// Owner notifications
// ---------------------------------------------------------------------------

#[tokio::test]
async fn owner_receives_outcomes_and_cache_follows() {
    let api = server();
    let cache = TaskCache::new(api.clone());
    cache.fetch(ListName::AllTasks, TaskQuery::new()).await.unwrap();
    cache.fetch(ListName::MyTasks, TaskQuery::new()).await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let item = OptimisticItem::new(card_task()).with_owner(tx);

    item.change_status(&api, TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap();
    let event = rx.recv().await.unwrap();
    let ItemEvent::Updated(task) = &event else {
        panic!("expected update, got {event:?}");
    };
    assert_eq!(task.status.as_str(), TaskStatus::COMPLETED);
    event.apply_to(&cache);
    for list in [ListName::AllTasks, ListName::MyTasks] {
        let held = cache.list(list);
        let t1 = held.iter().find(|t| t.id.as_str() == "t1").unwrap();
        assert_eq!(t1.status.as_str(), TaskStatus::COMPLETED);
    }

    api.fail_next(Endpoint::Delete, ApiError::new(ErrorKind::Server));
    item.delete(&api).await.unwrap_err();
    let event = rx.recv().await.unwrap();
    assert!(matches!(
        &event,
        ItemEvent::RolledBack {
            kind: MutationKind::Delete,
            ..
        }
    ));
    event.apply_to(&cache);
    assert_eq!(cache.list(ListName::AllTasks).len(), 2);

    item.delete(&api).await.unwrap();
    let event = rx.recv().await.unwrap();
    assert_eq!(event, ItemEvent::Removed(TaskId::new("t1")));
    event.apply_to(&cache);
    assert_eq!(cache.list(ListName::AllTasks).len(), 1);
    assert!(cache.list(ListName::MyTasks).is_empty());
}

#[tokio::test]
async fn closed_owner_channel_does_not_fail_mutation() {
    let api = server();
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let item = OptimisticItem::new(card_task()).with_owner(tx);

    assert!(item.delete(&api).await.is_ok());
}

#[tokio::test]
async fn shared_owner_receives_every_outcome() {
    let api = server();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let first = OptimisticItem::new(card_task()).with_owner(tx.clone());
    let second = OptimisticItem::new(Task::new("t2", "Other")).with_owner(tx);

    // Nobody reads until both have settled.
    first.delete(&api).await.unwrap();
    second.delete(&api).await.unwrap();

    assert_eq!(rx.recv().await.unwrap(), ItemEvent::Removed(TaskId::new("t1")));
    assert_eq!(rx.recv().await.unwrap(), ItemEvent::Removed(TaskId::new("t2")));
    assert!(api.is_empty());
}
