//! Integration tests for the REST client against a local HTTP server.
//!
//! The server answers each endpoint with a different envelope shape and a
//! few scripted failures, so the tests exercise URL layout, auth headers,
//! envelope unwrapping and error classification end to end.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::needless_pass_by_value)]

use std::collections::HashMap;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path, Query};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch};
use serde_json::{Value, json};

use taskdesk::api::http::{ApiConfig, HttpTaskApi};
use taskdesk::api::{ErrorKind, TaskApi};
use taskdesk::cache::{ListName, TaskCache};
use taskdesk_proto::envelope::StatusEcho;
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{TaskDraft, TaskPatch, TaskStatus};

const TOKEN: &str = "secret-token";

// ---------------------------------------------------------------------------
// Test server
// ---------------------------------------------------------------------------

async fn list_all(headers: HeaderMap) -> Response {
    let expected = format!("Bearer {TOKEN}");
    let presented = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    if presented != Some(expected.as_str()) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Token expired" })),
        )
            .into_response();
    }
    Json(json!([
        { "_id": "a1", "title": "Bare array" },
        { "title": "No identifier" },
        { "_id": "a2", "title": "Second" },
    ]))
    .into_response()
}

async fn list_assigned() -> Json<Value> {
    Json(json!({ "data": [{ "id": "b1", "title": "Under data" }] }))
}

async fn list_delegated() -> Json<Value> {
    Json(json!({ "data": { "tasks": [{ "taskId": "c1", "title": "Under data.tasks" }] } }))
}

async fn search(Query(params): Query<HashMap<String, String>>) -> Json<Value> {
    let term = params.get("q").cloned().unwrap_or_default();
    Json(json!({ "tasks": [{ "id": "s1", "title": term }] }))
}

async fn filter() -> Json<Value> {
    Json(json!({ "unexpected": true }))
}

async fn by_category(Path(name): Path<String>) -> Json<Value> {
    Json(json!([{ "id": "k1", "title": "Categorized", "category": name }]))
}

async fn counts() -> Json<Value> {
    Json(json!({ "data": { "total": 4, "pending": 3, "completed": 1 } }))
}

async fn create(Json(draft): Json<Value>) -> Response {
    let title = draft.get("title").and_then(Value::as_str).unwrap_or_default();
    if title.is_empty() {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({
                "message": "Validation failed",
                "errors": { "title": ["Title is required"] },
            })),
        )
            .into_response();
    }
    let mut record = draft;
    record["_id"] = json!("new1");
    (
        StatusCode::CREATED,
        Json(json!({ "success": true, "data": record })),
    )
        .into_response()
}

async fn view(Path(id): Path<String>) -> Response {
    match id.as_str() {
        "missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({ "message": "Task not found" })),
        )
            .into_response(),
        "gateway" => (StatusCode::BAD_GATEWAY, "<html>Bad gateway</html>").into_response(),
        "slow" => {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Json(json!({ "_id": id, "title": "Late" })).into_response()
        }
        _ => Json(json!({ "data": { "task": { "_id": id, "title": "Viewed" } } })).into_response(),
    }
}

async fn edit(Path(id): Path<String>, Json(patch): Json<Value>) -> Response {
    if id == "broken" {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": { "message": "Database unavailable" } })),
        )
            .into_response();
    }
    Json(json!({ "task": { "id": id, "title": patch["title"] } })).into_response()
}

async fn delete(Path(id): Path<String>) -> StatusCode {
    if id == "missing" {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn change_status(Path(id): Path<String>, Json(body): Json<Value>) -> Response {
    match id.as_str() {
        "quiet" => return StatusCode::NO_CONTENT.into_response(),
        // Echoes only identity and status, and settles on its own value.
        "partial" => {
            return Json(json!({
                "success": true,
                "data": { "_id": id, "status": "in-time", "updatedAt": "2024-10-02T08:30:00Z" },
            }))
            .into_response();
        }
        _ => {}
    }
    Json(json!({
        "data": {
            "_id": id,
            "title": "Status changed",
            "status": body["status"],
            "updatedAt": "2024-10-01T12:00:00Z",
        }
    }))
    .into_response()
}

fn router() -> Router {
    Router::new()
        .route("/api/tasks", get(list_all).post(create))
        .route("/api/tasks/assigned", get(list_assigned))
        .route("/api/tasks/delegated", get(list_delegated))
        .route("/api/tasks/search", get(search))
        .route("/api/tasks/filter", get(filter))
        .route("/api/tasks/counts", get(counts))
        .route("/api/tasks/category/{name}", get(by_category))
        .route("/api/tasks/{id}", get(view).put(edit).delete(delete))
        .route("/api/tasks/{id}/status", patch(change_status))
}

/// Starts the server and returns its API root.
async fn serve() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router()).await.unwrap();
    });
    format!("http://{addr}/api")
}

fn client(base_url: &str, token: Option<&str>) -> HttpTaskApi {
    HttpTaskApi::new(&ApiConfig {
        base_url: base_url.to_string(),
        token: token.map(str::to_string),
        timeout: Duration::from_secs(5),
    })
    .unwrap()
}

async fn authed() -> HttpTaskApi {
    client(&serve().await, Some(TOKEN))
}

fn ids(tasks: &[taskdesk_proto::task::Task]) -> Vec<&str> {
    tasks.iter().map(|t| t.id.as_str()).collect()
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

#[tokio::test]
async fn list_envelopes_are_unwrapped() {
    let api = authed().await;
    let query = TaskQuery::new();

    // Records without an identifier are skipped.
    assert_eq!(ids(&api.list_all_tasks(&query).await.unwrap()), ["a1", "a2"]);
    assert_eq!(ids(&api.list_assigned_to_me(&query).await.unwrap()), ["b1"]);
    assert_eq!(ids(&api.list_delegated_by_me(&query).await.unwrap()), ["c1"]);
    assert!(api.filter_tasks(&query).await.unwrap().is_empty());
}

#[tokio::test]
async fn query_parameters_reach_the_server() {
    let api = authed().await;
    let found = api
        .search_tasks(&TaskQuery::new().with("q", "quarterly report").with("page", 2))
        .await
        .unwrap();
    assert_eq!(found[0].title, "quarterly report");
}

#[tokio::test]
async fn category_segment_is_encoded() {
    let api = authed().await;
    let tasks = api
        .list_by_category("Ops & Admin/2024", &TaskQuery::new())
        .await
        .unwrap();
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].category, "Ops & Admin/2024");
}

#[tokio::test]
async fn record_envelopes_are_unwrapped() {
    let api = authed().await;

    let viewed = api.view_task(&TaskId::new("v1")).await.unwrap();
    assert_eq!(viewed.id.as_str(), "v1");
    assert_eq!(viewed.title, "Viewed");

    let created = api.create_task(&TaskDraft::new("Write report")).await.unwrap();
    assert_eq!(created.id.as_str(), "new1");
    assert_eq!(created.title, "Write report");

    let patch = TaskPatch {
        title: Some("Renamed".to_string()),
        ..TaskPatch::default()
    };
    let edited = api.edit_task(&TaskId::new("e1"), &patch).await.unwrap();
    assert_eq!(edited.id.as_str(), "e1");
    assert_eq!(edited.title, "Renamed");
}

#[tokio::test]
async fn status_change_returns_record_or_nothing() {
    let api = authed().await;
    let status = TaskStatus::new(TaskStatus::COMPLETED);

    let echoed = api
        .change_task_status(&TaskId::new("t1"), &status)
        .await
        .unwrap();
    let StatusEcho::Record(task) = &echoed else {
        panic!("expected full record, got {echoed:?}");
    };
    assert_eq!(task.status, status);
    assert!(task.updated_at.is_some());

    let quiet = api
        .change_task_status(&TaskId::new("quiet"), &status)
        .await
        .unwrap();
    assert!(quiet.is_empty());
}

#[tokio::test]
async fn partial_status_echo_is_honoured() {
    let api = authed().await;
    let echo = api
        .change_task_status(&TaskId::new("partial"), &TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap();
    assert_eq!(echo.status().map(TaskStatus::as_str), Some(TaskStatus::IN_TIME));
    assert!(echo.updated_at().is_some());
}

#[tokio::test]
async fn cache_applies_server_confirmed_status() {
    let cache = TaskCache::new(authed().await);
    let mut held = taskdesk_proto::task::Task::new("partial", "Partial echo");
    held.status = TaskStatus::new(TaskStatus::PENDING);
    cache.set_current(Some(held));

    let applied = cache
        .change_status(&TaskId::new("partial"), &TaskStatus::new(TaskStatus::COMPLETED))
        .await
        .unwrap();

    assert_eq!(applied.as_str(), TaskStatus::IN_TIME);
    let current = cache.current_task().unwrap();
    assert_eq!(current.status.as_str(), TaskStatus::IN_TIME);
    assert!(current.updated_at.is_some());
    assert_eq!(current.title, "Partial echo");
}

#[tokio::test]
async fn counts_are_read_from_nested_object() {
    let api = authed().await;
    let counts = api.task_counts(&TaskQuery::new()).await.unwrap();
    assert_eq!(counts.total, 4);
    assert_eq!(counts.get("pending"), 3);
    assert_eq!(counts.get("completed"), 1);
    assert_eq!(counts.get("overdue"), 0);
}

#[tokio::test]
async fn delete_accepts_empty_body() {
    let api = authed().await;
    api.delete_task(&TaskId::new("t1")).await.unwrap();
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_tolerated() {
    let base = serve().await;
    let api = client(&format!("{base}/"), Some(TOKEN));
    assert_eq!(api.list_all_tasks(&TaskQuery::new()).await.unwrap().len(), 2);
}

// ---------------------------------------------------------------------------
// Error classification
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_token_is_auth_error() {
    let api = client(&serve().await, None);
    let err = api.list_all_tasks(&TaskQuery::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
    assert_eq!(err.status, Some(401));
    assert_eq!(err.user_message(), "Token expired");
    assert!(err.requires_login());
}

#[tokio::test]
async fn validation_error_carries_field_messages() {
    let api = authed().await;
    let err = api.create_task(&TaskDraft::new("")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);
    assert_eq!(err.status, Some(422));
    assert_eq!(err.user_message(), "Validation failed");
    assert_eq!(err.field_error("title"), Some("Title is required"));
}

#[tokio::test]
async fn not_found_and_server_errors() {
    let api = authed().await;

    let err = api.view_task(&TaskId::new("missing")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.user_message(), "Task not found");

    let err = api.delete_task(&TaskId::new("missing")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotFound);
    assert_eq!(err.message, None);

    let err = api
        .edit_task(&TaskId::new("broken"), &TaskPatch::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.user_message(), "Database unavailable");
    assert!(err.kind.is_retryable());
}

#[tokio::test]
async fn non_json_error_body_uses_fallback_message() {
    let api = authed().await;
    let err = api.view_task(&TaskId::new("gateway")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.status, Some(502));
    assert_eq!(err.user_message(), ErrorKind::Server.fallback_message());
}

#[tokio::test]
async fn unreachable_server_is_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let api = client(&format!("http://{addr}/api"), Some(TOKEN));
    let err = api.list_all_tasks(&TaskQuery::new()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.status, None);
}

#[tokio::test]
async fn slow_server_times_out() {
    let api = HttpTaskApi::new(&ApiConfig {
        base_url: serve().await,
        token: Some(TOKEN.to_string()),
        timeout: Duration::from_millis(200),
    })
    .unwrap();
    let err = api.view_task(&TaskId::new("slow")).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Transport);
    assert_eq!(err.user_message(), "The request timed out.");
}

// ---------------------------------------------------------------------------
// Cache over HTTP
// ---------------------------------------------------------------------------

#[tokio::test]
async fn cache_fetches_through_http_client() {
    let cache = TaskCache::new(authed().await);
    cache.fetch(ListName::AllTasks, TaskQuery::new()).await.unwrap();
    cache.fetch(ListName::MyTasks, TaskQuery::new()).await.unwrap();

    assert_eq!(ids(&cache.list(ListName::AllTasks)), ["a1", "a2"]);
    assert_eq!(ids(&cache.list(ListName::MyTasks)), ["b1"]);

    cache.delete(&TaskId::new("a1")).await.unwrap();
    assert_eq!(ids(&cache.list(ListName::AllTasks)), ["a2"]);
}

#[tokio::test]
async fn cache_records_auth_failure() {
    let cache = TaskCache::new(client(&serve().await, None));
    let err = cache
        .fetch(ListName::AllTasks, TaskQuery::new())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), Some(ErrorKind::Auth));
    assert_eq!(
        cache.error_message(ListName::AllTasks).as_deref(),
        Some("Token expired")
    );
}
