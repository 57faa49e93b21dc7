//! REST JSON implementation of [`TaskApi`].
//!
//! Response bodies are read as text and parsed leniently: an empty body is
//! treated as `null`, a non-JSON body as a JSON string. Error responses are
//! classified by status and mined for a message and field errors; list and
//! record bodies go through the tolerant envelope unwrappers.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Value, json};
use url::Url;

use taskdesk_proto::counts::TaskCounts;
use taskdesk_proto::envelope::{self, StatusEcho};
use taskdesk_proto::identity::TaskId;
use taskdesk_proto::query::TaskQuery;
use taskdesk_proto::task::{Task, TaskDraft, TaskPatch, TaskStatus};

use super::{ApiError, ErrorKind, TaskApi};

/// Errors that can occur when building an [`HttpTaskApi`].
#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    /// The base URL could not be parsed.
    #[error("invalid API URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The base URL is not `http` or `https`.
    #[error("unsupported URL scheme: {0}")]
    UnsupportedScheme(String),

    /// The underlying HTTP client could not be created.
    #[error("failed to create HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}

/// Connection settings for [`HttpTaskApi`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    /// Root of the REST API, e.g. `https://example.com/api`.
    pub base_url: String,
    /// Bearer token sent with every request.
    pub token: Option<String>,
    /// Whole-request timeout.
    pub timeout: Duration,
}

/// HTTP client for the task REST API.
#[derive(Debug, Clone)]
pub struct HttpTaskApi {
    client: Client,
    base: Url,
    token: Option<String>,
}

impl HttpTaskApi {
    /// Creates a client for the API rooted at `config.base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError`] if the URL is invalid or not HTTP(S), or
    /// if the HTTP client cannot be built.
    pub fn new(config: &ApiConfig) -> Result<Self, ClientBuildError> {
        let base = Url::parse(&config.base_url)?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientBuildError::UnsupportedScheme(base.scheme().to_string()));
        }
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("taskdesk/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            base,
            token: config.token.clone(),
        })
    }

    /// The API root this client talks to.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    /// Builds `{base}/tasks/{segments...}`, percent-encoding each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::malformed(format!("API URL {} cannot be a base", self.base)))?
            .pop_if_empty()
            .push("tasks")
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, ApiError> {
        let url = self.endpoint(segments)?;
        let builder = self.client.request(method, url);
        Ok(match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    /// Sends the request and returns the parsed body of a 2xx response.
    async fn send(&self, builder: RequestBuilder) -> Result<Value, ApiError> {
        let response = builder.send().await.map_err(|e| {
            tracing::warn!(error = %e, "task API request failed");
            transport_error(&e)
        })?;
        let status = response.status();
        let text = response.text().await.map_err(|e| transport_error(&e))?;
        let body = parse_body(&text);

        if status.is_success() {
            Ok(body)
        } else {
            let err = ApiError::from_response(status.as_u16(), &body);
            tracing::debug!(status = status.as_u16(), kind = %err.kind, "task API error response");
            Err(err)
        }
    }

    async fn get_list(&self, segments: &[&str], query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        let builder = self
            .request(Method::GET, segments)?
            .query(&query.to_query_pairs());
        Ok(envelope::unwrap_task_list(self.send(builder).await?))
    }

    async fn expect_task(&self, builder: RequestBuilder) -> Result<Task, ApiError> {
        envelope::unwrap_task(self.send(builder).await?)
            .ok_or_else(|| ApiError::malformed("response did not contain a task record"))
    }
}

fn transport_error(e: &reqwest::Error) -> ApiError {
    let message = if e.is_timeout() {
        "The request timed out.".to_string()
    } else if e.is_connect() {
        "Could not connect to the server.".to_string()
    } else {
        e.to_string()
    };
    match e.status() {
        Some(status) => ApiError::new(ErrorKind::from_status(status.as_u16()))
            .with_status(status.as_u16())
            .with_message(message),
        None => ApiError::transport(message),
    }
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

impl TaskApi for HttpTaskApi {
    async fn create_task(&self, draft: &TaskDraft) -> Result<Task, ApiError> {
        let builder = self.request(Method::POST, &[])?.json(draft);
        self.expect_task(builder).await
    }

    async fn edit_task(&self, id: &TaskId, patch: &TaskPatch) -> Result<Task, ApiError> {
        let builder = self.request(Method::PUT, &[id.as_str()])?.json(patch);
        self.expect_task(builder).await
    }

    async fn delete_task(&self, id: &TaskId) -> Result<(), ApiError> {
        let builder = self.request(Method::DELETE, &[id.as_str()])?;
        self.send(builder).await.map(drop)
    }

    async fn view_task(&self, id: &TaskId) -> Result<Task, ApiError> {
        let builder = self.request(Method::GET, &[id.as_str()])?;
        self.expect_task(builder).await
    }

    async fn change_task_status(
        &self,
        id: &TaskId,
        status: &TaskStatus,
    ) -> Result<StatusEcho, ApiError> {
        let builder = self
            .request(Method::PATCH, &[id.as_str(), "status"])?
            .json(&json!({ "status": status }));
        Ok(envelope::unwrap_status_echo(self.send(builder).await?))
    }

    async fn list_all_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get_list(&[], query).await
    }

    async fn list_assigned_to_me(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get_list(&["assigned"], query).await
    }

    async fn list_delegated_by_me(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get_list(&["delegated"], query).await
    }

    async fn search_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get_list(&["search"], query).await
    }

    async fn filter_tasks(&self, query: &TaskQuery) -> Result<Vec<Task>, ApiError> {
        self.get_list(&["filter"], query).await
    }

    async fn list_by_category(
        &self,
        category: &str,
        query: &TaskQuery,
    ) -> Result<Vec<Task>, ApiError> {
        self.get_list(&["category", category], query).await
    }

    async fn task_counts(&self, query: &TaskQuery) -> Result<TaskCounts, ApiError> {
        let builder = self
            .request(Method::GET, &["counts"])?
            .query(&query.to_query_pairs());
        Ok(TaskCounts::from_value(&self.send(builder).await?))
    }
}
