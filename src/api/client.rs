use chrono::Local;
use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::future::Future;
use std::time::Duration;
use url::Url;

use crate::config::Config;

use super::requests::{
  ComposeRequest, CreateEventRequest, CreateTaskFromThreadRequest, CreateTaskRequest,
  MessageModifyRequest, SectionRequest, TaskModifyRequest, ThreadModifyRequest,
};
use super::types::{EmailThread, Event, LinkedAccount, Message, TaskSection};

/// HTTP verbs the backend uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
  Get,
  Post,
  Patch,
  Delete,
}

/// A single backend request, independent of the HTTP stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the API base, e.g. `/tasks/v3/`
  pub path: String,
  pub query: Vec<(String, String)>,
  pub body: Option<Value>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::Get,
      path: path.into(),
      query: Vec::new(),
      body: None,
    }
  }

  pub fn delete(path: impl Into<String>) -> Self {
    Self {
      method: Method::Delete,
      ..Self::get(path)
    }
  }

  pub fn post(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
    Ok(Self {
      method: Method::Post,
      body: Some(serde_json::to_value(body)?),
      ..Self::get(path)
    })
  }

  pub fn patch(path: impl Into<String>, body: &impl Serialize) -> Result<Self> {
    Ok(Self {
      method: Method::Patch,
      body: Some(serde_json::to_value(body)?),
      ..Self::get(path)
    })
  }

  pub fn with_query(mut self, name: &str, value: impl ToString) -> Self {
    self.query.push((name.to_string(), value.to_string()));
    self
  }
}

/// Request/response transport to the backend.
pub trait Transport: Clone + Send + Sync + 'static {
  /// Send `request` and return the decoded JSON response body
  /// (`Value::Null` for an empty body).
  fn send(&self, request: ApiRequest) -> impl Future<Output = Result<Value>> + Send;
}

/// Transport over `reqwest` with bearer authentication.
#[derive(Clone)]
pub struct HttpTransport {
  http: reqwest::Client,
  base: Url,
  token: String,
}

impl HttpTransport {
  pub fn new(config: &Config) -> Result<Self> {
    let token = Config::get_api_token()?;

    let mut base = Url::parse(&config.api.url)
      .map_err(|e| eyre!("Invalid API url {}: {}", config.api.url, e))?;
    // Url::join replaces the last segment unless the base ends with '/'
    if !base.path().ends_with('/') {
      let path = format!("{}/", base.path());
      base.set_path(&path);
    }

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base, token })
  }

  fn url(&self, path: &str) -> Result<Url> {
    self
      .base
      .join(path.trim_start_matches('/'))
      .map_err(|e| eyre!("Invalid request path {}: {}", path, e))
  }
}

/// Minutes to add to local time to get UTC, as browsers report it.
fn timezone_offset_minutes() -> i32 {
  -Local::now().offset().local_minus_utc() / 60
}

impl Transport for HttpTransport {
  async fn send(&self, request: ApiRequest) -> Result<Value> {
    let method = match request.method {
      Method::Get => reqwest::Method::GET,
      Method::Post => reqwest::Method::POST,
      Method::Patch => reqwest::Method::PATCH,
      Method::Delete => reqwest::Method::DELETE,
    };

    let mut builder = self
      .http
      .request(method, self.url(&request.path)?)
      .bearer_auth(&self.token)
      .header("Timezone-Offset", timezone_offset_minutes().to_string())
      .query(&request.query);
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    if bytes.is_empty() {
      return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)?)
  }
}

/// Typed client for the backend REST API.
///
/// Each call fails with an error naming the operation; response details
/// are appended for logs only.
#[derive(Clone)]
pub struct ApiClient<T: Transport> {
  transport: T,
}

impl<T: Transport> ApiClient<T> {
  pub fn new(transport: T) -> Self {
    Self { transport }
  }

  async fn call<R: DeserializeOwned>(&self, operation: &str, request: Result<ApiRequest>) -> Result<R> {
    let request = request.map_err(|e| eyre!("{} failed: {}", operation, e))?;
    let value = self
      .transport
      .send(request)
      .await
      .map_err(|e| eyre!("{} failed: {}", operation, e))?;
    serde_json::from_value(value).map_err(|e| eyre!("{} failed: {}", operation, e))
  }

  // Tasks

  /// Get every task section with its tasks
  pub async fn get_tasks(&self) -> Result<Vec<TaskSection>> {
    self.call("get_tasks", Ok(ApiRequest::get("/tasks/v3/"))).await
  }

  /// Ask the server to pull tasks from linked accounts
  pub async fn fetch_external_tasks(&self) -> Result<Value> {
    self
      .call("fetch_external_tasks", Ok(ApiRequest::get("/tasks/fetch/")))
      .await
  }

  pub async fn create_task(&self, body: &CreateTaskRequest) -> Result<Value> {
    self
      .call("create_task", ApiRequest::post("/tasks/create/gt_task/", body))
      .await
  }

  pub async fn create_task_from_thread(
    &self,
    thread_id: &str,
    body: &CreateTaskFromThreadRequest,
  ) -> Result<Value> {
    let path = format!("/create_task_from_thread/{}/", thread_id);
    self
      .call("create_task_from_thread", ApiRequest::post(path, body))
      .await
  }

  /// Patch a task; `operation` names the user action for error reporting
  pub async fn modify_task(
    &self,
    operation: &str,
    task_id: &str,
    body: &TaskModifyRequest,
  ) -> Result<Value> {
    let path = format!("/tasks/modify/{}/", task_id);
    self.call(operation, ApiRequest::patch(path, body)).await
  }

  // Sections

  pub async fn create_section(&self, body: &SectionRequest) -> Result<Value> {
    self
      .call("create_section", ApiRequest::post("/sections/create/", body))
      .await
  }

  pub async fn modify_section(&self, section_id: &str, body: &SectionRequest) -> Result<Value> {
    let path = format!("/sections/modify/{}/", section_id);
    self.call("modify_section", ApiRequest::patch(path, body)).await
  }

  pub async fn delete_section(&self, section_id: &str) -> Result<Value> {
    let path = format!("/sections/delete/{}/", section_id);
    self.call("delete_section", Ok(ApiRequest::delete(path))).await
  }

  // Threads and messages

  pub async fn get_threads(&self, page: u32, limit: u32) -> Result<Vec<EmailThread>> {
    let request = ApiRequest::get("/threads/")
      .with_query("page", page)
      .with_query("limit", limit);
    self.call("get_threads", Ok(request)).await
  }

  pub async fn modify_thread(&self, thread_id: &str, body: &ThreadModifyRequest) -> Result<Value> {
    let path = format!("/threads/modify/{}/", thread_id);
    self.call("modify_thread", ApiRequest::patch(path, body)).await
  }

  pub async fn get_messages(&self, page: u32, limit: u32) -> Result<Vec<Message>> {
    let request = ApiRequest::get("/messages/v2/")
      .with_query("page", page)
      .with_query("limit", limit);
    self.call("get_messages", Ok(request)).await
  }

  /// Ask the server to pull new mail from linked accounts
  pub async fn fetch_messages(&self) -> Result<Value> {
    self
      .call("fetch_messages", Ok(ApiRequest::get("/messages/fetch/")))
      .await
  }

  pub async fn modify_message(
    &self,
    operation: &str,
    message_id: &str,
    body: &MessageModifyRequest,
  ) -> Result<Value> {
    let path = format!("/messages/modify/{}/", message_id);
    self.call(operation, ApiRequest::patch(path, body)).await
  }

  pub async fn compose_message(&self, body: &ComposeRequest) -> Result<Value> {
    self
      .call("compose_message", ApiRequest::post("/messages/compose/", body))
      .await
  }

  // Events

  pub async fn get_events(&self, start: &str, end: &str) -> Result<Vec<Event>> {
    let request = ApiRequest::get("/events/")
      .with_query("datetime_start", start)
      .with_query("datetime_end", end);
    self.call("get_events", Ok(request)).await
  }

  pub async fn create_event(&self, body: &CreateEventRequest) -> Result<Value> {
    self
      .call("create_event", ApiRequest::post("/events/create/gcal/", body))
      .await
  }

  // Linked accounts

  pub async fn get_linked_accounts(&self) -> Result<Vec<LinkedAccount>> {
    self
      .call("get_linked_accounts", Ok(ApiRequest::get("/linked_accounts/")))
      .await
  }

  pub async fn delete_linked_account(&self, account_id: &str) -> Result<Value> {
    let path = format!("/linked_accounts/{}/", account_id);
    self
      .call("delete_linked_account", Ok(ApiRequest::delete(path)))
      .await
  }
}
