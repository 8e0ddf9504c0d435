//! Serde types for request bodies sent to the backend.
//!
//! These mirror the server's expected JSON exactly. Optional fields that
//! are `None` are omitted from the body rather than sent as `null`.

use serde::{Deserialize, Serialize};

use super::types::Recipients;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskRequest {
  pub title: String,
  pub body: String,
  pub id_task_section: String,
}

/// Body of `PATCH /tasks/modify/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskModifyRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub title: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub due_date: Option<String>,
  /// Wire duration (`minutes * 60_000_000`)
  #[serde(skip_serializing_if = "Option::is_none")]
  pub time_duration: Option<u64>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub body: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_completed: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id_task_section: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id_ordering: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateTaskFromThreadRequest {
  pub title: String,
  pub body: String,
  pub email_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRequest {
  pub name: String,
}

/// Body of `PATCH /threads/modify/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadModifyRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_unread: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_archived: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_task: Option<bool>,
}

/// Body of `PATCH /messages/modify/{id}/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageModifyRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_read: Option<bool>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub is_task: Option<bool>,
}

/// Body of `POST /messages/compose/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeRequest {
  /// Email being replied to; absent for a new thread
  #[serde(skip_serializing_if = "Option::is_none")]
  pub message_id: Option<String>,
  pub subject: String,
  pub body: String,
  pub recipients: Recipients,
  pub source_id: String,
  pub source_account_id: String,
}

/// Body of `POST /events/create/gcal/`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateEventRequest {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub summary: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
  pub datetime_start: String,
  pub datetime_end: String,
}
