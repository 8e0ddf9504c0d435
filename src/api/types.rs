//! Domain types mirroring the backend's JSON payloads.
//!
//! Every type here is owned by the cache store once fetched. Unknown or
//! missing fields fall back to defaults so a partial response never
//! fails the whole query.

use serde::{Deserialize, Serialize};

use crate::ordering::Ordered;

/// Id given to a task that exists only in the cache, pending creation.
pub const PLACEHOLDER_TASK_ID: &str = "0";

/// Id given to a section that exists only in the cache, pending creation.
pub const PLACEHOLDER_SECTION_ID: &str = "-1";

/// Message id of a reply that is still being sent.
pub const PLACEHOLDER_MESSAGE_ID: &str = "0";

/// Id of a thread reference that the server has not resolved yet.
pub const PLACEHOLDER_THREAD_ID: &str = "0";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSource {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub logo: String,
  #[serde(default)]
  pub logo_v2: String,
  #[serde(default)]
  pub is_completable: bool,
  #[serde(default)]
  pub is_replyable: bool,
}

impl TaskSource {
  /// Source attached to tasks created from this client.
  pub fn native() -> Self {
    Self {
      name: "General Task".to_string(),
      logo: String::new(),
      logo_v2: "generaltask".to_string(),
      is_completable: false,
      is_replyable: false,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageSource {
  /// Account the message belongs to (e.g. recipient address)
  #[serde(default)]
  pub account_id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub logo: String,
  #[serde(default)]
  pub logo_v2: String,
  #[serde(default)]
  pub is_completable: bool,
  #[serde(default)]
  pub is_replyable: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sender {
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub email: String,
  #[serde(default)]
  pub reply_to: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
  #[serde(default)]
  pub name: String,
  pub email: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipients {
  #[serde(default)]
  pub to: Vec<Recipient>,
  #[serde(default)]
  pub cc: Vec<Recipient>,
  #[serde(default)]
  pub bcc: Vec<Recipient>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedEmailThread {
  pub linked_thread_id: String,
  #[serde(default)]
  pub email_thread: Option<EmailThread>,
}

/// A task inside a section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
  pub id: String,
  /// 1-based position within the owning section
  #[serde(default)]
  pub id_ordering: u32,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub deeplink: String,
  #[serde(default)]
  pub sent_at: String,
  #[serde(default)]
  pub due_date: String,
  /// Wire units (see `sync::minutes_to_duration`)
  #[serde(default)]
  pub time_allocated: u64,
  #[serde(default)]
  pub is_done: bool,
  #[serde(default)]
  pub source: TaskSource,
  #[serde(default)]
  pub sender: String,
  #[serde(default)]
  pub recipients: Recipients,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub linked_email_thread: Option<LinkedEmailThread>,
}

impl Task {
  /// Whether this task only exists locally, pending creation.
  pub fn is_placeholder(&self) -> bool {
    self.id == PLACEHOLDER_TASK_ID
  }
}

impl Ordered for Task {
  fn ordering(&self) -> u32 {
    self.id_ordering
  }

  fn set_ordering(&mut self, ordering: u32) {
    self.id_ordering = ordering;
  }
}

/// A named group of tasks
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSection {
  pub id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub is_done: bool,
  #[serde(default)]
  pub tasks: Vec<Task>,
}

/// A single email within a thread
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Email {
  pub message_id: String,
  #[serde(default)]
  pub subject: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub sent_at: String,
  #[serde(default)]
  pub is_unread: bool,
  #[serde(default)]
  pub sender: Sender,
  #[serde(default)]
  pub recipients: Recipients,
}

impl Email {
  pub fn is_placeholder(&self) -> bool {
    self.message_id == PLACEHOLDER_MESSAGE_ID
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailThread {
  pub id: String,
  #[serde(default)]
  pub is_task: bool,
  #[serde(default)]
  pub is_archived: bool,
  #[serde(default)]
  pub deeplink: String,
  #[serde(default)]
  pub source: MessageSource,
  #[serde(default)]
  pub emails: Vec<Email>,
}

/// Inbox message (pre-thread representation)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub deeplink: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub sender: String,
  #[serde(default)]
  pub sender_v2: Sender,
  #[serde(default)]
  pub recipients: Recipients,
  #[serde(default)]
  pub sent_at: String,
  #[serde(default)]
  pub is_unread: bool,
  #[serde(default)]
  pub is_task: bool,
  #[serde(default)]
  pub source: MessageSource,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConferenceCall {
  pub platform: String,
  #[serde(default)]
  pub logo: String,
  pub url: String,
}

/// Calendar event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub id: String,
  #[serde(default)]
  pub title: String,
  #[serde(default)]
  pub body: String,
  #[serde(default)]
  pub deeplink: String,
  pub datetime_start: String,
  pub datetime_end: String,
  #[serde(default)]
  pub conference_call: Option<ConferenceCall>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedAccount {
  pub id: String,
  #[serde(default)]
  pub display_id: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub logo: String,
  #[serde(default)]
  pub logo_v2: String,
  #[serde(default)]
  pub is_unlinkable: bool,
  #[serde(default)]
  pub has_bad_token: bool,
}

/// Pages of a paginated query, in fetch order.
///
/// `page_params[i]` is the page number that produced `pages[i]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pages<T> {
  pub pages: Vec<Vec<T>>,
  pub page_params: Vec<u32>,
}

impl<T> Default for Pages<T> {
  fn default() -> Self {
    Self {
      pages: Vec::new(),
      page_params: Vec::new(),
    }
  }
}

impl<T> Pages<T> {
  /// Page number to request next (pages are 1-based).
  pub fn next_page(&self) -> u32 {
    self.pages.len() as u32 + 1
  }

  pub fn push_page(&mut self, page: u32, items: Vec<T>) {
    self.page_params.push(page);
    self.pages.push(items);
  }

  pub fn iter(&self) -> impl Iterator<Item = &T> {
    self.pages.iter().flatten()
  }

  pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
    self.pages.iter_mut().flatten()
  }

  pub fn len(&self) -> usize {
    self.pages.iter().map(Vec::len).sum()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}
