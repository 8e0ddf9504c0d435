use chrono::Utc;
use color_eyre::Result;
use std::sync::atomic::Ordering;
use tracing::{debug, error, info, warn};

use super::SyncClient;
use crate::api::requests::{ComposeRequest, MessageModifyRequest, ThreadModifyRequest};
use crate::api::types::{Email, EmailThread, Message, Pages, Sender, PLACEHOLDER_MESSAGE_ID};
use crate::api::Transport;
use crate::cache::{CacheStore, QueryKey};

/// Subject shown on a reply sent without one.
pub const DEFAULT_SUBJECT: &str = "(no subject)";

/// Display name of the local user on a reply still being sent.
pub const DEFAULT_SENDER: &str = "Me";

/// Timer key prefix shared by every undoable send.
const SEND_KEY_PREFIX: &str = "send:";

/// Handle to a send that is waiting out its undo window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
  key: String,
}

impl PendingSend {
  pub fn key(&self) -> &str {
    &self.key
  }
}

fn placeholder_reply(request: &ComposeRequest) -> Email {
  let subject = if request.subject.is_empty() {
    DEFAULT_SUBJECT.to_string()
  } else {
    request.subject.clone()
  };
  Email {
    message_id: PLACEHOLDER_MESSAGE_ID.to_string(),
    subject,
    body: request.body.clone(),
    sent_at: Utc::now().to_rfc3339(),
    is_unread: false,
    sender: Sender {
      name: DEFAULT_SENDER.to_string(),
      email: request.source_account_id.clone(),
      reply_to: String::new(),
    },
    recipients: request.recipients.clone(),
  }
}

/// Splice `reply` right after the email `parent_id` in whichever thread
/// holds it.
fn insert_reply(threads: &mut Pages<EmailThread>, parent_id: &str, reply: Email) -> bool {
  for thread in threads.iter_mut() {
    if let Some(index) = thread.emails.iter().position(|e| e.message_id == parent_id) {
      thread.emails.insert(index + 1, reply);
      return true;
    }
  }
  false
}

fn flip_thread(threads: &mut Pages<EmailThread>, thread_id: &str, changes: &ThreadModifyRequest) -> bool {
  let Some(thread) = threads.iter_mut().find(|t| t.id == thread_id) else {
    return false;
  };
  if let Some(is_task) = changes.is_task {
    thread.is_task = is_task;
  }
  if let Some(is_archived) = changes.is_archived {
    thread.is_archived = is_archived;
  }
  if let Some(is_unread) = changes.is_unread {
    for email in thread.emails.iter_mut() {
      email.is_unread = is_unread;
    }
  }
  true
}

fn flip_message(messages: &mut Pages<Message>, message_id: &str, changes: &MessageModifyRequest) -> bool {
  let Some(message) = messages.iter_mut().find(|m| m.id == message_id) else {
    return false;
  };
  if let Some(is_read) = changes.is_read {
    message.is_unread = !is_read;
  }
  if let Some(is_task) = changes.is_task {
    message.is_task = is_task;
  }
  true
}

impl<T: Transport, S: CacheStore> SyncClient<T, S> {
  /// Update a thread's task, archived or unread flags.
  pub async fn modify_thread(&self, thread_id: &str, changes: &ThreadModifyRequest) -> Result<()> {
    info!(thread_id = %thread_id, "modifying thread");
    let applied = self
      .cache
      .mutate(&QueryKey::email_threads(), |threads: &mut Pages<EmailThread>| {
        flip_thread(threads, thread_id, changes)
      });
    if applied != Some(true) {
      debug!(thread_id = %thread_id, "thread not cached");
    }

    let result = self.api.modify_thread(thread_id, changes).await;
    let mut affected = vec![QueryKey::email_threads()];
    if changes.is_task.is_some() {
      affected.push(QueryKey::tasks());
    }
    self.settle(&affected).await;
    result.map(|_| ())
  }

  pub async fn mark_message_read(&self, message_id: &str, is_read: bool) -> Result<()> {
    let changes = MessageModifyRequest {
      is_read: Some(is_read),
      ..Default::default()
    };
    self
      .modify_message("mark_message_read", message_id, &changes, &[QueryKey::messages()])
      .await
  }

  pub async fn mark_message_as_task(&self, message_id: &str, is_task: bool) -> Result<()> {
    let changes = MessageModifyRequest {
      is_task: Some(is_task),
      ..Default::default()
    };
    self
      .modify_message(
        "mark_message_as_task",
        message_id,
        &changes,
        &[QueryKey::messages(), QueryKey::tasks()],
      )
      .await
  }

  async fn modify_message(
    &self,
    operation: &str,
    message_id: &str,
    changes: &MessageModifyRequest,
    affected: &[QueryKey],
  ) -> Result<()> {
    info!(message_id = %message_id, operation, "modifying message");
    let applied = self
      .cache
      .mutate(&QueryKey::messages(), |messages: &mut Pages<Message>| {
        flip_message(messages, message_id, changes)
      });
    if applied != Some(true) {
      debug!(message_id = %message_id, "message not cached");
    }

    let result = self.api.modify_message(operation, message_id, changes).await;
    self.settle(affected).await;
    result.map(|_| ())
  }

  /// Send an email, showing it in its thread right away when it is a reply.
  pub async fn compose_message(&self, request: &ComposeRequest) -> Result<()> {
    info!(reply = request.message_id.is_some(), "sending message");
    if let Some(parent_id) = &request.message_id {
      let reply = placeholder_reply(request);
      let applied = self
        .cache
        .mutate(&QueryKey::email_threads(), |threads: &mut Pages<EmailThread>| {
          insert_reply(threads, parent_id, reply)
        });
      if applied != Some(true) {
        debug!(parent_id = %parent_id, "parent email not cached");
      }
    }

    let result = self.api.compose_message(request).await;
    if let Err(e) = self.api.fetch_messages().await {
      warn!(error = %e, "server-side message fetch failed");
    }
    self
      .settle(&[QueryKey::email_threads(), QueryKey::messages()])
      .await;
    result.map(|_| ())
  }

  /// Send `request` once the undo window has passed.
  ///
  /// `on_settled` receives the outcome of the send if it goes out; it is
  /// never called for an undone send.
  pub fn send_with_undo<F>(&self, request: ComposeRequest, on_settled: F) -> PendingSend
  where
    F: FnOnce(Result<()>) + Send + 'static,
  {
    let id = self.next_send.fetch_add(1, Ordering::Relaxed);
    let key = format!("{}{}", SEND_KEY_PREFIX, id);
    let client = self.clone();
    let send_key = key.clone();
    self
      .timers
      .schedule(key.clone(), self.settings.email_undo_delay(), async move {
        let result = client.compose_message(&request).await;
        if let Err(e) = &result {
          error!(send = %send_key, error = %e, "delayed send failed");
        }
        on_settled(result);
      });
    info!(send = %key, "send scheduled");
    PendingSend { key }
  }

  /// Cancel a pending send. Returns false if it already went out.
  pub fn undo_send(&self, pending: &PendingSend) -> bool {
    let undone = self.timers.cancel(&pending.key);
    info!(send = %pending.key, undone, "undo send");
    undone
  }

  /// Whether any send is still in its undo window or going out.
  pub fn has_pending_sends(&self) -> bool {
    self.timers.has_outstanding(SEND_KEY_PREFIX)
  }

  /// Wait until every scheduled send has gone out or been undone.
  pub async fn flush_sends(&self) {
    self.timers.drain(SEND_KEY_PREFIX).await;
  }
}
