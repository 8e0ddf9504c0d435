use color_eyre::{eyre::eyre, Result};
use std::io::Write;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::api::requests::{ComposeRequest, ThreadModifyRequest};
use crate::api::types::{Recipient, Recipients};
use crate::api::Transport;
use crate::cache::{CacheStore, QueryKey, Resource};
use crate::commands::{self, Command};
use crate::event::{Event, EventHandler};
use crate::render;
use crate::sync::{PendingSend, Reorder, SyncClient, TaskChanges};

/// Source id the backend expects for mail sent through it
const MAIL_SOURCE_ID: &str = "gmail";

/// Line-oriented shell over the sync client
pub struct App<T: Transport, S: CacheStore> {
  client: SyncClient<T, S>,

  /// Reply waiting out its undo window
  pending_send: Option<PendingSend>,

  /// Event sender for background notices
  event_tx: mpsc::UnboundedSender<Event>,

  should_quit: bool,
}

fn arg<'a>(args: &[&'a str], index: usize, command: &Command) -> Result<&'a str> {
  args
    .get(index)
    .copied()
    .ok_or_else(|| eyre!("usage: {}", command.usage))
}

fn rest(args: &[&str], from: usize, command: &Command) -> Result<String> {
  if args.len() <= from {
    return Err(eyre!("usage: {}", command.usage));
  }
  Ok(args[from..].join(" "))
}

fn number<N: std::str::FromStr>(value: &str, what: &str) -> Result<N> {
  value
    .parse()
    .map_err(|_| eyre!("{} must be a number, got {}", what, value))
}

fn reply_subject(subject: &str) -> String {
  if subject.to_lowercase().starts_with("re:") {
    subject.to_string()
  } else {
    format!("Re: {}", subject)
  }
}

impl<T: Transport, S: CacheStore> App<T, S> {
  pub fn new(client: SyncClient<T, S>) -> Self {
    let (tx, _rx) = mpsc::unbounded_channel();
    Self {
      client,
      pending_send: None,
      event_tx: tx,
      should_quit: false,
    }
  }

  pub async fn run(&mut self) -> Result<()> {
    let mut events = EventHandler::new();
    self.event_tx = events.sender();

    self.load_initial_data().await;
    println!("inboxsync ready. Type 'help' for commands.");
    prompt();

    while !self.should_quit {
      match events.next().await {
        Some(Event::Input(line)) => {
          match self.execute(&line).await {
            Ok(output) if !output.is_empty() => println!("{}", output),
            Ok(_) => {}
            Err(e) => println!("error: {}", e),
          }
          if !self.should_quit {
            prompt();
          }
        }
        Some(Event::Notice(notice)) => {
          println!("\n{}", notice);
          prompt();
        }
        Some(Event::Eof) | None => self.should_quit = true,
      }
    }

    self.finish().await;
    Ok(())
  }

  /// Let every scheduled reply go out before exiting, including ones that
  /// are no longer the undo target.
  pub async fn finish(&mut self) {
    self.pending_send = None;
    if self.client.has_pending_sends() {
      println!("Waiting for pending replies to send...");
      self.client.flush_sends().await;
    }
  }

  /// Warm the task and thread caches concurrently.
  async fn load_initial_data(&self) {
    let (tasks, threads) = futures::join!(self.client.tasks(), self.client.threads());
    if let Err(e) = tasks {
      warn!(error = %e, "initial task load failed");
      println!("Could not load tasks: {}", e);
    }
    if let Err(e) = threads {
      warn!(error = %e, "initial thread load failed");
      println!("Could not load threads: {}", e);
    }
  }

  /// Run one command line and return the text to show.
  pub async fn execute(&mut self, line: &str) -> Result<String> {
    let mut words = line.split_whitespace();
    let Some(word) = words.next() else {
      return Ok(String::new());
    };
    let args: Vec<&str> = words.collect();
    let Some(command) = commands::resolve(word) else {
      return Ok(format!("Unknown command: {}. Type 'help' for commands.", word));
    };
    info!(command = command.name, "executing");

    match command.name {
      "tasks" => Ok(render::tasks(&self.client.tasks().await?)),
      "threads" => Ok(render::threads(&self.client.threads().await?)),
      "more" => Ok(render::threads(&self.client.more_threads().await?)),
      "messages" => Ok(render::messages(&self.client.messages().await?)),
      "accounts" => Ok(render::accounts(&self.client.linked_accounts().await?)),
      "unlink" => {
        let account_id = arg(&args, 0, command)?;
        self.client.delete_linked_account(account_id).await?;
        Ok(format!("Unlinked {}", account_id))
      }
      "add" => {
        let section_id = arg(&args, 0, command)?;
        let title = rest(&args, 1, command)?;
        self.client.create_task(section_id, &title, "").await?;
        Ok(format!("Created \"{}\"", title))
      }
      "edit" => {
        let task_id = arg(&args, 0, command)?;
        let field = arg(&args, 1, command)?;
        let value = rest(&args, 2, command)?;
        let changes = match field {
          "title" => TaskChanges {
            title: Some(value),
            ..Default::default()
          },
          "due" => TaskChanges {
            due_date: Some(value),
            ..Default::default()
          },
          "body" => TaskChanges {
            body: Some(value),
            ..Default::default()
          },
          other => return Err(eyre!("unknown field {}, expected title, due or body", other)),
        };
        self.client.modify_task(task_id, &changes).await?;
        Ok(format!("Updated {}", task_id))
      }
      "estimate" => {
        let task_id = arg(&args, 0, command)?;
        let minutes: u64 = number(arg(&args, 1, command)?, "minutes")?;
        let changes = TaskChanges {
          time_allocated_minutes: Some(minutes),
          ..Default::default()
        };
        self.client.modify_task(task_id, &changes).await?;
        Ok(format!("{} estimated at {}m", task_id, minutes))
      }
      "done" | "undone" => {
        let task_id = arg(&args, 0, command)?;
        let done = command.name == "done";
        self.client.mark_task_done(task_id, None, done).await?;
        Ok(if done {
          format!("Done {}", task_id)
        } else {
          format!("Reopened {}", task_id)
        })
      }
      "move" => {
        let reorder = Reorder {
          task_id: arg(&args, 0, command)?.to_string(),
          to_section: arg(&args, 1, command)?.to_string(),
          position: number(arg(&args, 2, command)?, "position")?,
          from_section: args.get(3).map(|s| s.to_string()),
        };
        self.client.reorder_task(&reorder).await?;
        Ok(format!("Moved {}", reorder.task_id))
      }
      "section-add" => {
        let name = rest(&args, 0, command)?;
        self.client.create_section(&name).await?;
        Ok(format!("Created section \"{}\"", name))
      }
      "section-rename" => {
        let section_id = arg(&args, 0, command)?;
        let name = rest(&args, 1, command)?;
        self.client.rename_section(section_id, &name).await?;
        Ok(format!("Renamed {}", section_id))
      }
      "section-delete" => {
        let section_id = arg(&args, 0, command)?;
        self.client.delete_section(section_id).await?;
        Ok(format!("Deleted section {}", section_id))
      }
      "read" | "unread" => {
        let message_id = arg(&args, 0, command)?;
        let is_read = command.name == "read";
        self.client.mark_message_read(message_id, is_read).await?;
        Ok(format!("Marked {} {}", message_id, command.name))
      }
      "archive" => {
        let thread_id = arg(&args, 0, command)?;
        let changes = ThreadModifyRequest {
          is_archived: Some(true),
          ..Default::default()
        };
        self.client.modify_thread(thread_id, &changes).await?;
        Ok(format!("Archived {}", thread_id))
      }
      "reply" => {
        let message_id = arg(&args, 0, command)?;
        let body = rest(&args, 1, command)?;
        self.reply(message_id, body).await
      }
      "undo" => match self.pending_send.take() {
        Some(pending) if self.client.undo_send(&pending) => Ok("Reply cancelled".to_string()),
        _ => Ok("Nothing to undo".to_string()),
      },
      "refresh" => {
        for resource in [
          Resource::Tasks,
          Resource::EmailThreads,
          Resource::Messages,
          Resource::Events,
          Resource::LinkedAccounts,
        ] {
          self.client.settle(&[QueryKey::from(resource)]).await;
        }
        Ok("Refreshed".to_string())
      }
      "help" => Ok(commands::help_text()),
      "quit" => {
        self.should_quit = true;
        Ok(String::new())
      }
      _ => Ok(format!("{} is not implemented", command.name)),
    }
  }

  /// Schedule an undoable reply to the email `message_id`.
  async fn reply(&mut self, message_id: &str, body: String) -> Result<String> {
    let threads = self.client.threads().await?;
    let (thread, email) = threads
      .iter()
      .find_map(|t| {
        t.emails
          .iter()
          .find(|e| e.message_id == message_id)
          .map(|e| (t, e))
      })
      .ok_or_else(|| eyre!("no loaded email with id {}", message_id))?;

    let to = if email.sender.reply_to.is_empty() {
      email.sender.email.clone()
    } else {
      email.sender.reply_to.clone()
    };
    let request = ComposeRequest {
      message_id: Some(message_id.to_string()),
      subject: reply_subject(&email.subject),
      body,
      recipients: Recipients {
        to: vec![Recipient {
          name: email.sender.name.clone(),
          email: to.clone(),
        }],
        ..Default::default()
      },
      source_id: MAIL_SOURCE_ID.to_string(),
      source_account_id: thread.source.account_id.clone(),
    };

    let tx = self.event_tx.clone();
    let pending = self.client.send_with_undo(request, move |result| {
      let notice = match result {
        Ok(()) => "Reply sent".to_string(),
        Err(e) => format!("Reply failed: {}", e),
      };
      let _ = tx.send(Event::Notice(notice));
    });
    if let Some(previous) = self.pending_send.replace(pending) {
      // Only the latest reply can be undone; earlier ones still go out
      info!(send = %previous.key(), "superseded as undo target");
    }
    Ok(format!("Replying to {}. Type 'undo' to cancel.", to))
  }

  pub fn should_quit(&self) -> bool {
    self.should_quit
  }
}

fn prompt() {
  print!("> ");
  let _ = std::io::stdout().flush();
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::testing::FakeTransport;
  use crate::sync::testing::{cached_tasks, client, load_tasks, section, task_ids, TestClient};
  use serde_json::{json, Value};
  use std::time::Duration;

  fn app(transport: &FakeTransport) -> (App<FakeTransport, crate::cache::MemoryStore>, TestClient) {
    let client = client(transport);
    (App::new(client.clone()), client)
  }

  #[tokio::test]
  async fn test_unknown_and_empty_lines() {
    let transport = FakeTransport::new();
    let (mut app, _) = app(&transport);
    assert_eq!(app.execute("   ").await.unwrap(), "");
    assert!(app.execute("xyzzy").await.unwrap().starts_with("Unknown command"));
  }

  #[tokio::test]
  async fn test_missing_arguments_report_usage() {
    let transport = FakeTransport::new();
    let (mut app, _) = app(&transport);
    let err = app.execute("move t1 today").await.unwrap_err();
    assert_eq!(err.to_string(), "usage: move <task_id> <section_id> <position> [from_section_id]");
    let err = app.execute("estimate t1 soon").await.unwrap_err();
    assert!(err.to_string().contains("minutes must be a number"));
  }

  #[tokio::test]
  async fn test_move_command_reorders_cache() {
    let transport = FakeTransport::new();
    let (mut app, client) = app(&transport);
    load_tasks(&transport, &client, &[section("today", "Today", &["t1", "t2", "t3"])]).await;
    transport.respond("/tasks/modify/t3/", Value::Null);
    transport.fail("/tasks/v3/", "offline");

    app.execute("mv t3 today 1").await.unwrap();
    assert_eq!(task_ids(&cached_tasks(&client)[0]), vec!["t3", "t1", "t2"]);
  }

  #[tokio::test]
  async fn test_add_joins_title_words() {
    let transport = FakeTransport::new();
    let (mut app, client) = app(&transport);
    load_tasks(&transport, &client, &[section("today", "Today", &[])]).await;
    transport.respond("/tasks/create/gt_task/", Value::Null);

    app.execute("add today Call the bank").await.unwrap();
    let sent = transport.requests_to("/tasks/create/gt_task/");
    assert_eq!(sent[0].body.as_ref().unwrap()["title"], json!("Call the bank"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_reply_then_undo() {
    let transport = FakeTransport::new();
    transport.respond(
      "/threads/",
      json!([{
        "id": "th1",
        "source": {"account_id": "me@example.com"},
        "emails": [{"message_id": "42", "subject": "Lunch?", "sender": {"name": "Ann", "email": "ann@example.com"}}]
      }]),
    );
    let (mut app, _) = app(&transport);

    let out = app.execute("reply 42 Sure, noon works").await.unwrap();
    assert!(out.contains("ann@example.com"));
    assert_eq!(app.execute("undo").await.unwrap(), "Reply cancelled");
    assert_eq!(app.execute("undo").await.unwrap(), "Nothing to undo");

    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(transport.requests_to("/messages/compose/").is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_finish_waits_for_slow_replies() {
    let transport = FakeTransport::new();
    transport.respond(
      "/threads/",
      json!([{
        "id": "th1",
        "source": {"account_id": "me@example.com"},
        "emails": [{"message_id": "42", "subject": "Lunch?", "sender": {"name": "Ann", "email": "ann@example.com"}}]
      }]),
    );
    transport.respond("/messages/compose/", Value::Null);
    transport.respond("/messages/fetch/", Value::Null);
    transport.delay("/messages/compose/", Duration::from_secs(5));
    let (mut app, client) = app(&transport);

    app.execute("reply 42 Sure").await.unwrap();
    app.execute("reply 42 Make it one").await.unwrap();

    // both undo windows have passed and the sends are in flight
    tokio::time::sleep(Duration::from_millis(5100)).await;
    assert!(client.has_pending_sends());
    assert!(transport.requests_to("/messages/fetch/").is_empty());

    app.finish().await;
    assert!(!client.has_pending_sends());
    assert_eq!(transport.requests_to("/messages/compose/").len(), 2);
    assert_eq!(transport.requests_to("/messages/fetch/").len(), 2);
  }

  #[tokio::test]
  async fn test_quit() {
    let transport = FakeTransport::new();
    let (mut app, _) = app(&transport);
    app.execute("q").await.unwrap();
    assert!(app.should_quit());
  }

  #[test]
  fn test_reply_subject() {
    assert_eq!(reply_subject("Lunch?"), "Re: Lunch?");
    assert_eq!(reply_subject("RE: Lunch?"), "RE: Lunch?");
  }
}
