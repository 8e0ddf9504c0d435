//! Plain-text rendering of cached collections for the shell.

use crate::api::types::{EmailThread, LinkedAccount, Message, Pages, TaskSection};
use crate::sync::MICROS_PER_MINUTE;

/// Truncate a string to a maximum length, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

fn minutes(time_allocated: u64) -> u64 {
  time_allocated / MICROS_PER_MINUTE
}

pub fn tasks(sections: &[TaskSection]) -> String {
  let mut out = Vec::new();
  for section in sections {
    out.push(format!("[{}] {}", section.id, section.name));
    if section.tasks.is_empty() {
      out.push("    (empty)".to_string());
    }
    for task in &section.tasks {
      let check = if task.is_done { "x" } else { " " };
      let mut line = format!(
        "  {:>2}. [{}] {} ({})",
        task.id_ordering,
        check,
        truncate(&task.title, 60),
        task.id
      );
      if task.time_allocated > 0 {
        line.push_str(&format!(" {}m", minutes(task.time_allocated)));
      }
      if !task.due_date.is_empty() {
        line.push_str(&format!(" due {}", task.due_date));
      }
      out.push(line);
    }
  }
  out.join("\n")
}

pub fn threads(threads: &Pages<EmailThread>) -> String {
  if threads.is_empty() {
    return "No threads".to_string();
  }
  let mut out = Vec::new();
  for thread in threads.iter() {
    let unread = thread.emails.iter().any(|e| e.is_unread);
    let subject = thread
      .emails
      .first()
      .map(|e| e.subject.as_str())
      .unwrap_or("");
    out.push(format!(
      "{} {} ({}) {} email(s){}",
      if unread { "*" } else { " " },
      truncate(subject, 60),
      thread.id,
      thread.emails.len(),
      if thread.is_archived { " archived" } else { "" }
    ));
    for email in &thread.emails {
      let from = if email.sender.name.is_empty() {
        &email.sender.email
      } else {
        &email.sender.name
      };
      out.push(format!("      {} from {}", email.message_id, truncate(from, 40)));
    }
  }
  out.push(format!("{} page(s) loaded", threads.pages.len()));
  out.join("\n")
}

pub fn messages(messages: &Pages<Message>) -> String {
  if messages.is_empty() {
    return "No messages".to_string();
  }
  messages
    .iter()
    .map(|m| {
      format!(
        "{}{} {} ({})",
        if m.is_unread { "*" } else { " " },
        if m.is_task { "T" } else { " " },
        truncate(&m.title, 60),
        m.id
      )
    })
    .collect::<Vec<_>>()
    .join("\n")
}

pub fn accounts(accounts: &[LinkedAccount]) -> String {
  if accounts.is_empty() {
    return "No linked accounts".to_string();
  }
  accounts
    .iter()
    .map(|a| {
      let mut line = format!("{} {} ({})", a.name, a.display_id, a.id);
      if a.has_bad_token {
        line.push_str(" needs relinking");
      }
      line
    })
    .collect::<Vec<_>>()
    .join("\n")
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::api::types::Task;

  #[test]
  fn test_truncate_short_string() {
    assert_eq!(truncate("hello", 10), "hello");
  }

  #[test]
  fn test_truncate_exact_length() {
    assert_eq!(truncate("hello", 5), "hello");
  }

  #[test]
  fn test_truncate_long_string() {
    assert_eq!(truncate("hello world", 8), "hello...");
  }

  #[test]
  fn test_truncate_multibyte() {
    assert_eq!(truncate("héllo wörld", 8), "héllo...");
  }

  #[test]
  fn test_tasks_shows_minutes_and_done() {
    let sections = vec![TaskSection {
      id: "s1".to_string(),
      name: "Today".to_string(),
      is_done: false,
      tasks: vec![Task {
        id: "t1".to_string(),
        id_ordering: 1,
        title: "Write".to_string(),
        time_allocated: 1_800_000_000,
        is_done: true,
        ..Default::default()
      }],
    }];
    let text = tasks(&sections);
    assert!(text.starts_with("[s1] Today"));
    assert!(text.contains(" 1. [x] Write (t1) 30m"));
  }

  #[test]
  fn test_empty_collections() {
    assert_eq!(threads(&Pages::default()), "No threads");
    assert_eq!(messages(&Pages::default()), "No messages");
    assert_eq!(accounts(&[]), "No linked accounts");
  }
}
