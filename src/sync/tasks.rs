use color_eyre::Result;
use std::future::Future;
use tracing::{debug, info};

use super::{minutes_to_duration, SyncClient};
use crate::api::requests::{CreateTaskFromThreadRequest, CreateTaskRequest, TaskModifyRequest};
use crate::api::types::{
  EmailThread, LinkedEmailThread, Task, TaskSection, TaskSource, PLACEHOLDER_TASK_ID,
  PLACEHOLDER_THREAD_ID,
};
use crate::api::Transport;
use crate::cache::{CacheStore, QueryClient, QueryKey};
use crate::ordering::{drop_index, move_in_place, renumber};

/// Fields to overwrite on a task. `None` leaves the field alone; `Some`
/// overwrites it, even with an empty value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
  pub title: Option<String>,
  pub due_date: Option<String>,
  /// Allocated time in minutes
  pub time_allocated_minutes: Option<u64>,
  pub body: Option<String>,
}

impl TaskChanges {
  fn to_request(&self) -> TaskModifyRequest {
    TaskModifyRequest {
      title: self.title.clone(),
      due_date: self.due_date.clone(),
      time_duration: self.time_allocated_minutes.map(minutes_to_duration),
      body: self.body.clone(),
      ..Default::default()
    }
  }

  fn apply(&self, task: &mut Task) {
    if let Some(title) = &self.title {
      task.title = title.clone();
    }
    if let Some(due_date) = &self.due_date {
      task.due_date = due_date.clone();
    }
    if let Some(minutes) = self.time_allocated_minutes {
      task.time_allocated = minutes_to_duration(minutes);
    }
    if let Some(body) = &self.body {
      task.body = body.clone();
    }
  }
}

/// A drag of one task to a new position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reorder {
  pub task_id: String,
  /// 1-based position in the destination section
  pub position: u32,
  pub to_section: String,
  /// Section the task is dragged from; `None` means `to_section`
  pub from_section: Option<String>,
}

fn placeholder_task(title: &str, body: &str) -> Task {
  Task {
    id: PLACEHOLDER_TASK_ID.to_string(),
    title: title.to_string(),
    body: body.to_string(),
    source: TaskSource::native(),
    ..Default::default()
  }
}

/// Prepend `task` to the section with `section_id` and renumber it.
fn prepend_task(sections: &mut [TaskSection], section_id: &str, task: Task) -> bool {
  match sections.iter_mut().find(|s| s.id == section_id) {
    Some(section) => {
      section.tasks.insert(0, task);
      renumber(&mut section.tasks);
      true
    }
    None => false,
  }
}

fn find_task<'a>(sections: &'a mut [TaskSection], task_id: &str) -> Option<&'a mut Task> {
  sections
    .iter_mut()
    .flat_map(|s| s.tasks.iter_mut())
    .find(|t| t.id == task_id)
}

fn apply_changes(sections: &mut [TaskSection], task_id: &str, changes: &TaskChanges) -> bool {
  match find_task(sections, task_id) {
    Some(task) => {
      changes.apply(task);
      true
    }
    None => false,
  }
}

/// Flip `is_done` on the task, searching only `section_id` when given.
fn set_done(sections: &mut [TaskSection], task_id: &str, section_id: Option<&str>, done: bool) -> bool {
  let task = match section_id {
    Some(section_id) => sections
      .iter_mut()
      .find(|s| s.id == section_id)
      .and_then(|s| s.tasks.iter_mut().find(|t| t.id == task_id)),
    None => find_task(sections, task_id),
  };
  match task {
    Some(task) => {
      task.is_done = done;
      true
    }
    None => false,
  }
}

/// Remove the task if it is still marked done.
fn remove_if_done(sections: &mut [TaskSection], task_id: &str) -> bool {
  for section in sections.iter_mut() {
    if let Some(index) = section.tasks.iter().position(|t| t.id == task_id) {
      if !section.tasks[index].is_done {
        return false;
      }
      section.tasks.remove(index);
      return true;
    }
  }
  false
}

/// Move a task within or between sections and renumber what changed.
///
/// Every section and the task are located before anything is modified,
/// so a miss leaves the cache untouched.
pub(crate) fn reorder(sections: &mut [TaskSection], reorder: &Reorder) -> bool {
  let from_section = reorder.from_section.as_deref().unwrap_or(&reorder.to_section);

  let Some(src) = sections.iter().position(|s| s.id == from_section) else {
    return false;
  };
  let Some(dst) = sections.iter().position(|s| s.id == reorder.to_section) else {
    return false;
  };
  let Some(from) = sections[src].tasks.iter().position(|t| t.id == reorder.task_id) else {
    return false;
  };

  if src == dst {
    let tasks = &mut sections[dst].tasks;
    let to = drop_index(from, reorder.position, tasks.len());
    move_in_place(tasks, from, to);
    renumber(tasks);
    return true;
  }

  let task = sections[src].tasks.remove(from);
  renumber(&mut sections[src].tasks);

  let tasks = &mut sections[dst].tasks;
  let at = (reorder.position as usize).saturating_sub(1).min(tasks.len());
  tasks.insert(at, task);
  renumber(tasks);
  true
}

/// Work run by the removal timer of a task marked done.
fn delayed_removal<S: CacheStore>(
  cache: QueryClient<S>,
  task_id: String,
) -> impl Future<Output = ()> + Send + 'static {
  async move {
    let removed = cache
      .mutate(&QueryKey::tasks(), |sections: &mut Vec<TaskSection>| {
        remove_if_done(sections, &task_id)
      })
      .unwrap_or(false);
    debug!(task_id = %task_id, removed, "delayed removal ran");
  }
}

fn removal_timer(task_id: &str) -> String {
  format!("remove-task:{}", task_id)
}

impl<T: Transport, S: CacheStore> SyncClient<T, S> {
  fn patch_tasks(&self, patch: impl FnOnce(&mut Vec<TaskSection>) -> bool) -> bool {
    let applied = self.cache.mutate(&QueryKey::tasks(), patch).unwrap_or(false);
    if !applied {
      debug!("optimistic task patch found no target");
    }
    applied
  }

  /// Create a task at the top of `section_id`.
  pub async fn create_task(&self, section_id: &str, title: &str, body: &str) -> Result<()> {
    info!(section_id = %section_id, "creating task");
    self.patch_tasks(|sections| prepend_task(sections, section_id, placeholder_task(title, body)));

    let request = CreateTaskRequest {
      title: title.to_string(),
      body: body.to_string(),
      id_task_section: section_id.to_string(),
    };
    let result = self.api.create_task(&request).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  /// Create a task from an email thread at the top of the first section.
  pub async fn create_task_from_thread(
    &self,
    thread_id: &str,
    email_id: &str,
    title: &str,
    body: &str,
  ) -> Result<()> {
    info!(thread_id = %thread_id, "creating task from thread");
    let mut task = placeholder_task(title, body);
    task.linked_email_thread = Some(LinkedEmailThread {
      linked_thread_id: thread_id.to_string(),
      email_thread: Some(EmailThread {
        id: PLACEHOLDER_THREAD_ID.to_string(),
        ..Default::default()
      }),
    });
    self.patch_tasks(|sections| match sections.first() {
      Some(first) => {
        let section_id = first.id.clone();
        prepend_task(sections, &section_id, task)
      }
      None => false,
    });

    let request = CreateTaskFromThreadRequest {
      title: title.to_string(),
      body: body.to_string(),
      email_id: email_id.to_string(),
    };
    let result = self.api.create_task_from_thread(thread_id, &request).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  /// Overwrite the given fields of a task.
  pub async fn modify_task(&self, task_id: &str, changes: &TaskChanges) -> Result<()> {
    info!(task_id = %task_id, "modifying task");
    self.patch_tasks(|sections| apply_changes(sections, task_id, changes));

    let result = self
      .api
      .modify_task("modify_task", task_id, &changes.to_request())
      .await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  /// Mark a task done or not done.
  ///
  /// A task marked done stays visible for the configured delay and is
  /// then removed from the cache, unless it was marked not done first.
  pub async fn mark_task_done(&self, task_id: &str, section_id: Option<&str>, done: bool) -> Result<()> {
    info!(task_id = %task_id, done, "marking task");
    self.patch_tasks(|sections| set_done(sections, task_id, section_id, done));

    let timer = removal_timer(task_id);
    if done {
      self.timers.schedule(
        timer,
        self.settings.mark_done_delay(),
        delayed_removal(self.cache.clone(), task_id.to_string()),
      );
    } else {
      self.timers.cancel(&timer);
    }

    let request = TaskModifyRequest {
      is_completed: Some(done),
      ..Default::default()
    };
    let result = self.api.modify_task("mark_task_done", task_id, &request).await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  /// Move a task to `position` in `to_section`.
  pub async fn reorder_task(&self, reorder_request: &Reorder) -> Result<()> {
    info!(
      task_id = %reorder_request.task_id,
      position = reorder_request.position,
      section = %reorder_request.to_section,
      "reordering task"
    );
    self.patch_tasks(|sections| reorder(sections, reorder_request));

    let request = TaskModifyRequest {
      id_task_section: Some(reorder_request.to_section.clone()),
      id_ordering: Some(reorder_request.position),
      ..Default::default()
    };
    let result = self
      .api
      .modify_task("reorder_task", &reorder_request.task_id, &request)
      .await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }

  /// Ask the server to pull tasks from linked accounts, then refetch.
  pub async fn sync_external_tasks(&self) -> Result<()> {
    let result = self.api.fetch_external_tasks().await;
    self.settle(&[QueryKey::tasks()]).await;
    result.map(|_| ())
  }
}
