//! Optimistic mutation layer.
//!
//! Every write follows the same shape:
//! 1. cancel in-flight fetches for the affected keys and patch the cached
//!    collection in place with the expected server result
//! 2. send the request
//! 3. on settlement, success or not, invalidate and refetch the affected
//!    keys so server truth replaces the guess
//!
//! A patch whose target is not cached is skipped silently; the request is
//! sent regardless. There is no rollback: a failed write is corrected by
//! the refetch.

mod events;
mod mail;
mod sections;
mod tasks;

use color_eyre::Result;
use std::collections::HashMap;
use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::api::types::{EmailThread, Event, LinkedAccount, Message, Pages, TaskSection};
use crate::api::{ApiClient, HttpTransport, Transport};
use crate::cache::{
  CacheStore, CalendarMode, MemoryStore, QueryClient, QueryKey, Resource, SqliteStorage,
};
use crate::config::{Config, SyncConfig};
use crate::scheduler::TimerRegistry;

pub use mail::PendingSend;
pub use tasks::{Reorder, TaskChanges};

/// Wire units per minute of allocated time.
pub const MICROS_PER_MINUTE: u64 = 60_000_000;

/// Convert a time allocation in minutes to the wire duration.
pub fn minutes_to_duration(minutes: u64) -> u64 {
  minutes * MICROS_PER_MINUTE
}

/// Start and end of a fetched event window.
type EventWindow = (String, String);

/// Backend client whose writes are reflected in the cache before the
/// server confirms them.
pub struct SyncClient<T: Transport, S: CacheStore> {
  api: ApiClient<T>,
  cache: QueryClient<S>,
  timers: TimerRegistry,
  settings: SyncConfig,
  /// Windows behind each cached events key, needed to refetch them
  event_windows: Arc<Mutex<HashMap<QueryKey, EventWindow>>>,
  next_send: Arc<AtomicU64>,
}

impl SyncClient<HttpTransport, MemoryStore> {
  /// Build a client talking to the configured backend.
  pub fn from_config(config: &Config) -> Result<Self> {
    let api = ApiClient::new(HttpTransport::new(config)?);
    let cache = QueryClient::new(MemoryStore::new())
      .with_stale_time(chrono::Duration::seconds(config.cache.stale_secs as i64));
    let cache = if config.cache.persist {
      cache.with_snapshots(SqliteStorage::open(config.cache.path.as_deref())?)
    } else {
      cache
    };
    Ok(Self::new(api, cache, config.sync.clone()))
  }
}

impl<T: Transport, S: CacheStore> SyncClient<T, S> {
  pub fn new(api: ApiClient<T>, cache: QueryClient<S>, settings: SyncConfig) -> Self {
    Self {
      api,
      cache,
      timers: TimerRegistry::new(),
      settings,
      event_windows: Arc::new(Mutex::new(HashMap::new())),
      next_send: Arc::new(AtomicU64::new(1)),
    }
  }

  /// The underlying query cache.
  pub fn cache(&self) -> &QueryClient<S> {
    &self.cache
  }

  pub fn timers(&self) -> &TimerRegistry {
    &self.timers
  }

  // Reads

  /// Task sections, cache-first.
  pub async fn tasks(&self) -> Result<Vec<TaskSection>> {
    let result = self
      .cache
      .fetch(&QueryKey::tasks(), || self.api.get_tasks())
      .await?;
    Ok(result.data)
  }

  /// Loaded pages of email threads, fetching the first page if needed.
  pub async fn threads(&self) -> Result<Pages<EmailThread>> {
    let limit = self.settings.messages_per_page;
    let result = self
      .cache
      .fetch_pages(&QueryKey::email_threads(), |page| {
        self.api.get_threads(page, limit)
      })
      .await?;
    Ok(result.data)
  }

  /// Load one more page of email threads.
  pub async fn more_threads(&self) -> Result<Pages<EmailThread>> {
    let limit = self.settings.messages_per_page;
    let result = self
      .cache
      .fetch_next_page(&QueryKey::email_threads(), |page| {
        self.api.get_threads(page, limit)
      })
      .await?;
    Ok(result.data)
  }

  /// Loaded pages of messages, fetching the first page if needed.
  pub async fn messages(&self) -> Result<Pages<Message>> {
    let limit = self.settings.messages_per_page;
    let result = self
      .cache
      .fetch_pages(&QueryKey::messages(), |page| {
        self.api.get_messages(page, limit)
      })
      .await?;
    Ok(result.data)
  }

  /// Load one more page of messages.
  pub async fn more_messages(&self) -> Result<Pages<Message>> {
    let limit = self.settings.messages_per_page;
    let result = self
      .cache
      .fetch_next_page(&QueryKey::messages(), |page| {
        self.api.get_messages(page, limit)
      })
      .await?;
    Ok(result.data)
  }

  /// Events between `start` and `end`, cached per view mode and start.
  pub async fn events(&self, mode: CalendarMode, start: &str, end: &str) -> Result<Vec<Event>> {
    let key = QueryKey::events(mode, start);
    self
      .lock_windows()
      .insert(key.clone(), (start.to_string(), end.to_string()));
    let result = self
      .cache
      .fetch(&key, || self.api.get_events(start, end))
      .await?;
    Ok(result.data)
  }

  pub async fn linked_accounts(&self) -> Result<Vec<LinkedAccount>> {
    let result = self
      .cache
      .fetch(&QueryKey::linked_accounts(), || {
        self.api.get_linked_accounts()
      })
      .await?;
    Ok(result.data)
  }

  // Settlement

  /// Invalidate every cached key matching `filters` and refetch them.
  ///
  /// Refetch failures are logged; the cache keeps serving what it has.
  pub async fn settle(&self, filters: &[QueryKey]) {
    for filter in filters {
      for key in self.cache.invalidate(filter) {
        if let Err(e) = self.refetch(&key).await {
          warn!(key = %key, error = %e, "refetch after mutation failed");
        }
      }
    }
  }

  /// Refetch one cached key from the backend.
  ///
  /// Fetchers own a clone of the API client so the future stays `Send`
  /// when settlement runs inside a spawned task.
  async fn refetch(&self, key: &QueryKey) -> Result<()> {
    debug!(key = %key, "refetching");
    let limit = self.settings.messages_per_page;
    let api = self.api.clone();
    match key.resource() {
      Resource::Tasks => {
        self
          .cache
          .refetch(key, move || async move { api.get_tasks().await })
          .await?;
      }
      Resource::Messages => {
        self
          .cache
          .refetch_pages(key, move |page| {
            let api = api.clone();
            async move { api.get_messages(page, limit).await }
          })
          .await?;
      }
      Resource::EmailThreads => {
        self
          .cache
          .refetch_pages(key, move |page| {
            let api = api.clone();
            async move { api.get_threads(page, limit).await }
          })
          .await?;
      }
      Resource::Events => {
        let window = self.lock_windows().get(key).cloned();
        match window {
          Some((start, end)) => {
            self
              .cache
              .refetch(key, move || async move { api.get_events(&start, &end).await })
              .await?;
          }
          None => debug!(key = %key, "no window recorded for events key"),
        }
      }
      Resource::LinkedAccounts => {
        self
          .cache
          .refetch(key, move || async move { api.get_linked_accounts().await })
          .await?;
      }
    }
    Ok(())
  }

  fn lock_windows(&self) -> std::sync::MutexGuard<'_, HashMap<QueryKey, EventWindow>> {
    self.event_windows.lock().unwrap_or_else(|e| e.into_inner())
  }
}

impl<T: Transport, S: CacheStore> Clone for SyncClient<T, S> {
  fn clone(&self) -> Self {
    Self {
      api: self.api.clone(),
      cache: self.cache.clone(),
      timers: self.timers.clone(),
      settings: self.settings.clone(),
      event_windows: Arc::clone(&self.event_windows),
      next_send: Arc::clone(&self.next_send),
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  use super::*;
  use crate::api::testing::FakeTransport;
  use crate::api::types::Task;
  use crate::ordering::renumber;
  use serde_json::json;

  pub type TestClient = SyncClient<FakeTransport, MemoryStore>;

  pub fn settings() -> SyncConfig {
    SyncConfig {
      mark_done_delay_ms: 1000,
      email_undo_ms: 5000,
      messages_per_page: 2,
    }
  }

  pub fn client(transport: &FakeTransport) -> TestClient {
    SyncClient::new(
      ApiClient::new(transport.clone()),
      QueryClient::new(MemoryStore::new()),
      settings(),
    )
  }

  pub fn task(id: &str) -> Task {
    Task {
      id: id.to_string(),
      title: format!("Task {}", id),
      ..Default::default()
    }
  }

  pub fn section(id: &str, name: &str, task_ids: &[&str]) -> TaskSection {
    let mut tasks: Vec<Task> = task_ids.iter().map(|id| task(id)).collect();
    renumber(&mut tasks);
    TaskSection {
      id: id.to_string(),
      name: name.to_string(),
      is_done: false,
      tasks,
    }
  }

  pub fn task_ids(section: &TaskSection) -> Vec<&str> {
    section.tasks.iter().map(|t| t.id.as_str()).collect()
  }

  pub fn orderings(section: &TaskSection) -> Vec<u32> {
    section.tasks.iter().map(|t| t.id_ordering).collect()
  }

  /// Serve `sections` from the tasks endpoint and load them into the cache.
  pub async fn load_tasks(transport: &FakeTransport, client: &TestClient, sections: &[TaskSection]) {
    transport.respond("/tasks/v3/", json!(sections));
    client.tasks().await.unwrap();
  }

  pub fn cached_tasks(client: &TestClient) -> Vec<TaskSection> {
    client
      .cache()
      .get::<Vec<TaskSection>>(&QueryKey::tasks())
      .unwrap()
  }
}

#[cfg(test)]
mod tests {
  use super::testing::*;
  use super::*;
  use crate::api::testing::FakeTransport;
  use serde_json::json;

  #[test]
  fn test_minutes_to_duration() {
    assert_eq!(minutes_to_duration(1), 60_000_000);
    assert_eq!(minutes_to_duration(30), 1_800_000_000);
    assert_eq!(minutes_to_duration(0), 0);
  }

  #[tokio::test]
  async fn test_settle_refetches_only_cached_keys() {
    let transport = FakeTransport::new();
    let client = client(&transport);
    load_tasks(&transport, &client, &[section("s1", "Today", &["t1"])]).await;

    client
      .settle(&[QueryKey::tasks(), QueryKey::linked_accounts()])
      .await;

    assert_eq!(transport.requests_to("/tasks/v3/").len(), 2);
    assert!(transport.requests_to("/linked_accounts/").is_empty());
  }

  #[tokio::test]
  async fn test_events_refetch_uses_recorded_window() {
    let transport = FakeTransport::new();
    transport.respond("/events/", json!([]));
    let client = client(&transport);

    client
      .events(CalendarMode::Banner, "2024-05-01T00:00:00Z", "2024-05-02T00:00:00Z")
      .await
      .unwrap();
    client.settle(&[QueryKey::from(Resource::Events)]).await;

    let sent = transport.requests_to("/events/");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[1].query, sent[0].query);
    assert_eq!(
      sent[1].query[0],
      ("datetime_start".to_string(), "2024-05-01T00:00:00Z".to_string())
    );
  }

  #[tokio::test]
  async fn test_threads_paginate_with_configured_limit() {
    let transport = FakeTransport::new();
    transport.respond("/threads/", json!([{"id": "th1"}, {"id": "th2"}]));
    let client = client(&transport);

    client.threads().await.unwrap();
    let pages = client.more_threads().await.unwrap();
    assert_eq!(pages.pages.len(), 2);

    let sent = transport.requests_to("/threads/");
    assert_eq!(sent[1].query[0], ("page".to_string(), "2".to_string()));
    assert_eq!(sent[1].query[1], ("limit".to_string(), "2".to_string()));
  }
}
