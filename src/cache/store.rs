//! Key-addressed in-memory store of query results.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;

use super::keys::QueryKey;
use super::traits::QueryData;

/// Contract the sync layer needs from a query cache.
///
/// Implementations own every cached collection. Fetch completion and the
/// optimistic mutation layer are the only writers.
pub trait CacheStore: Send + 'static {
  /// Cached value for `key`, if present and of type `T`.
  fn get<T: QueryData>(&self, key: &QueryKey) -> Option<&T>;

  /// Mutable access for in-place optimistic patches.
  fn get_mut<T: QueryData>(&mut self, key: &QueryKey) -> Option<&mut T>;

  /// Replace the value for `key`, marking it fresh.
  fn set<T: QueryData>(&mut self, key: QueryKey, value: T);

  /// When `key` was last written by `set`.
  fn updated_at(&self, key: &QueryKey) -> Option<DateTime<Utc>>;

  /// Whether `key` was invalidated since it was last set.
  fn is_invalidated(&self, key: &QueryKey) -> bool;

  /// Register a fetch for `key` and return its generation token.
  ///
  /// Starting a fetch supersedes any fetch already in flight for the key.
  fn begin_fetch(&mut self, key: &QueryKey) -> u64;

  /// Whether a fetch holding `generation` may still write its result.
  fn is_current(&self, key: &QueryKey, generation: u64) -> bool;

  /// Discard the results of every in-flight fetch matching `filter`.
  fn cancel_in_flight(&mut self, filter: &QueryKey);

  /// Mark every cached key matching `filter` stale and return them.
  fn invalidate(&mut self, filter: &QueryKey) -> Vec<QueryKey>;
}

struct Entry {
  data: Box<dyn Any + Send + Sync>,
  updated_at: DateTime<Utc>,
  invalidated: bool,
}

/// Process-local store backed by a hash map.
#[derive(Default)]
pub struct MemoryStore {
  entries: HashMap<QueryKey, Entry>,
  generations: HashMap<QueryKey, u64>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStore for MemoryStore {
  fn get<T: QueryData>(&self, key: &QueryKey) -> Option<&T> {
    self.entries.get(key)?.data.downcast_ref::<T>()
  }

  fn get_mut<T: QueryData>(&mut self, key: &QueryKey) -> Option<&mut T> {
    self.entries.get_mut(key)?.data.downcast_mut::<T>()
  }

  fn set<T: QueryData>(&mut self, key: QueryKey, value: T) {
    self.entries.insert(
      key,
      Entry {
        data: Box::new(value),
        updated_at: Utc::now(),
        invalidated: false,
      },
    );
  }

  fn updated_at(&self, key: &QueryKey) -> Option<DateTime<Utc>> {
    self.entries.get(key).map(|e| e.updated_at)
  }

  fn is_invalidated(&self, key: &QueryKey) -> bool {
    self.entries.get(key).map(|e| e.invalidated).unwrap_or(false)
  }

  fn begin_fetch(&mut self, key: &QueryKey) -> u64 {
    let generation = self.generations.entry(key.clone()).or_insert(0);
    *generation += 1;
    *generation
  }

  fn is_current(&self, key: &QueryKey, generation: u64) -> bool {
    self.generations.get(key).copied().unwrap_or(0) == generation
  }

  fn cancel_in_flight(&mut self, filter: &QueryKey) {
    for (key, generation) in self.generations.iter_mut() {
      if filter.matches(key) {
        *generation += 1;
      }
    }
  }

  fn invalidate(&mut self, filter: &QueryKey) -> Vec<QueryKey> {
    self
      .entries
      .iter_mut()
      .filter(|(key, _)| filter.matches(key))
      .map(|(key, entry)| {
        entry.invalidated = true;
        key.clone()
      })
      .collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::keys::{CalendarMode, Resource};

  #[test]
  fn test_get_returns_typed_value() {
    let mut store = MemoryStore::new();
    store.set(QueryKey::tasks(), vec![1u32, 2, 3]);

    assert_eq!(store.get::<Vec<u32>>(&QueryKey::tasks()), Some(&vec![1, 2, 3]));
    // Wrong type is a miss, not a panic
    assert_eq!(store.get::<Vec<String>>(&QueryKey::tasks()), None);
    assert_eq!(store.get::<Vec<u32>>(&QueryKey::messages()), None);
  }

  #[test]
  fn test_get_mut_patches_in_place() {
    let mut store = MemoryStore::new();
    store.set(QueryKey::tasks(), vec![1u32]);
    store.get_mut::<Vec<u32>>(&QueryKey::tasks()).unwrap().push(2);
    assert_eq!(store.get::<Vec<u32>>(&QueryKey::tasks()), Some(&vec![1, 2]));
  }

  #[test]
  fn test_invalidate_matches_prefix_and_set_clears_flag() {
    let mut store = MemoryStore::new();
    let a = QueryKey::events(CalendarMode::Calendar, "a");
    let b = QueryKey::events(CalendarMode::Banner, "b");
    store.set(a.clone(), 1u32);
    store.set(b.clone(), 2u32);
    store.set(QueryKey::tasks(), 3u32);

    let mut invalidated = store.invalidate(&Resource::Events.into());
    invalidated.sort_by_key(|k| k.to_string());
    assert_eq!(invalidated, vec![b.clone(), a.clone()]);
    assert!(store.is_invalidated(&a));
    assert!(!store.is_invalidated(&QueryKey::tasks()));

    store.set(a.clone(), 10u32);
    assert!(!store.is_invalidated(&a));
  }

  #[test]
  fn test_newer_fetch_supersedes_older() {
    let mut store = MemoryStore::new();
    let key = QueryKey::tasks();
    let first = store.begin_fetch(&key);
    let second = store.begin_fetch(&key);
    assert!(!store.is_current(&key, first));
    assert!(store.is_current(&key, second));
  }

  #[test]
  fn test_cancel_in_flight_discards_pending_fetch() {
    let mut store = MemoryStore::new();
    let key = QueryKey::tasks();
    let generation = store.begin_fetch(&key);
    store.cancel_in_flight(&QueryKey::tasks());
    assert!(!store.is_current(&key, generation));

    let other = store.begin_fetch(&QueryKey::messages());
    store.cancel_in_flight(&QueryKey::tasks());
    assert!(store.is_current(&QueryKey::messages(), other));
  }
}
