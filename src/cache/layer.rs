//! Query client that orchestrates caching logic with network fetching.

use chrono::{Duration, Utc};
use color_eyre::Result;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

use super::keys::QueryKey;
use super::storage::{NoopStorage, SnapshotStorage};
use super::store::CacheStore;
use super::traits::{CacheResult, QueryData};
use crate::api::types::Pages;

/// Query client that manages cached query results and network fetching.
///
/// This sits between the application and the network client. Reads go
/// through `fetch*`, optimistic writes through `mutate`, and settlement
/// through `invalidate` followed by a refetch.
pub struct QueryClient<S: CacheStore> {
  store: Arc<Mutex<S>>,
  snapshots: Arc<dyn SnapshotStorage>,
  /// How long before cached data is considered stale
  stale_time: Duration,
}

impl<S: CacheStore> QueryClient<S> {
  /// Create a query client over `store` without persistence.
  pub fn new(store: S) -> Self {
    Self {
      store: Arc::new(Mutex::new(store)),
      snapshots: Arc::new(NoopStorage),
      stale_time: Duration::minutes(5),
    }
  }

  /// Persist every committed query result to `snapshots`.
  pub fn with_snapshots(mut self, snapshots: impl SnapshotStorage + 'static) -> Self {
    self.snapshots = Arc::new(snapshots);
    self
  }

  /// Set the stale time for cached data.
  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = stale_time;
    self
  }

  /// Lock the store. A poisoned lock still holds consistent data since
  /// every patch completes inside one critical section.
  fn lock(&self) -> MutexGuard<'_, S> {
    self.store.lock().unwrap_or_else(|e| e.into_inner())
  }

  /// Run `f` with exclusive access to the store.
  pub fn with_store<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
    f(&mut self.lock())
  }

  /// Current cached value for `key`, regardless of freshness.
  pub fn get<T: QueryData>(&self, key: &QueryKey) -> Option<T> {
    self.lock().get::<T>(key).cloned()
  }

  /// Replace the cached value for `key` and persist it.
  pub fn set<T: QueryData>(&self, key: &QueryKey, value: T) {
    self.persist(key, &value);
    self.lock().set(key.clone(), value);
  }

  /// Apply an optimistic patch to the cached value for `key`.
  ///
  /// In-flight fetches for the key are cancelled first so a racing
  /// response cannot overwrite the patch. Returns `None` when nothing is
  /// cached under `key`; the patch is skipped in that case.
  pub fn mutate<T, R>(&self, key: &QueryKey, patch: impl FnOnce(&mut T) -> R) -> Option<R>
  where
    T: QueryData,
  {
    let mut store = self.lock();
    store.cancel_in_flight(key);
    match store.get_mut::<T>(key) {
      Some(data) => Some(patch(data)),
      None => {
        debug!(key = %key, "nothing cached, skipping optimistic patch");
        None
      }
    }
  }

  /// Mark every cached key matching `filter` stale and return them.
  pub fn invalidate(&self, filter: &QueryKey) -> Vec<QueryKey> {
    self.lock().invalidate(filter)
  }

  /// Cached value for `key` if it is younger than the stale time and has
  /// not been invalidated.
  fn fresh<T: QueryData>(&self, key: &QueryKey) -> Option<CacheResult<T>> {
    let store = self.lock();
    if store.is_invalidated(key) {
      return None;
    }
    let cached_at = store.updated_at(key)?;
    if Utc::now() - cached_at > self.stale_time {
      return None;
    }
    let data = store.get::<T>(key)?.clone();
    Some(CacheResult::from_cache(data, cached_at))
  }

  /// Fetch with cache-first strategy.
  ///
  /// 1. Fresh cache is returned immediately
  /// 2. Otherwise fetch from network and store the result
  /// 3. On network failure, serve stale cache or a persisted snapshot
  pub async fn fetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: QueryData,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(cached) = self.fresh::<T>(key) {
      debug!(key = %key, "cache hit");
      return Ok(cached);
    }
    self.refetch(key, fetcher).await
  }

  /// Fetch from network regardless of freshness.
  pub async fn refetch<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<CacheResult<T>>
  where
    T: QueryData,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    let generation = self.lock().begin_fetch(key);

    match fetcher().await {
      Ok(data) => {
        if self.commit(key, generation, &data) {
          Ok(CacheResult::from_network(data))
        } else {
          Ok(self.cached(key).unwrap_or_else(|| CacheResult::from_network(data)))
        }
      }
      Err(err) => self.fallback(key).ok_or(err),
    }
  }

  /// Fetch every page of a paginated query, cache-first.
  pub async fn fetch_pages<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<Pages<T>>>
  where
    T: QueryData,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    if let Some(cached) = self.fresh::<Pages<T>>(key) {
      debug!(key = %key, "cache hit");
      return Ok(cached);
    }
    self.refetch_pages(key, fetcher).await
  }

  /// Re-fetch pages `1..=n` of a paginated query, where `n` is the number
  /// of pages currently cached (at least one).
  pub async fn refetch_pages<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<Pages<T>>>
  where
    T: QueryData,
    F: Fn(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let page_count = self
      .get::<Pages<T>>(key)
      .map(|p| p.pages.len() as u32)
      .unwrap_or(0)
      .max(1);
    let generation = self.lock().begin_fetch(key);

    let mut pages = Pages::default();
    for page in 1..=page_count {
      match fetcher(page).await {
        Ok(items) => pages.push_page(page, items),
        Err(err) => return self.fallback(key).ok_or(err),
      }
    }

    if self.commit(key, generation, &pages) {
      Ok(CacheResult::from_network(pages))
    } else {
      Ok(self.cached(key).unwrap_or_else(|| CacheResult::from_network(pages)))
    }
  }

  /// Append the next page of a paginated query.
  pub async fn fetch_next_page<T, F, Fut>(
    &self,
    key: &QueryKey,
    fetcher: F,
  ) -> Result<CacheResult<Pages<T>>>
  where
    T: QueryData,
    F: FnOnce(u32) -> Fut,
    Fut: Future<Output = Result<Vec<T>>>,
  {
    let mut pages = self.get::<Pages<T>>(key).unwrap_or_default();
    let next = pages.next_page();
    let generation = self.lock().begin_fetch(key);

    let items = fetcher(next).await?;
    pages.push_page(next, items);

    if self.commit(key, generation, &pages) {
      Ok(CacheResult::from_network(pages))
    } else {
      Ok(self.cached(key).unwrap_or_else(|| CacheResult::from_network(pages)))
    }
  }

  /// Store a fetch result unless the fetch was cancelled meanwhile.
  fn commit<T: QueryData>(&self, key: &QueryKey, generation: u64, data: &T) -> bool {
    {
      let mut store = self.lock();
      if !store.is_current(key, generation) {
        debug!(key = %key, "fetch was cancelled, discarding result");
        return false;
      }
      store.set(key.clone(), data.clone());
    }
    self.persist(key, data);
    true
  }

  fn cached<T: QueryData>(&self, key: &QueryKey) -> Option<CacheResult<T>> {
    let store = self.lock();
    let data = store.get::<T>(key)?.clone();
    let cached_at = store.updated_at(key)?;
    Some(CacheResult::from_cache(data, cached_at))
  }

  /// Offline mode: stale memory first, then a persisted snapshot.
  fn fallback<T: QueryData>(&self, key: &QueryKey) -> Option<CacheResult<T>> {
    if let Some(cached) = self.cached::<T>(key) {
      warn!(key = %key, "fetch failed, serving stale cache");
      return Some(CacheResult::offline(cached.data, cached.cached_at.unwrap_or_else(Utc::now)));
    }

    let snapshot = match self.snapshots.load(&key.cache_hash()) {
      Ok(Some(snapshot)) => snapshot,
      Ok(None) => return None,
      Err(e) => {
        warn!(key = %key, error = %e, "failed to load snapshot");
        return None;
      }
    };
    let data: T = match serde_json::from_slice(&snapshot.data) {
      Ok(data) => data,
      Err(e) => {
        warn!(key = %key, error = %e, "discarding unreadable snapshot");
        let _ = self.snapshots.discard(&key.cache_hash());
        return None;
      }
    };

    warn!(key = %key, "fetch failed, serving persisted snapshot");
    {
      // Hydrate memory but keep it stale so the next read retries
      let mut store = self.lock();
      store.set(key.clone(), data.clone());
      store.invalidate(key);
    }
    Some(CacheResult::offline(data, snapshot.cached_at))
  }

  fn persist<T: QueryData>(&self, key: &QueryKey, data: &T) {
    let bytes = match serde_json::to_vec(data) {
      Ok(bytes) => bytes,
      Err(e) => {
        warn!(key = %key, error = %e, "failed to serialize snapshot");
        return;
      }
    };
    if let Err(e) = self
      .snapshots
      .store(&key.cache_hash(), &key.to_string(), &bytes)
    {
      warn!(key = %key, error = %e, "failed to persist snapshot");
    }
  }
}

impl<S: CacheStore> Clone for QueryClient<S> {
  fn clone(&self) -> Self {
    Self {
      store: Arc::clone(&self.store),
      snapshots: Arc::clone(&self.snapshots),
      stale_time: self.stale_time,
    }
  }
}
