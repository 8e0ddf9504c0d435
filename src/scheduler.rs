//! Cancellable delayed work keyed by entity id.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::AbortHandle;
use tracing::debug;

struct Timer {
  id: u64,
  handle: AbortHandle,
}

#[derive(Default)]
struct State {
  /// Timers still waiting out their delay
  pending: HashMap<String, Timer>,
  /// Keys of fired timers whose work has not finished, by timer id
  running: HashMap<u64, String>,
}

impl State {
  fn outstanding(&self, prefix: &str) -> bool {
    self.pending.keys().any(|k| k.starts_with(prefix))
      || self.running.values().any(|k| k.starts_with(prefix))
  }
}

#[derive(Default)]
struct Shared {
  state: Mutex<State>,
  finished: Notify,
}

impl Shared {
  fn lock(&self) -> MutexGuard<'_, State> {
    self.state.lock().unwrap_or_else(|e| e.into_inner())
  }
}

/// Clears a running entry when the work completes or panics.
struct RunGuard {
  shared: Arc<Shared>,
  id: u64,
}

impl Drop for RunGuard {
  fn drop(&mut self) {
    self.shared.lock().running.remove(&self.id);
    self.shared.finished.notify_waiters();
  }
}

/// Registry of pending timers.
///
/// At most one timer is pending per key. Scheduling under a key that
/// already has a pending timer aborts the earlier one. Work that has
/// started is never aborted and stays tracked until it finishes, so
/// [`TimerRegistry::drain`] can wait for it. Must be used from within a
/// tokio runtime.
#[derive(Clone, Default)]
pub struct TimerRegistry {
  shared: Arc<Shared>,
  next_id: Arc<AtomicU64>,
}

impl TimerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Run `work` after `delay` unless cancelled first.
  pub fn schedule<F>(&self, key: impl Into<String>, delay: Duration, work: F)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let key = key.into();
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let shared = Arc::clone(&self.shared);
    let task_key = key.clone();

    // Hold the lock across spawn so the task always finds itself registered
    let mut state = self.shared.lock();
    let handle = tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      let _guard = {
        let mut state = shared.lock();
        if !state.pending.get(&task_key).is_some_and(|t| t.id == id) {
          return;
        }
        state.pending.remove(&task_key);
        state.running.insert(id, task_key);
        RunGuard {
          shared: Arc::clone(&shared),
          id,
        }
      };
      work.await;
    });

    if let Some(previous) = state.pending.insert(
      key.clone(),
      Timer {
        id,
        handle: handle.abort_handle(),
      },
    ) {
      debug!(key = %key, "replacing pending timer");
      previous.handle.abort();
    }
  }

  /// Abort the pending timer for `key`. Returns whether one was pending;
  /// work that already started is left to finish.
  pub fn cancel(&self, key: &str) -> bool {
    let removed = self.shared.lock().pending.remove(key);
    match removed {
      Some(timer) => {
        timer.handle.abort();
        self.shared.finished.notify_waiters();
        debug!(key = %key, "timer cancelled");
        true
      }
      None => false,
    }
  }

  pub fn is_pending(&self, key: &str) -> bool {
    self.shared.lock().pending.contains_key(key)
  }

  /// Whether the work for `key` has fired and not finished yet.
  pub fn is_running(&self, key: &str) -> bool {
    self.shared.lock().running.values().any(|k| k == key)
  }

  /// Number of timers that have not fired yet.
  pub fn pending(&self) -> usize {
    self.shared.lock().pending.len()
  }

  /// Whether any timer whose key starts with `prefix` is pending or running.
  pub fn has_outstanding(&self, prefix: &str) -> bool {
    self.shared.lock().outstanding(prefix)
  }

  /// Wait until every timer whose key starts with `prefix` has either been
  /// cancelled or fired and finished its work.
  pub async fn drain(&self, prefix: &str) {
    loop {
      let finished = self.shared.finished.notified();
      tokio::pin!(finished);
      // Register before checking so a completion in between is not missed
      finished.as_mut().enable();
      if !self.has_outstanding(prefix) {
        return;
      }
      finished.await;
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::AtomicU32;

  fn counter() -> (Arc<AtomicU32>, Arc<AtomicU32>) {
    let count = Arc::new(AtomicU32::new(0));
    (count.clone(), count)
  }

  #[tokio::test(start_paused = true)]
  async fn test_timer_fires_after_delay() {
    let timers = TimerRegistry::new();
    let (count, observed) = counter();

    timers.schedule("a", Duration::from_secs(1), async move {
      count.fetch_add(1, Ordering::SeqCst);
    });
    assert!(timers.is_pending("a"));

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 0);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(!timers.is_pending("a"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_cancel_prevents_work() {
    let timers = TimerRegistry::new();
    let (count, observed) = counter();

    timers.schedule("a", Duration::from_secs(1), async move {
      count.fetch_add(1, Ordering::SeqCst);
    });
    assert!(timers.cancel("a"));
    assert!(!timers.cancel("a"));

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 0);
    assert_eq!(timers.pending(), 0);
  }

  #[tokio::test(start_paused = true)]
  async fn test_rescheduling_replaces_pending_timer() {
    let timers = TimerRegistry::new();
    let (count, observed) = counter();
    let second = count.clone();

    timers.schedule("a", Duration::from_secs(1), async move {
      count.fetch_add(1, Ordering::SeqCst);
    });
    timers.schedule("a", Duration::from_secs(1), async move {
      second.fetch_add(10, Ordering::SeqCst);
    });
    assert_eq!(timers.pending(), 1);

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(observed.load(Ordering::SeqCst), 10);
  }

  #[tokio::test(start_paused = true)]
  async fn test_running_work_stays_tracked_until_done() {
    let timers = TimerRegistry::new();
    let (count, observed) = counter();

    timers.schedule("send:1", Duration::from_secs(1), async move {
      tokio::time::sleep(Duration::from_secs(5)).await;
      count.fetch_add(1, Ordering::SeqCst);
    });

    tokio::time::sleep(Duration::from_millis(1100)).await;
    assert!(!timers.is_pending("send:1"));
    assert!(timers.is_running("send:1"));
    assert!(timers.has_outstanding("send:"));
    // fired work cannot be cancelled
    assert!(!timers.cancel("send:1"));

    timers.drain("send:").await;
    assert_eq!(observed.load(Ordering::SeqCst), 1);
    assert!(!timers.has_outstanding("send:"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_drain_waits_for_every_matching_key() {
    let timers = TimerRegistry::new();
    let (count, observed) = counter();
    for (i, delay) in [1u64, 3].into_iter().enumerate() {
      let count = count.clone();
      timers.schedule(format!("send:{}", i), Duration::from_secs(delay), async move {
        count.fetch_add(1, Ordering::SeqCst);
      });
    }
    timers.schedule("remove-task:t1", Duration::from_secs(60), async {});

    timers.drain("send:").await;
    assert_eq!(observed.load(Ordering::SeqCst), 2);
    assert!(timers.is_pending("remove-task:t1"));
  }

  #[tokio::test(start_paused = true)]
  async fn test_drain_returns_when_timer_cancelled() {
    let timers = TimerRegistry::new();
    timers.schedule("send:1", Duration::from_secs(60), async {});
    let waiter = {
      let timers = timers.clone();
      tokio::spawn(async move { timers.drain("send:").await })
    };
    tokio::task::yield_now().await;
    assert!(timers.cancel("send:1"));
    waiter.await.unwrap();
    assert_eq!(timers.pending(), 0);
  }
}
