//! In-memory transport for tests.

use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::client::{ApiRequest, Transport};

type Inspector = Arc<dyn Fn(&ApiRequest) + Send + Sync>;

#[derive(Default)]
struct Inner {
  responses: HashMap<String, Result<Value, String>>,
  delays: HashMap<String, Duration>,
  requests: Vec<ApiRequest>,
  inspector: Option<Inspector>,
}

/// Records every request and answers from canned responses keyed by path.
/// Requests to unregistered paths fail.
#[derive(Clone, Default)]
pub struct FakeTransport {
  inner: Arc<Mutex<Inner>>,
}

impl FakeTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Answer requests to `path` with `body`.
  pub fn respond(&self, path: &str, body: Value) {
    self
      .inner
      .lock()
      .unwrap()
      .responses
      .insert(path.to_string(), Ok(body));
  }

  /// Fail requests to `path`.
  pub fn fail(&self, path: &str, message: &str) {
    self
      .inner
      .lock()
      .unwrap()
      .responses
      .insert(path.to_string(), Err(message.to_string()));
  }

  /// Hold answers to `path` back for `delay`.
  pub fn delay(&self, path: &str, delay: Duration) {
    self
      .inner
      .lock()
      .unwrap()
      .delays
      .insert(path.to_string(), delay);
  }

  /// Run `f` on every request as it is sent, before it is answered.
  pub fn inspect(&self, f: impl Fn(&ApiRequest) + Send + Sync + 'static) {
    self.inner.lock().unwrap().inspector = Some(Arc::new(f));
  }

  /// Every request sent so far, in order.
  pub fn requests(&self) -> Vec<ApiRequest> {
    self.inner.lock().unwrap().requests.clone()
  }

  /// Requests sent to `path`, in order.
  pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
    self
      .requests()
      .into_iter()
      .filter(|r| r.path == path)
      .collect()
  }
}

impl Transport for FakeTransport {
  async fn send(&self, request: ApiRequest) -> Result<Value> {
    let (inspector, delay, response) = {
      let mut inner = self.inner.lock().unwrap();
      inner.requests.push(request.clone());
      (
        inner.inspector.clone(),
        inner.delays.get(&request.path).copied(),
        inner.responses.get(&request.path).cloned(),
      )
    };

    // Called without the lock so inspectors may read the transport
    if let Some(inspector) = inspector {
      inspector(&request);
    }
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }

    match response {
      Some(Ok(body)) => Ok(body),
      Some(Err(message)) => Err(eyre!("{}", message)),
      None => Err(eyre!("no response registered for {}", request.path)),
    }
  }
}
