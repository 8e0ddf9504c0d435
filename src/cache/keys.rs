//! Query keys addressing cached collections.

use sha2::{Digest, Sha256};
use std::fmt;

/// Logical resource a query belongs to. The root segment of every key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
  Tasks,
  Messages,
  EmailThreads,
  Events,
  LinkedAccounts,
}

impl Resource {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Tasks => "tasks",
      Self::Messages => "messages",
      Self::EmailThreads => "emailthreads",
      Self::Events => "events",
      Self::LinkedAccounts => "linked_accounts",
    }
  }
}

/// Which view an events query feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CalendarMode {
  Calendar,
  Banner,
}

impl CalendarMode {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Calendar => "calendar",
      Self::Banner => "banner",
    }
  }
}

/// Address of one cached query: a resource plus optional parameters.
///
/// A key with fewer parameters acts as a filter matching every key that
/// extends it, so `QueryKey::from(Resource::Events)` covers all cached
/// event windows.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey {
  resource: Resource,
  params: Vec<String>,
}

impl QueryKey {
  pub fn tasks() -> Self {
    Resource::Tasks.into()
  }

  pub fn messages() -> Self {
    Resource::Messages.into()
  }

  pub fn email_threads() -> Self {
    Resource::EmailThreads.into()
  }

  pub fn linked_accounts() -> Self {
    Resource::LinkedAccounts.into()
  }

  /// Events for one window, keyed by view mode and window start.
  pub fn events(mode: CalendarMode, start: &str) -> Self {
    Self {
      resource: Resource::Events,
      params: vec![mode.as_str().to_string(), start.to_string()],
    }
  }

  pub fn resource(&self) -> Resource {
    self.resource
  }

  /// Whether `self`, used as a filter, covers `other`.
  pub fn matches(&self, other: &QueryKey) -> bool {
    self.resource == other.resource && other.params.starts_with(&self.params)
  }

  /// Stable, fixed-length hash used as the persistence key.
  pub fn cache_hash(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.to_string().as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl From<Resource> for QueryKey {
  fn from(resource: Resource) -> Self {
    Self {
      resource,
      params: Vec::new(),
    }
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.resource.as_str())?;
    for param in &self.params {
      write!(f, ":{}", param)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_root_key_matches_parameterized_keys() {
    let filter = QueryKey::from(Resource::Events);
    let key = QueryKey::events(CalendarMode::Calendar, "2024-05-01T00:00:00Z");
    assert!(filter.matches(&key));
    assert!(!key.matches(&filter));
  }

  #[test]
  fn test_mode_filter_does_not_cross_modes() {
    let calendar = QueryKey::events(CalendarMode::Calendar, "a");
    let banner = QueryKey::events(CalendarMode::Banner, "a");
    assert!(!calendar.matches(&banner));
    assert!(calendar.matches(&calendar));
  }

  #[test]
  fn test_different_resources_never_match() {
    assert!(!QueryKey::tasks().matches(&QueryKey::messages()));
  }

  #[test]
  fn test_display_and_hash() {
    let key = QueryKey::events(CalendarMode::Banner, "x");
    assert_eq!(key.to_string(), "events:banner:x");
    assert_eq!(key.cache_hash().len(), 64);
    assert_eq!(key.cache_hash(), key.clone().cache_hash());
    assert_ne!(key.cache_hash(), QueryKey::tasks().cache_hash());
  }
}
