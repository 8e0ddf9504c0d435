use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the backend, e.g. https://api.example.com
  pub url: String,
  /// Request timeout for the HTTP client
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
  30
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// Seconds before a cached query is refetched on read
  #[serde(default = "default_stale_secs")]
  pub stale_secs: u64,
  /// Persist query results to SQLite for offline starts
  #[serde(default = "default_persist")]
  pub persist: bool,
  /// Snapshot database location (defaults to the user data directory)
  pub path: Option<PathBuf>,
}

fn default_stale_secs() -> u64 {
  300
}

fn default_persist() -> bool {
  true
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_secs: default_stale_secs(),
      persist: default_persist(),
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  /// How long a completed task stays visible before it is removed
  #[serde(default = "default_mark_done_delay_ms")]
  pub mark_done_delay_ms: u64,
  /// Window during which a sent email can be undone
  #[serde(default = "default_email_undo_ms")]
  pub email_undo_ms: u64,
  #[serde(default = "default_messages_per_page")]
  pub messages_per_page: u32,
}

fn default_mark_done_delay_ms() -> u64 {
  1000
}

fn default_email_undo_ms() -> u64 {
  5000
}

fn default_messages_per_page() -> u32 {
  30
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      mark_done_delay_ms: default_mark_done_delay_ms(),
      email_undo_ms: default_email_undo_ms(),
      messages_per_page: default_messages_per_page(),
    }
  }
}

impl SyncConfig {
  pub fn mark_done_delay(&self) -> Duration {
    Duration::from_millis(self.mark_done_delay_ms)
  }

  pub fn email_undo_delay(&self) -> Duration {
    Duration::from_millis(self.email_undo_ms)
  }
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./inboxsync.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/inboxsync/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/inboxsync/config.yaml\n\
                 with at least:\n\napi:\n  url: https://your-backend"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("inboxsync.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("inboxsync").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self> {
    Ok(serde_yaml::from_str(contents)?)
  }

  /// Get the API token from environment variables.
  ///
  /// Checks INBOXSYNC_API_TOKEN first, then INBOXSYNC_TOKEN as fallback.
  pub fn get_api_token() -> Result<String> {
    std::env::var("INBOXSYNC_API_TOKEN")
      .or_else(|_| std::env::var("INBOXSYNC_TOKEN"))
      .map_err(|_| {
        eyre!("API token not found. Set INBOXSYNC_API_TOKEN or INBOXSYNC_TOKEN environment variable.")
      })
  }
}
