//! Snapshot storage trait and SQLite implementation.
//!
//! Snapshots let a fresh process serve the last known query results while
//! the network is unavailable.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// A persisted query result.
#[derive(Debug, Clone)]
pub struct Snapshot {
  /// Serialized JSON of the query result
  pub data: Vec<u8>,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

/// Trait for snapshot storage backends.
pub trait SnapshotStorage: Send + Sync {
  /// Store the serialized result of a query.
  fn store(&self, key_hash: &str, description: &str, data: &[u8]) -> Result<()>;

  /// Load the last stored result of a query.
  fn load(&self, key_hash: &str) -> Result<Option<Snapshot>>;

  /// Forget a stored result.
  fn discard(&self, key_hash: &str) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when persistence is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SnapshotStorage for NoopStorage {
  fn store(&self, _key_hash: &str, _description: &str, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn load(&self, _key_hash: &str) -> Result<Option<Snapshot>> {
    Ok(None) // Always miss
  }

  fn discard(&self, _key_hash: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based snapshot storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the snapshot database at `path`, or at the default
  /// location when `path` is `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a throwaway database that lives only as long as this value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("inboxsync").join("cache.db"))
  }

  /// Run database migrations for snapshot tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for snapshot tables.
const SNAPSHOT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS query_snapshots (
    key_hash TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    data BLOB NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SnapshotStorage for SqliteStorage {
  fn store(&self, key_hash: &str, description: &str, data: &[u8]) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO query_snapshots (key_hash, description, data, cached_at)
         VALUES (?, ?, ?, datetime('now'))",
        params![key_hash, description, data],
      )
      .map_err(|e| eyre!("Failed to store snapshot for {}: {}", description, e))?;

    Ok(())
  }

  fn load(&self, key_hash: &str) -> Result<Option<Snapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM query_snapshots WHERE key_hash = ?",
        params![key_hash],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to load snapshot: {}", e))?;

    match row {
      Some((data, cached_at)) => Ok(Some(Snapshot {
        data,
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn discard(&self, key_hash: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM query_snapshots WHERE key_hash = ?",
        params![key_hash],
      )
      .map_err(|e| eyre!("Failed to discard snapshot: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
