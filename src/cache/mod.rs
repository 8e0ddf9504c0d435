//! Query cache for server-owned collections.
//!
//! This module provides a backend-agnostic cache that:
//! - Holds query results under hierarchical keys (`tasks`, `events:calendar:<start>`)
//! - Tracks in-flight fetches so cancelled responses never overwrite newer data
//! - Supports paginated queries and prefix invalidation
//! - Provides basic offline mode (serve stale or persisted data when network unavailable)

mod keys;
mod layer;
mod storage;
mod store;
mod traits;

pub use keys::{CalendarMode, QueryKey, Resource};
pub use layer::QueryClient;
pub use storage::{NoopStorage, Snapshot, SnapshotStorage, SqliteStorage};
pub use store::{CacheStore, MemoryStore};
pub use traits::{CacheResult, CacheSource, QueryData};
