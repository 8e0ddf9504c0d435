//! Optimistic cache synchronization for a unified tasks, mail and
//! calendar inbox.
//!
//! [`sync::SyncClient`] applies every write to the local query cache
//! first and reconciles with the backend once the request settles.

pub mod api;
pub mod app;
pub mod cache;
pub mod commands;
pub mod config;
pub mod event;
pub mod logging;
pub mod ordering;
pub mod render;
pub mod scheduler;
pub mod sync;
