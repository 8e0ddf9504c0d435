//! Backend REST API: domain types, request bodies and the typed client.

pub mod client;
pub mod requests;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{ApiClient, ApiRequest, HttpTransport, Method, Transport};
