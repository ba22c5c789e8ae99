//! # agora_core
//!
//! Core domain logic for Agora: principals, roles, tokens and the session
//! lifecycle, with PostgreSQL, Redis and in-memory backends.

pub mod auth;
pub mod cache;
pub mod models;
pub mod store;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
