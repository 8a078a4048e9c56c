//! Minimal HTTP query shim
//!
//! A thin axum surface over the search indexer so embedding-backed search is
//! reachable without the CLI. Not a user-facing API.

pub mod search;

pub use search::{router, ApiState};
