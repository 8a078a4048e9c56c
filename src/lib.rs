//! Recipe ingestion and enrichment pipeline
//!
//! Consumes heterogeneous recipe text (scraped feeds, CSV dumps, bus
//! events), normalizes each item into a structured recipe record, stores it
//! with deduplication, and projects it into a full-text/semantic search
//! index. Data flows ingest → parse → stage → load → sync; control flows
//! through batch workflows and recurring schedules.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod identity;
pub mod models;
pub mod services;
pub mod staging;
pub mod utils;
pub mod workflow;

pub use error::{Error, Result};
