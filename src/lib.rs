// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod ai_bootstrap;
pub mod api;
pub mod config;
pub mod error;
pub mod freshness;
pub mod hints;
pub mod ingest;
pub mod metrics;
pub mod model;
pub mod query;
pub mod scheduler;
pub mod store;
pub mod summarize;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::error::{Error, Result};
