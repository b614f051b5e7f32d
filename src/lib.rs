// src/lib.rs
// Public library surface for the binary and integration tests.

pub mod config;
pub mod error;
pub mod feed;
pub mod ingest;
pub mod item;
pub mod metrics;
pub mod pipeline;
pub mod reconcile;
pub mod store;
pub mod translate;

// ---- Re-exports for stable public API ----
pub use crate::config::FeedConfig;
pub use crate::error::{ConfigError, FetchError, PersistenceError, RunError, TranslationError};
pub use crate::item::Item;
pub use crate::pipeline::{run, RunSummary};
