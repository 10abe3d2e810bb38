//! # Literature Collector
//!
//! Collects publication metadata for a set of keywords from PubMed, Crossref
//! and OpenAlex, merges records describing the same work and writes dated
//! CSV snapshots plus a Markdown summary.
//!
//! ## Architecture
//!
//! The library is organized into several modules:
//!
//! - [`models`]: Queries, per-source records and merged canonical records
//! - [`sources`]: Provider adapters behind the [`SourceAdapter`] trait
//! - [`pipeline`]: Concurrent fetch under a deadline, then merge
//! - [`output`]: CSV snapshot, archive and Markdown summary
//! - [`utils`]: Rate gates, retry, HTTP client, normalization and deduplication
//! - [`config`]: Layered configuration management
//! - [`error`]: Error types and exit codes

pub mod config;
pub mod error;
pub mod models;
pub mod output;
pub mod pipeline;
pub mod sources;
pub mod utils;

// Re-export commonly used types
pub use error::{FetchError, HarvestError};
pub use models::{CanonicalRecord, IntermediateRecord, Query, SourceKind};
pub use pipeline::Harvester;
pub use sources::{AdapterRegistry, SourceAdapter};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
