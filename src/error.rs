//! Error types for a collection run.
//!
//! Per-source failures ([`FetchError`]) are recovered inside the pipeline;
//! [`HarvestError`] ends the run.

use std::fmt;
use std::path::PathBuf;

use crate::models::SourceKind;

/// Errors raised while fetching from one provider
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Provider unreachable, retries exhausted, permanent HTTP error or unparseable body
    #[error("{provider} unavailable: {reason}")]
    SourceUnavailable { provider: SourceKind, reason: String },

    /// A single record could not be mapped; the rest of the stream is unaffected
    #[error("malformed {provider} record{}: {reason}", record_label(.record_id))]
    MalformedRecord {
        provider: SourceKind,
        record_id: Option<String>,
        reason: String,
    },
}

fn record_label(record_id: &Option<String>) -> String {
    match record_id {
        Some(id) => format!(" {}", id),
        None => String::new(),
    }
}

impl FetchError {
    pub fn unavailable(provider: SourceKind, reason: impl Into<String>) -> Self {
        FetchError::SourceUnavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub fn malformed(provider: SourceKind, record_id: Option<String>, reason: impl Into<String>) -> Self {
        FetchError::MalformedRecord {
            provider,
            record_id,
            reason: reason.into(),
        }
    }
}

/// Why one source contributed nothing to a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFailure {
    pub source: SourceKind,
    pub reason: String,
}

impl fmt::Display for SourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.reason)
    }
}

/// Errors that terminate a run
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// Output persistence failed; no partial output was left behind
    #[error("Failed to write {}: {source}", path.display())]
    WriteFailure {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Every requested source failed
    #[error("All sources failed: {}", join_failures(.failures))]
    TotalFailure { failures: Vec<SourceFailure> },
}

fn join_failures(failures: &[SourceFailure]) -> String {
    failures
        .iter()
        .map(|f| f.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl HarvestError {
    pub fn write_failure(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarvestError::WriteFailure {
            path: path.into(),
            source,
        }
    }

    /// Process exit code for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            HarvestError::TotalFailure { .. } => 1,
            _ => 2,
        }
    }
}

impl From<config::ConfigError> for HarvestError {
    fn from(err: config::ConfigError) -> Self {
        HarvestError::Config(err.to_string())
    }
}
