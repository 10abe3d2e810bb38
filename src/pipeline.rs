//! The fetch, normalize, deduplicate and merge pipeline of one run.
//!
//! Every requested source runs in its own task and drains its adapter's
//! stream into a private buffer. A single deadline bounds all tasks; a source
//! that fails or runs out of time contributes nothing. The merge runs once
//! every task has finished.

use futures_util::StreamExt;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};

use crate::config::RunConfig;
use crate::error::{FetchError, HarvestError, SourceFailure};
use crate::models::{FetchRequest, IntermediateRecord, KeywordJoin, Query, ResultSet, SourceKind};
use crate::sources::{AdapterRegistry, SourceAdapter};
use crate::utils::RecordMerger;

/// Longest fetch phase a run accepts; larger deadlines are capped
pub const MAX_RUN_DEADLINE: Duration = Duration::from_secs(7 * 24 * 3600);

/// Per-run fetch parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSettings {
    pub join: KeywordJoin,
    pub page_size: usize,
    pub max_pages: usize,
    /// Upper bound on the whole fetch phase
    pub deadline: Duration,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            join: KeywordJoin::Or,
            page_size: 20,
            max_pages: 5,
            deadline: Duration::from_secs(300),
        }
    }
}

impl From<&RunConfig> for RunSettings {
    fn from(run: &RunConfig) -> Self {
        Self {
            join: run.keyword_join,
            page_size: run.page_size,
            max_pages: run.max_pages,
            deadline: run.deadline(),
        }
    }
}

/// How one source ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceStatus {
    Completed { records: usize },
    Failed { reason: String },
    TimedOut,
}

/// Report line for one source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    pub source: SourceKind,
    pub status: SourceStatus,
    /// Records skipped because they could not be mapped
    pub malformed: usize,
}

impl fmt::Display for SourceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            SourceStatus::Completed { records } => write!(f, "{}: completed with {} records", self.source, records)?,
            SourceStatus::Failed { reason } => write!(f, "{}: failed ({})", self.source, reason)?,
            SourceStatus::TimedOut => write!(f, "{}: timed out", self.source)?,
        }
        if self.malformed > 0 {
            write!(f, ", {} malformed records skipped", self.malformed)?;
        }
        Ok(())
    }
}

/// Outcome of every requested source, in provider order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub sources: Vec<SourceReport>,
}

impl RunReport {
    pub fn completed(&self) -> usize {
        self.sources
            .iter()
            .filter(|s| matches!(s.status, SourceStatus::Completed { .. }))
            .count()
    }

    /// Sources that contributed nothing, with the reason
    pub fn failures(&self) -> Vec<SourceFailure> {
        self.sources
            .iter()
            .filter_map(|s| {
                let reason = match &s.status {
                    SourceStatus::Completed { .. } => return None,
                    SourceStatus::Failed { reason } => reason.clone(),
                    SourceStatus::TimedOut => "timed out".to_string(),
                };
                Some(SourceFailure {
                    source: s.source,
                    reason,
                })
            })
            .collect()
    }

    /// Log every line of the report
    pub fn log(&self) {
        for source in &self.sources {
            match source.status {
                SourceStatus::Completed { .. } => tracing::info!("{}", source),
                _ => tracing::warn!("{}", source),
            }
        }
    }
}

/// Result of a run that produced output
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub results: ResultSet,
    pub report: RunReport,
}

/// Records drained from one adapter before it ended
#[derive(Debug, Default)]
struct Drained {
    records: Vec<IntermediateRecord>,
    malformed: usize,
    failure: Option<String>,
}

/// Runs the configured adapters and merges their output
#[derive(Debug, Clone)]
pub struct Harvester {
    registry: AdapterRegistry,
    merger: RecordMerger,
    settings: RunSettings,
}

impl Harvester {
    pub fn new(registry: AdapterRegistry, merger: RecordMerger, settings: RunSettings) -> Self {
        Self {
            registry,
            merger,
            settings,
        }
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Fetch from every source of `query` concurrently and merge the results.
    ///
    /// Fails with [`HarvestError::TotalFailure`] when no source completed.
    pub async fn run(&self, query: &Query) -> Result<RunOutput, HarvestError> {
        let request = FetchRequest::new(query)
            .join(self.settings.join)
            .page_size(self.settings.page_size)
            .max_pages(self.settings.max_pages);
        let deadline = Instant::now() + self.settings.deadline.min(MAX_RUN_DEADLINE);

        tracing::info!(
            "Collecting {} keywords from {} sources",
            request.keywords.len(),
            query.sources().len()
        );

        let mut tasks = Vec::new();
        let mut reports = Vec::new();
        let mut records = Vec::new();

        for &kind in query.sources() {
            let Some(adapter) = self.registry.get(kind) else {
                reports.push(SourceReport {
                    source: kind,
                    status: SourceStatus::Failed {
                        reason: "no adapter registered".to_string(),
                    },
                    malformed: 0,
                });
                continue;
            };

            let adapter = Arc::clone(adapter);
            let request = request.clone();
            let task = tokio::spawn(async move { timeout_at(deadline, drain(adapter, request)).await });
            tasks.push((kind, task));
        }

        for (kind, task) in tasks {
            let report = match task.await {
                Ok(Ok(drained)) => {
                    let status = match drained.failure {
                        Some(reason) => SourceStatus::Failed { reason },
                        None => {
                            let count = drained.records.len();
                            records.extend(drained.records);
                            SourceStatus::Completed { records: count }
                        }
                    };
                    SourceReport {
                        source: kind,
                        status,
                        malformed: drained.malformed,
                    }
                }
                Ok(Err(_elapsed)) => SourceReport {
                    source: kind,
                    status: SourceStatus::TimedOut,
                    malformed: 0,
                },
                Err(e) => {
                    tracing::error!("{} task failed: {}", kind, e);
                    SourceReport {
                        source: kind,
                        status: SourceStatus::Failed {
                            reason: format!("task failed: {}", e),
                        },
                        malformed: 0,
                    }
                }
            };
            reports.push(report);
        }

        reports.sort_by_key(|r| r.source);
        let report = RunReport { sources: reports };
        report.log();

        if report.completed() == 0 {
            return Err(HarvestError::TotalFailure {
                failures: report.failures(),
            });
        }

        let results = self.merger.merge(records);
        tracing::info!("Collected {} distinct publications", results.len());

        Ok(RunOutput { results, report })
    }
}

/// Drain an adapter's stream; a source failure discards everything it produced
async fn drain(adapter: Arc<dyn SourceAdapter>, request: FetchRequest) -> Drained {
    let mut drained = Drained::default();
    let mut stream = adapter.fetch(&request);

    while let Some(item) = stream.next().await {
        match item {
            Ok(record) => drained.records.push(record),
            Err(e @ FetchError::MalformedRecord { .. }) => {
                tracing::warn!("Skipping {}", e);
                drained.malformed += 1;
            }
            Err(FetchError::SourceUnavailable { reason, .. }) => {
                drained.records.clear();
                drained.failure = Some(reason);
                break;
            }
        }
    }

    drained
}
