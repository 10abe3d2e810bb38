//! Source adapters for the bibliographic providers.
//!
//! This module defines the [`SourceAdapter`] trait that all providers
//! implement. The set of providers is closed ([`SourceKind`]); adapters are
//! registered once at startup in the [`AdapterRegistry`], keyed by that enum.
//!
//! # Pagination
//!
//! An adapter only knows how to fetch one page ([`SourceAdapter::fetch_page`]).
//! The provided [`SourceAdapter::fetch`] turns that into a lazy stream: every
//! page is requested only when the previous one has been consumed, and the
//! stream stops when the provider reports no further results or when the
//! request's page budget is spent. Adapters with several search terms take
//! turns, one page per term, so the budget is shared rather than consumed by
//! the first term.
//!
//! # Credentials
//!
//! - `NCBI_API_KEY`, `NCBI_EMAIL` - PubMed E-utilities key and contact
//! - `CROSSREF_MAILTO` - Crossref polite pool contact
//! - `OPENALEX_EMAIL`, `OPENALEX_API_KEY` - OpenAlex polite pool / premium key
//!
//! All are optional; without them adapters stay on the default rate limits.

mod crossref;
pub mod mock;
mod openalex;
mod pubmed;
mod registry;

pub use crossref::CrossRefAdapter;
pub use mock::MockAdapter;
pub use openalex::OpenAlexAdapter;
pub use pubmed::PubMedAdapter;
pub use registry::AdapterRegistry;

use async_trait::async_trait;
use futures_util::stream::Stream;
use std::collections::VecDeque;
use std::pin::Pin;
use std::time::Duration;

use crate::error::FetchError;
use crate::models::{FetchRequest, IntermediateRecord, SourceKind};

/// Lazy, finite sequence of records from one adapter.
///
/// `Err(MalformedRecord)` items are skipped by consumers; an
/// `Err(SourceUnavailable)` item is always the last one.
pub type RecordStream<'a> =
    Pin<Box<dyn Stream<Item = Result<IntermediateRecord, FetchError>> + Send + 'a>>;

/// Position of the next page
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCursor {
    /// Offset-based paging (PubMed `retstart`)
    Offset(usize),
    /// Opaque deep-paging cursor (Crossref, OpenAlex)
    Token(String),
}

/// One page of mapped provider results
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub records: Vec<Result<IntermediateRecord, FetchError>>,

    /// Cursor of the following page, `None` when the provider has no more results
    pub next: Option<PageCursor>,
}

/// Interface implemented by each provider
#[async_trait]
pub trait SourceAdapter: Send + Sync + std::fmt::Debug {
    /// Which provider this adapter talks to
    fn kind(&self) -> SourceKind;

    /// Cursor for the first page of a search
    fn first_cursor(&self) -> PageCursor {
        PageCursor::Token("*".to_string())
    }

    /// Provider search terms for a request.
    ///
    /// Each term is paginated independently; pages are requested round-robin.
    /// Providers with boolean query syntax use a single expression.
    fn search_terms(&self, request: &FetchRequest) -> Vec<String> {
        vec![request.boolean_expression()]
    }

    /// Fetch and map a single page
    async fn fetch_page(
        &self,
        term: &str,
        cursor: &PageCursor,
        page_size: usize,
    ) -> Result<Page, FetchError>;

    /// Lazily fetch every page for `request`.
    ///
    /// Not restartable: calling it again issues the requests again.
    fn fetch<'a>(&'a self, request: &'a FetchRequest) -> RecordStream<'a> {
        Box::pin(async_stream::stream! {
            let mut pages_left = request.max_pages;
            let mut pending: VecDeque<(String, PageCursor)> = self
                .search_terms(request)
                .into_iter()
                .map(|term| (term, self.first_cursor()))
                .collect();

            while let Some((term, cursor)) = pending.pop_front() {
                if pages_left == 0 {
                    tracing::debug!("{} page budget of {} spent", self.kind(), request.max_pages);
                    return;
                }
                pages_left -= 1;

                let page = match self.fetch_page(&term, &cursor, request.page_size).await {
                    Ok(page) => page,
                    Err(e) => {
                        yield Err(e);
                        return;
                    }
                };

                tracing::debug!(
                    "{} page for '{}' returned {} records",
                    self.kind(),
                    term,
                    page.records.len()
                );

                let empty = page.records.is_empty();
                for record in page.records {
                    yield record;
                }

                if let Some(next) = page.next.filter(|_| !empty) {
                    pending.push_back((term, next));
                }
            }
        })
    }
}

/// Errors from a single provider HTTP call
#[derive(Debug, Clone, thiserror::Error)]
pub enum SourceError {
    /// Connection failure or interrupted response body
    #[error("Network error: {0}")]
    Network(String),

    /// Request timed out
    #[error("Request timed out")]
    Timeout,

    /// HTTP 429
    #[error("Rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },

    /// HTTP 5xx
    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Any other unsuccessful status; never retried
    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    /// Response body could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// A transient error persisted through every retry
    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: Box<SourceError> },
}

impl SourceError {
    /// Convert into the per-source failure reported by the adapter
    pub fn into_unavailable(self, provider: SourceKind) -> FetchError {
        FetchError::unavailable(provider, self.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(format!("JSON: {}", err))
    }
}

impl From<quick_xml::Error> for SourceError {
    fn from(err: quick_xml::Error) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

/// `https://doi.org/<doi>` landing URL
pub(crate) fn doi_url(doi: &str) -> String {
    format!("https://doi.org/{}", doi)
}
