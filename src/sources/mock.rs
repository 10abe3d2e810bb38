//! Mock adapter for testing purposes.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::error::FetchError;
use crate::models::{IntermediateRecord, RecordBuilder, SourceKind};
use crate::sources::{Page, PageCursor, SourceAdapter};

/// An adapter that serves scripted pages instead of calling a provider.
#[derive(Debug)]
pub struct MockAdapter {
    kind: SourceKind,
    pages: Vec<Vec<Result<IntermediateRecord, FetchError>>>,
    failure: Option<(usize, String)>,
    delay: Duration,
    requested: AtomicUsize,
}

impl MockAdapter {
    /// Create a mock that reports itself as `kind` and has no results.
    pub fn new(kind: SourceKind) -> Self {
        Self {
            kind,
            pages: Vec::new(),
            failure: None,
            delay: Duration::ZERO,
            requested: AtomicUsize::new(0),
        }
    }

    /// Append a page of results.
    pub fn page(mut self, records: Vec<Result<IntermediateRecord, FetchError>>) -> Self {
        self.pages.push(records);
        self
    }

    /// Make the page at `index` (0-based) fail as unavailable.
    pub fn fail_at_page(mut self, index: usize, reason: impl Into<String>) -> Self {
        self.failure = Some((index, reason.into()));
        self
    }

    /// Sleep before answering each page.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Number of pages requested so far, failed ones included.
    pub fn pages_requested(&self) -> usize {
        self.requested.load(Ordering::SeqCst)
    }

    fn page_count(&self) -> usize {
        match &self.failure {
            Some((index, _)) => self.pages.len().max(index + 1),
            None => self.pages.len(),
        }
    }
}

#[async_trait]
impl SourceAdapter for MockAdapter {
    fn kind(&self) -> SourceKind {
        self.kind
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Offset(0)
    }

    async fn fetch_page(
        &self,
        _term: &str,
        cursor: &PageCursor,
        _page_size: usize,
    ) -> Result<Page, FetchError> {
        self.requested.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let index = match cursor {
            PageCursor::Offset(index) => *index,
            PageCursor::Token(token) => {
                return Err(FetchError::unavailable(
                    self.kind,
                    format!("unexpected cursor token '{}'", token),
                ))
            }
        };

        if let Some((fail_index, reason)) = &self.failure {
            if *fail_index == index {
                return Err(FetchError::unavailable(self.kind, reason.clone()));
            }
        }

        let records = self.pages.get(index).cloned().unwrap_or_default();
        let next = (index + 1 < self.page_count()).then(|| PageCursor::Offset(index + 1));
        Ok(Page { records, next })
    }
}

/// Helper function to create a record for testing.
pub fn make_record(kind: SourceKind, source_id: &str, title: &str) -> IntermediateRecord {
    IntermediateRecord {
        source: kind,
        source_id: source_id.to_string(),
        doi: None,
        title: title.to_string(),
        authors: Vec::new(),
        journal: None,
        pub_date: None,
        r#abstract: None,
        url: None,
    }
}

/// Helper function to create a record with a DOI and a date for testing.
pub fn make_dated_record(
    kind: SourceKind,
    source_id: &str,
    title: &str,
    doi: Option<&str>,
    date: Option<&str>,
) -> IntermediateRecord {
    let mut builder = RecordBuilder::new(kind, source_id, title)
        .pub_date(date.and_then(crate::models::PubDate::parse_iso));
    if let Some(doi) = doi {
        builder = builder.doi(doi);
    }
    builder.build().unwrap_or_else(|_| make_record(kind, source_id, title))
}
