//! Crossref source implementation.
//!
//! Crossref's `/works` search has no boolean operators, so OR queries run
//! one cursor-paginated sub-query per keyword and AND queries send every
//! keyword in a single `query`.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::FetchError;
use crate::models::{FetchRequest, IntermediateRecord, KeywordJoin, PubDate, RecordBuilder, SourceKind};
use crate::sources::{doi_url, Page, PageCursor, SourceAdapter, SourceError};
use crate::utils::{strip_markup, ProviderClient};

const CROSSREF_API_BASE: &str = "https://api.crossref.org";

/// Crossref adapter
///
/// A `mailto` address moves requests into Crossref's polite pool.
#[derive(Debug, Clone)]
pub struct CrossRefAdapter {
    client: ProviderClient,
    base_url: String,
    mailto: Option<String>,
}

impl CrossRefAdapter {
    pub fn new(client: ProviderClient, mailto: Option<String>) -> Self {
        Self {
            client,
            base_url: CROSSREF_API_BASE.to_string(),
            mailto,
        }
    }

    /// Point the adapter at another host (for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SourceAdapter for CrossRefAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::CrossRef
    }

    fn search_terms(&self, request: &FetchRequest) -> Vec<String> {
        match request.join {
            KeywordJoin::Or => request.keywords.clone(),
            KeywordJoin::And => vec![request.keywords.join(" ")],
        }
    }

    async fn fetch_page(
        &self,
        term: &str,
        cursor: &PageCursor,
        page_size: usize,
    ) -> Result<Page, FetchError> {
        let cursor = match cursor {
            PageCursor::Token(token) => token.clone(),
            PageCursor::Offset(_) => "*".to_string(),
        };

        let mut params = vec![
            ("query", term.to_string()),
            ("rows", page_size.to_string()),
            ("cursor", cursor),
            ("filter", "type:journal-article".to_string()),
            ("sort", "published".to_string()),
            ("order", "desc".to_string()),
        ];
        if let Some(mailto) = &self.mailto {
            params.push(("mailto", mailto.clone()));
        }

        let url = format!("{}/works", self.base_url);
        let body = self
            .client
            .get_text(&url, &params)
            .await
            .map_err(|e| e.into_unavailable(SourceKind::CrossRef))?;

        parse_page(&body, page_size).map_err(|e| e.into_unavailable(SourceKind::CrossRef))
    }
}

fn parse_page(body: &str, page_size: usize) -> Result<Page, SourceError> {
    let data: CRResponse = serde_json::from_str(body)?;

    let item_count = data.message.items.len();
    let records = data.message.items.into_iter().map(map_item).collect();

    // A short page is the last one; Crossref keeps handing out cursors regardless
    let next = if item_count < page_size {
        None
    } else {
        data.message.next_cursor.map(PageCursor::Token)
    };

    Ok(Page { records, next })
}

fn map_item(value: serde_json::Value) -> Result<IntermediateRecord, FetchError> {
    let raw_doi = value.get("DOI").and_then(|d| d.as_str()).map(str::to_string);
    let item: CRItem = serde_json::from_value(value)
        .map_err(|e| FetchError::malformed(SourceKind::CrossRef, raw_doi.clone(), e.to_string()))?;

    let Some(doi) = item.doi.filter(|d| !d.trim().is_empty()) else {
        return Err(FetchError::malformed(SourceKind::CrossRef, None, "missing DOI"));
    };

    let title = item
        .title
        .iter()
        .map(|t| strip_markup(t))
        .find(|t| !t.is_empty())
        .unwrap_or_default();

    let authors = item.author.iter().filter_map(CRAuthor::display_name);

    let pub_date = [
        &item.published_print,
        &item.published_online,
        &item.issued,
        &item.created,
    ]
    .into_iter()
    .find_map(|d| d.as_ref().and_then(CRDate::to_pub_date));

    let url = match crate::utils::normalize_doi(&doi) {
        Some(normalized) => doi_url(&normalized),
        None => item.url.clone().unwrap_or_default(),
    };

    let mut builder = RecordBuilder::new(SourceKind::CrossRef, doi.as_str(), title)
        .doi(&doi)
        .authors(authors)
        .pub_date(pub_date)
        .url(url);
    if let Some(journal) = item.container_title.first() {
        builder = builder.journal(journal);
    }
    if let Some(text) = &item.r#abstract {
        builder = builder.abstract_text(strip_markup(text));
    }

    builder
        .build()
        .map_err(|reason| FetchError::malformed(SourceKind::CrossRef, Some(doi), reason))
}

// ===== Crossref API Types =====

#[derive(Debug, Deserialize)]
struct CRResponse {
    message: CRMessage,
}

#[derive(Debug, Deserialize)]
struct CRMessage {
    #[serde(default)]
    items: Vec<serde_json::Value>,
    #[serde(rename = "next-cursor")]
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRItem {
    #[serde(rename = "DOI")]
    doi: Option<String>,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CRAuthor>,
    #[serde(rename = "container-title", default)]
    container_title: Vec<String>,
    #[serde(rename = "published-print")]
    published_print: Option<CRDate>,
    #[serde(rename = "published-online")]
    published_online: Option<CRDate>,
    issued: Option<CRDate>,
    created: Option<CRDate>,
    r#abstract: Option<String>,
    #[serde(rename = "URL")]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CRAuthor {
    given: Option<String>,
    family: Option<String>,
    name: Option<String>,
}

impl CRAuthor {
    /// `family, given` for structured names, `name` for organizations
    fn display_name(&self) -> Option<String> {
        match (self.family.as_deref(), self.given.as_deref()) {
            (Some(family), Some(given)) if !given.trim().is_empty() => {
                Some(format!("{}, {}", family.trim(), given.trim()))
            }
            (Some(family), _) => Some(family.to_string()),
            (None, Some(given)) => Some(given.to_string()),
            (None, None) => self.name.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CRDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CRDate {
    fn to_pub_date(&self) -> Option<PubDate> {
        let parts = self.date_parts.first()?;
        let year = (*parts.first()?)?;
        let month = parts.get(1).copied().flatten().map(|m| m as u32);
        let day = parts.get(2).copied().flatten().map(|d| d as u32);
        PubDate::from_parts(year, month, day)
    }
}
