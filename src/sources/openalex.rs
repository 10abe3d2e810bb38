//! OpenAlex source implementation.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};

use crate::error::FetchError;
use crate::models::{IntermediateRecord, PubDate, RecordBuilder, SourceKind};
use crate::sources::{doi_url, Page, PageCursor, SourceAdapter, SourceError};
use crate::utils::ProviderClient;

const OPENALEX_API_BASE: &str = "https://api.openalex.org";

/// Prefix of OpenAlex entity URLs, stripped to get the work ID
const OPENALEX_ID_PREFIX: &str = "https://openalex.org/";

/// OpenAlex adapter
///
/// An email address joins the polite pool; an API key unlocks premium limits.
#[derive(Debug, Clone)]
pub struct OpenAlexAdapter {
    client: ProviderClient,
    base_url: String,
    email: Option<String>,
    api_key: Option<String>,
}

impl OpenAlexAdapter {
    pub fn new(client: ProviderClient, email: Option<String>, api_key: Option<String>) -> Self {
        Self {
            client,
            base_url: OPENALEX_API_BASE.to_string(),
            email,
            api_key,
        }
    }

    /// Point the adapter at another host (for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl SourceAdapter for OpenAlexAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::OpenAlex
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
            ("search", term.to_string()),
            ("per-page", page_size.min(200).to_string()),
            ("cursor", cursor),
            ("sort", "publication_date:desc".to_string()),
        ];
        if let Some(email) = &self.email {
            params.push(("mailto", email.clone()));
        }
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }

        let url = format!("{}/works", self.base_url);
        let body = self
            .client
            .get_text(&url, &params)
            .await
            .map_err(|e| e.into_unavailable(SourceKind::OpenAlex))?;

        parse_page(&body).map_err(|e| e.into_unavailable(SourceKind::OpenAlex))
    }
}

fn parse_page(body: &str) -> Result<Page, SourceError> {
    let data: WorksResponse = serde_json::from_str(body)?;

    let next = if data.results.is_empty() {
        None
    } else {
        data.meta.next_cursor.map(PageCursor::Token)
    };
    let records = data.results.into_iter().map(map_work).collect();

    Ok(Page { records, next })
}

fn map_work(value: serde_json::Value) -> Result<IntermediateRecord, FetchError> {
    let raw_id = value.get("id").and_then(|v| v.as_str()).map(work_id);
    let work: OAWork = serde_json::from_value(value)
        .map_err(|e| FetchError::malformed(SourceKind::OpenAlex, raw_id.clone(), e.to_string()))?;

    let Some(id) = work.id.as_deref().map(work_id).filter(|id| !id.is_empty()) else {
        return Err(FetchError::malformed(SourceKind::OpenAlex, None, "missing work id"));
    };

    let title = work
        .title
        .as_deref()
        .or(work.display_name.as_deref())
        .unwrap_or_default();

    let doi = work
        .doi
        .as_deref()
        .or(work.ids.as_ref().and_then(|ids| ids.doi.as_deref()))
        .and_then(crate::utils::normalize_doi);

    let pub_date = work
        .publication_date
        .as_deref()
        .and_then(PubDate::parse_iso)
        .or_else(|| work.publication_year.and_then(|y| PubDate::from_parts(y, None, None)));

    let authors = work
        .authorships
        .iter()
        .filter_map(|a| a.author.as_ref().and_then(|author| author.display_name.clone()));

    let location = work.primary_location.as_ref();
    let journal = location
        .and_then(|l| l.source.as_ref())
        .and_then(|s| s.display_name.as_deref());

    let url = match &doi {
        Some(doi) => doi_url(doi),
        None => location
            .and_then(|l| l.landing_page_url.clone())
            .or_else(|| work.id.clone())
            .unwrap_or_default(),
    };

    let mut builder = RecordBuilder::new(SourceKind::OpenAlex, id.as_str(), title)
        .authors(authors)
        .pub_date(pub_date)
        .url(url);
    if let Some(doi) = &doi {
        builder = builder.doi(doi);
    }
    if let Some(journal) = journal {
        builder = builder.journal(journal);
    }
    if let Some(index) = &work.abstract_inverted_index {
        builder = builder.abstract_text(rebuild_abstract(index));
    }

    builder
        .build()
        .map_err(|reason| FetchError::malformed(SourceKind::OpenAlex, Some(id), reason))
}

fn work_id(id: &str) -> String {
    id.trim().trim_start_matches(OPENALEX_ID_PREFIX).to_string()
}

/// Rebuild plain text from OpenAlex's word → positions index
fn rebuild_abstract(index: &HashMap<String, Vec<usize>>) -> String {
    let positioned: BTreeMap<usize, &str> = index
        .iter()
        .flat_map(|(word, positions)| positions.iter().map(move |&p| (p, word.as_str())))
        .collect();

    positioned.into_values().collect::<Vec<_>>().join(" ")
}

// ===== OpenAlex API Types =====

#[derive(Debug, Deserialize)]
struct WorksResponse {
    #[serde(default)]
    results: Vec<serde_json::Value>,
    meta: Meta,
}

#[derive(Debug, Deserialize)]
struct Meta {
    next_cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAWork {
    id: Option<String>,
    doi: Option<String>,
    title: Option<String>,
    display_name: Option<String>,
    publication_date: Option<String>,
    publication_year: Option<i32>,
    #[serde(default)]
    authorships: Vec<OAAuthorship>,
    primary_location: Option<OALocation>,
    abstract_inverted_index: Option<HashMap<String, Vec<usize>>>,
    ids: Option<OAIds>,
}

#[derive(Debug, Deserialize)]
struct OAIds {
    doi: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OAAuthorship {
    author: Option<OAAuthor>,
}

#[derive(Debug, Deserialize)]
struct OAAuthor {
    display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OALocation {
    landing_page_url: Option<String>,
    source: Option<OASource>,
}

#[derive(Debug, Deserialize)]
struct OASource {
    display_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DatePrecision, FetchRequest, Query};
    use crate::utils::{HttpSettings, RateGate, RetryConfig};
    use futures_util::StreamExt;
    use std::sync::Arc;
    use std::time::Duration;

    fn test_client() -> ProviderClient {
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        let gate = Arc::new(RateGate::new(SourceKind::OpenAlex, Duration::from_millis(1)));
        ProviderClient::new(SourceKind::OpenAlex, &HttpSettings::default(), gate, retry).unwrap()
    }

    fn work(id: &str, doi: Option<&str>) -> serde_json::Value {
        serde_json::json!({
            "id": format!("https://openalex.org/{}", id),
            "doi": doi,
            "title": "Deep learning for valvular heart disease",
            "publication_date": "2024-02-10",
            "publication_year": 2024,
            "authorships": [
                {"author": {"display_name": "Ada Lovelace"}},
                {"author": {"display_name": "Alan Turing"}}
            ],
            "primary_location": {
                "landing_page_url": "https://journal.example/article",
                "source": {"display_name": "Cardiology AI"}
            },
            "abstract_inverted_index": {"Deep": [0], "learning": [1], "helps.": [3], "often": [2]}
        })
    }

    #[test]
    fn test_map_work() {
        let record = map_work(work("W123", Some("https://doi.org/10.5555/DL"))).unwrap();

        assert_eq!(record.source_id, "W123");
        assert_eq!(record.doi.as_deref(), Some("10.5555/dl"));
        assert_eq!(record.title, "Deep learning for valvular heart disease");
        assert_eq!(record.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(record.journal.as_deref(), Some("Cardiology AI"));
        assert_eq!(record.r#abstract.as_deref(), Some("Deep learning often helps."));
        assert_eq!(record.url.as_deref(), Some("https://doi.org/10.5555/dl"));
        assert_eq!(record.pub_date.unwrap().precision, DatePrecision::Day);
    }

    #[test]
    fn test_map_work_without_doi() {
        let record = map_work(work("W9", None)).unwrap();
        assert_eq!(record.doi, None);
        assert_eq!(record.url.as_deref(), Some("https://journal.example/article"));
    }

    #[test]
    fn test_map_work_year_only() {
        let value = serde_json::json!({
            "id": "https://openalex.org/W1",
            "display_name": "Fallback title",
            "publication_year": 2019,
            "authorships": [{"author": null}]
        });
        let record = map_work(value).unwrap();
        assert_eq!(record.title, "Fallback title");
        assert_eq!(record.pub_date.unwrap().precision, DatePrecision::Year);
        assert!(record.authors.is_empty());
        assert_eq!(record.url.as_deref(), Some("https://openalex.org/W1"));
    }

    #[test]
    fn test_map_work_malformed() {
        let no_title = serde_json::json!({"id": "https://openalex.org/W2", "title": null});
        assert!(matches!(
            map_work(no_title),
            Err(FetchError::MalformedRecord { record_id: Some(id), .. }) if id == "W2"
        ));

        let no_id = serde_json::json!({"title": "Orphan"});
        assert!(matches!(map_work(no_id), Err(FetchError::MalformedRecord { record_id: None, .. })));
    }

    #[test]
    fn test_rebuild_abstract_orders_by_position() {
        let mut index = HashMap::new();
        index.insert("the".to_string(), vec![0, 2]);
        index.insert("valve".to_string(), vec![1]);
        index.insert("root".to_string(), vec![3]);
        assert_eq!(rebuild_abstract(&index), "the valve the root");
    }

    #[tokio::test]
    async fn test_fetch_uses_cursor_and_mailto() {
        let mut server = mockito::Server::new_async().await;
        let first = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("search".into(), "\"deep learning\" OR tavr".into()),
                mockito::Matcher::UrlEncoded("cursor".into(), "*".into()),
                mockito::Matcher::UrlEncoded("mailto".into(), "lab@example.org".into()),
            ]))
            .with_body(
                serde_json::json!({"meta": {"next_cursor": "c2"}, "results": [work("W1", None)]}).to_string(),
            )
            .create_async()
            .await;
        let last = server
            .mock("GET", "/works")
            .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "c2".into()))
            .with_body(serde_json::json!({"meta": {"next_cursor": null}, "results": []}).to_string())
            .create_async()
            .await;

        let adapter = OpenAlexAdapter::new(test_client(), Some("lab@example.org".into()), None)
            .with_base_url(server.url());
        let query = Query::parse("deep learning, tavr", None).unwrap();
        let request = FetchRequest::new(&query);

        let records: Vec<_> = adapter.fetch(&request).collect().await;
        assert_eq!(records.len(), 1);
        first.assert_async().await;
        last.assert_async().await;
    }
}
