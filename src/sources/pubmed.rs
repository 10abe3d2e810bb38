//! PubMed source implementation using the NCBI E-utilities API.
//!
//! A page is one `esearch` call (JSON, PMIDs sorted by publication date)
//! followed by one `efetch` call (XML) for the PMIDs it returned.

use async_trait::async_trait;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;

use crate::error::FetchError;
use crate::models::{IntermediateRecord, PubDate, RecordBuilder, SourceKind};
use crate::sources::{doi_url, Page, PageCursor, SourceAdapter, SourceError};
use crate::utils::ProviderClient;

/// E-utilities base URL
const EUTILS_BASE_URL: &str = "https://eutils.ncbi.nlm.nih.gov/entrez/eutils";

/// Tool name reported to NCBI alongside the contact email
const TOOL_NAME: &str = "literature-collector";

/// PubMed adapter
#[derive(Debug, Clone)]
pub struct PubMedAdapter {
    client: ProviderClient,
    base_url: String,
    api_key: Option<String>,
    email: Option<String>,
}

impl PubMedAdapter {
    /// Create a new PubMed adapter.
    ///
    /// `api_key` raises NCBI's rate limit; `email` is sent as the contact
    /// address NCBI asks for.
    pub fn new(client: ProviderClient, api_key: Option<String>, email: Option<String>) -> Self {
        Self {
            client,
            base_url: EUTILS_BASE_URL.to_string(),
            api_key,
            email,
        }
    }

    /// Point the adapter at another E-utilities host (for testing)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn base_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("db", "pubmed".to_string())];
        if let Some(key) = &self.api_key {
            params.push(("api_key", key.clone()));
        }
        if let Some(email) = &self.email {
            params.push(("email", email.clone()));
            params.push(("tool", TOOL_NAME.to_string()));
        }
        params
    }

    /// Search PubMed and return the total hit count and one page of PMIDs
    async fn esearch(&self, term: &str, offset: usize, page_size: usize) -> Result<(usize, Vec<String>), SourceError> {
        let mut params = self.base_params();
        params.push(("term", term.to_string()));
        params.push(("retstart", offset.to_string()));
        params.push(("retmax", page_size.to_string()));
        params.push(("retmode", "json".to_string()));
        params.push(("sort", "pub_date".to_string()));

        let url = format!("{}/esearch.fcgi", self.base_url);
        let body = self.client.get_text(&url, &params).await?;
        parse_esearch(&body)
    }

    /// Fetch the article XML for a list of PMIDs
    async fn efetch(&self, pmids: &[String]) -> Result<String, SourceError> {
        let mut params = self.base_params();
        params.push(("id", pmids.join(",")));
        params.push(("retmode", "xml".to_string()));

        let url = format!("{}/efetch.fcgi", self.base_url);
        self.client.get_text(&url, &params).await
    }
}

#[async_trait]
impl SourceAdapter for PubMedAdapter {
    fn kind(&self) -> SourceKind {
        SourceKind::PubMed
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Offset(0)
    }

    async fn fetch_page(
        &self,
        term: &str,
        cursor: &PageCursor,
        page_size: usize,
    ) -> Result<Page, FetchError> {
        let offset = match cursor {
            PageCursor::Offset(offset) => *offset,
            PageCursor::Token(token) => {
                return Err(FetchError::unavailable(
                    SourceKind::PubMed,
                    format!("unsupported cursor '{}'", token),
                ))
            }
        };

        let (count, pmids) = self
            .esearch(term, offset, page_size)
            .await
            .map_err(|e| e.into_unavailable(SourceKind::PubMed))?;

        if pmids.is_empty() {
            return Ok(Page::default());
        }

        let xml = self
            .efetch(&pmids)
            .await
            .map_err(|e| e.into_unavailable(SourceKind::PubMed))?;
        let records = parse_articles(&xml).map_err(|e| e.into_unavailable(SourceKind::PubMed))?;

        let consumed = offset + pmids.len();
        let next = (consumed < count).then_some(PageCursor::Offset(consumed));

        Ok(Page { records, next })
    }
}

#[derive(Debug, Deserialize)]
struct ESearchResponse {
    esearchresult: Option<ESearchResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ESearchResult {
    #[serde(default)]
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

fn parse_esearch(body: &str) -> Result<(usize, Vec<String>), SourceError> {
    let response: ESearchResponse = serde_json::from_str(body)?;

    let result = match response.esearchresult {
        Some(result) => result,
        None => {
            let reason = response.error.unwrap_or_else(|| "missing esearchresult".to_string());
            return Err(SourceError::Parse(format!("PubMed esearch: {}", reason)));
        }
    };

    if let Some(error) = result.error {
        return Err(SourceError::Api {
            status: 200,
            message: error,
        });
    }

    let count = result
        .count
        .as_deref()
        .and_then(|c| c.parse::<usize>().ok())
        .unwrap_or(result.idlist.len());

    Ok((count, result.idlist))
}

/// Fields collected while walking one `<PubmedArticle>`
#[derive(Debug, Default)]
struct ArticleFields {
    pmid: String,
    title: String,
    journal: String,
    doi: Option<String>,
    elocation_doi: Option<String>,
    authors: Vec<String>,
    abstract_sections: Vec<String>,
    issue_date: DateParts,
    article_date: DateParts,
}

#[derive(Debug, Default)]
struct DateParts {
    year: String,
    month: String,
    day: String,
    medline: String,
}

impl DateParts {
    fn to_pub_date(&self) -> Option<PubDate> {
        if !self.year.is_empty() {
            let year = self.year.trim().parse::<i32>().ok()?;
            let month = parse_month(&self.month);
            let day = month.and(self.day.trim().parse::<u32>().ok());
            return PubDate::from_parts(year, month, day);
        }
        parse_medline_date(&self.medline)
    }
}

/// In-progress `<Author>` or `<AbstractText>` element
#[derive(Debug, Default)]
struct Pending {
    last_name: String,
    fore_name: String,
    initials: String,
    collective: String,
    label: Option<String>,
    text: String,
}

fn parse_articles(xml: &str) -> Result<Vec<Result<IntermediateRecord, FetchError>>, SourceError> {
    let mut reader = Reader::from_str(xml);
    // Whitespace around inline markup (<i>, <sub>) is significant in titles
    reader.config_mut().trim_text(false);

    let mut records = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut article: Option<ArticleFields> = None;
    let mut author = Pending::default();
    let mut section = Pending::default();
    let mut id_type: Option<String> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                let name = element_name(&e);
                match name.as_str() {
                    "PubmedArticle" => article = Some(ArticleFields::default()),
                    "Author" => author = Pending::default(),
                    "AbstractText" => {
                        section = Pending {
                            label: attribute(&e, "Label"),
                            ..Pending::default()
                        }
                    }
                    "ArticleId" => id_type = attribute(&e, "IdType"),
                    "ELocationID" => id_type = attribute(&e, "EIdType"),
                    _ => {}
                }
                path.push(name);
            }
            Event::Text(e) => {
                if let Some(fields) = article.as_mut() {
                    let text = e.unescape()?;
                    collect_text(fields, &mut author, &mut section, &path, id_type.as_deref(), &text);
                }
            }
            Event::End(_) => {
                let Some(name) = path.pop() else { continue };
                let Some(fields) = article.as_mut() else { continue };

                match name.as_str() {
                    "Author" if path.last().map(String::as_str) == Some("AuthorList") => {
                        if let Some(name) = author_name(&author) {
                            fields.authors.push(name);
                        }
                    }
                    "AbstractText" if within(&path, "Abstract") => {
                        let text = section.text.trim();
                        if !text.is_empty() {
                            let entry = match &section.label {
                                Some(label) if !label.is_empty() => format!("{}: {}", label, text),
                                _ => text.to_string(),
                            };
                            fields.abstract_sections.push(entry);
                        }
                    }
                    "ArticleId" | "ELocationID" => id_type = None,
                    "PubmedArticle" => {
                        if let Some(fields) = article.take() {
                            records.push(build_record(fields));
                        }
                    }
                    _ => {}
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(records)
}

fn collect_text(
    fields: &mut ArticleFields,
    author: &mut Pending,
    section: &mut Pending,
    path: &[String],
    id_type: Option<&str>,
    text: &str,
) {
    let current = path.last().map(String::as_str).unwrap_or_default();
    let parent = path.len().checked_sub(2).map(|i| path[i].as_str()).unwrap_or_default();

    if within(path, "ArticleTitle") && within(path, "Article") {
        append(&mut fields.title, text);
    } else if within(path, "AbstractText") && within(path, "Abstract") {
        append(&mut section.text, text);
    } else if within(path, "Author") && within(path, "AuthorList") {
        match current {
            "LastName" => append(&mut author.last_name, text),
            "ForeName" => append(&mut author.fore_name, text),
            "Initials" => append(&mut author.initials, text),
            "CollectiveName" => append(&mut author.collective, text),
            _ if within(path, "CollectiveName") => append(&mut author.collective, text),
            _ => {}
        }
    } else if current == "PMID" && parent == "MedlineCitation" {
        fields.pmid = text.trim().to_string();
    } else if current == "Title" && parent == "Journal" {
        append(&mut fields.journal, text);
    } else if parent == "PubDate" && within(path, "JournalIssue") {
        set_date_part(&mut fields.issue_date, current, text);
    } else if parent == "ArticleDate" {
        set_date_part(&mut fields.article_date, current, text);
    } else if current == "ArticleId" && parent == "ArticleIdList" && within(path, "PubmedData") {
        if id_type == Some("doi") && !path.iter().any(|p| p == "ReferenceList") {
            fields.doi = Some(text.trim().to_string());
        }
    } else if current == "ELocationID" && id_type == Some("doi") {
        fields.elocation_doi = Some(text.trim().to_string());
    }
}

fn set_date_part(parts: &mut DateParts, element: &str, text: &str) {
    match element {
        "Year" => parts.year = text.trim().to_string(),
        "Month" => parts.month = text.trim().to_string(),
        "Day" => parts.day = text.trim().to_string(),
        "MedlineDate" => parts.medline = text.trim().to_string(),
        _ => {}
    }
}

fn build_record(fields: ArticleFields) -> Result<IntermediateRecord, FetchError> {
    if fields.pmid.is_empty() {
        return Err(FetchError::malformed(SourceKind::PubMed, None, "missing PMID"));
    }

    let doi = fields.doi.or(fields.elocation_doi);
    let pub_date = fields
        .issue_date
        .to_pub_date()
        .or_else(|| fields.article_date.to_pub_date());

    let mut builder = RecordBuilder::new(SourceKind::PubMed, fields.pmid.as_str(), &fields.title)
        .authors(fields.authors)
        .journal(&fields.journal)
        .pub_date(pub_date)
        .abstract_text(fields.abstract_sections.join(" "));
    if let Some(doi) = &doi {
        builder = builder.doi(doi);
    }

    let url = match crate::utils::normalize_doi(doi.as_deref().unwrap_or_default()) {
        Some(doi) => doi_url(&doi),
        None => format!("https://pubmed.ncbi.nlm.nih.gov/{}/", fields.pmid),
    };

    builder
        .url(url)
        .build()
        .map_err(|reason| FetchError::malformed(SourceKind::PubMed, Some(fields.pmid), reason))
}

/// `LastName, ForeName`, falling back to initials or the collective name
fn author_name(author: &Pending) -> Option<String> {
    let last = author.last_name.trim();
    let first = if author.fore_name.trim().is_empty() {
        author.initials.trim()
    } else {
        author.fore_name.trim()
    };

    if !last.is_empty() {
        return Some(if first.is_empty() {
            last.to_string()
        } else {
            format!("{}, {}", last, first)
        });
    }

    let collective = author.collective.trim();
    (!collective.is_empty()).then(|| collective.to_string())
}

/// Month as a number, either numeric (`06`) or an English name (`Jun`, `June`)
fn parse_month(value: &str) -> Option<u32> {
    let value = value.trim();
    if let Ok(month) = value.parse::<u32>() {
        return (1..=12).contains(&month).then_some(month);
    }

    const MONTHS: [&str; 12] = [
        "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
    ];
    let prefix = value.get(..3)?.to_lowercase();
    MONTHS
        .iter()
        .position(|m| *m == prefix)
        .map(|i| i as u32 + 1)
}

/// Parse free-form `MedlineDate` values such as `2019 Nov-Dec` or `1998 Spring`
fn parse_medline_date(value: &str) -> Option<PubDate> {
    let mut tokens = value.split_whitespace();
    let year = tokens.next()?.get(..4)?.parse::<i32>().ok()?;
    let month = tokens
        .next()
        .and_then(|t| parse_month(t.split(['-', '/']).next().unwrap_or(t)));
    PubDate::from_parts(year, month, None)
}

fn element_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attribute(e: &BytesStart<'_>, name: &str) -> Option<String> {
    e.try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()))
}

fn within(path: &[String], name: &str) -> bool {
    path.iter().any(|p| p == name)
}

/// Append a text fragment as-is; surrounding whitespace comes from the document
fn append(target: &mut String, text: &str) {
    target.push_str(text);
}
