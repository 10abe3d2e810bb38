//! Run query and per-adapter fetch request models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::SourceKind;
use crate::error::HarvestError;

/// How keywords are combined into a provider query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordJoin {
    /// A publication matching any keyword is collected
    #[default]
    Or,
    /// A publication must match every keyword
    And,
}

impl KeywordJoin {
    pub fn operator(&self) -> &'static str {
        match self {
            KeywordJoin::Or => " OR ",
            KeywordJoin::And => " AND ",
        }
    }
}

/// Keywords and sources for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    keywords: BTreeSet<String>,
    sources: BTreeSet<SourceKind>,
}

impl Query {
    /// Create a query from already split keywords and sources.
    ///
    /// Keywords are trimmed and lower-cased; an empty source set selects every provider.
    pub fn new<I, S>(keywords: I, sources: impl IntoIterator<Item = SourceKind>) -> Result<Self, HarvestError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords: BTreeSet<String> = keywords
            .into_iter()
            .map(|k| crate::utils::normalize_whitespace(k.as_ref()).to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        if keywords.is_empty() {
            return Err(HarvestError::InvalidQuery("no keywords provided".to_string()));
        }

        let mut sources: BTreeSet<SourceKind> = sources.into_iter().collect();
        if sources.is_empty() {
            sources.extend(SourceKind::ALL);
        }

        Ok(Self { keywords, sources })
    }

    /// Parse the comma-separated command line form.
    ///
    /// Unknown source names are skipped with a warning. A non-empty source
    /// list that names no known provider is rejected.
    pub fn parse(keywords: &str, sources: Option<&str>) -> Result<Self, HarvestError> {
        let names = split_list(sources.unwrap_or_default());
        let mut kinds = Vec::new();
        for name in &names {
            match name.parse::<SourceKind>() {
                Ok(kind) => kinds.push(kind),
                Err(e) => tracing::warn!("Skipping source: {}", e),
            }
        }

        if !names.is_empty() && kinds.is_empty() {
            return Err(HarvestError::InvalidQuery(format!(
                "none of the requested sources are supported: {}",
                names.join(", ")
            )));
        }

        Self::new(split_list(keywords), kinds)
    }

    pub fn keywords(&self) -> &BTreeSet<String> {
        &self.keywords
    }

    pub fn sources(&self) -> &BTreeSet<SourceKind> {
        &self.sources
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// What a single adapter is asked to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub keywords: Vec<String>,
    pub join: KeywordJoin,

    /// Records requested per page
    pub page_size: usize,

    /// Upper bound on pages requested by one fetch call
    pub max_pages: usize,
}

impl FetchRequest {
    pub fn new(query: &Query) -> Self {
        Self {
            keywords: query.keywords().iter().cloned().collect(),
            join: KeywordJoin::Or,
            page_size: 20,
            max_pages: 5,
        }
    }

    pub fn join(mut self, join: KeywordJoin) -> Self {
        self.join = join;
        self
    }

    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    /// Boolean search expression understood by PubMed and OpenAlex.
    ///
    /// Multi-word keywords are quoted so they match as phrases.
    pub fn boolean_expression(&self) -> String {
        self.keywords
            .iter()
            .map(|k| quote_phrase(k))
            .collect::<Vec<_>>()
            .join(self.join.operator())
    }
}

fn quote_phrase(keyword: &str) -> String {
    let keyword = keyword.replace('"', "");
    if keyword.contains(char::is_whitespace) {
        format!("\"{}\"", keyword)
    } else {
        keyword
    }
}
