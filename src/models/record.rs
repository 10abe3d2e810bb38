//! Publication records as produced by source adapters and by the merger.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

/// The bibliographic provider a record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    PubMed,
    CrossRef,
    OpenAlex,
}

impl SourceKind {
    /// Every supported provider, in declaration order
    pub const ALL: [SourceKind; 3] = [SourceKind::PubMed, SourceKind::CrossRef, SourceKind::OpenAlex];

    /// Returns the display name of the source
    pub fn name(&self) -> &'static str {
        match self {
            SourceKind::PubMed => "PubMed",
            SourceKind::CrossRef => "Crossref",
            SourceKind::OpenAlex => "OpenAlex",
        }
    }

    /// Returns the source identifier used on the command line and in output files
    pub fn id(&self) -> &'static str {
        match self {
            SourceKind::PubMed => "pubmed",
            SourceKind::CrossRef => "crossref",
            SourceKind::OpenAlex => "openalex",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pubmed" => Ok(SourceKind::PubMed),
            "crossref" => Ok(SourceKind::CrossRef),
            "openalex" => Ok(SourceKind::OpenAlex),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// How much of a publication date the provider actually reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    Year,
    Month,
    Day,
}

impl DatePrecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatePrecision::Year => "year",
            DatePrecision::Month => "month",
            DatePrecision::Day => "day",
        }
    }
}

impl FromStr for DatePrecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "year" => Ok(DatePrecision::Year),
            "month" => Ok(DatePrecision::Month),
            "day" => Ok(DatePrecision::Day),
            other => Err(format!("unknown date precision '{}'", other)),
        }
    }
}

/// A possibly partial publication date.
///
/// Missing components are filled with the first month/day, so a year-only
/// date of 2021 is stored as 2021-01-01 with [`DatePrecision::Year`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PubDate {
    pub date: NaiveDate,
    pub precision: DatePrecision,
}

impl PubDate {
    /// Build from whatever components the provider gave.
    ///
    /// An out-of-range month or day lowers the precision instead of failing.
    pub fn from_parts(year: i32, month: Option<u32>, day: Option<u32>) -> Option<Self> {
        if !(1..=9999).contains(&year) {
            return None;
        }
        if let Some(m) = month {
            if let Some(d) = day {
                if let Some(date) = NaiveDate::from_ymd_opt(year, m, d) {
                    return Some(Self {
                        date,
                        precision: DatePrecision::Day,
                    });
                }
            }
            if let Some(date) = NaiveDate::from_ymd_opt(year, m, 1) {
                return Some(Self {
                    date,
                    precision: DatePrecision::Month,
                });
            }
        }
        NaiveDate::from_ymd_opt(year, 1, 1).map(|date| Self {
            date,
            precision: DatePrecision::Year,
        })
    }

    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`
    pub fn parse_iso(value: &str) -> Option<Self> {
        let mut parts = value.trim().splitn(3, '-');
        let year = parts.next()?.parse::<i32>().ok()?;
        let month = match parts.next() {
            Some(m) => Some(m.parse::<u32>().ok()?),
            None => None,
        };
        let day = match parts.next() {
            Some(d) => Some(d.get(..2).unwrap_or(d).parse::<u32>().ok()?),
            None => None,
        };
        Self::from_parts(year, month, day)
    }

    pub fn year(&self) -> i32 {
        self.date.year()
    }
}

impl fmt::Display for PubDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.date.format("%Y-%m-%d"))
    }
}

/// One publication as reported by one provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntermediateRecord {
    pub source: SourceKind,

    /// Provider-native identifier (PMID, DOI, OpenAlex work ID)
    pub source_id: String,

    /// Normalized DOI, see [`crate::utils::normalize_doi`]
    pub doi: Option<String>,

    pub title: String,

    /// Author names in the order the provider listed them
    pub authors: Vec<String>,

    pub journal: Option<String>,

    pub pub_date: Option<PubDate>,

    pub r#abstract: Option<String>,

    pub url: Option<String>,
}

/// Builder for [`IntermediateRecord`].
///
/// Normalizes on the way in: whitespace is collapsed, empty strings become
/// absent and DOIs that do not look like DOIs are dropped.
#[derive(Debug, Clone)]
pub struct RecordBuilder {
    record: IntermediateRecord,
}

impl RecordBuilder {
    pub fn new(source: SourceKind, source_id: impl Into<String>, title: impl AsRef<str>) -> Self {
        Self {
            record: IntermediateRecord {
                source,
                source_id: source_id.into().trim().to_string(),
                doi: None,
                title: crate::utils::normalize_whitespace(title.as_ref()),
                authors: Vec::new(),
                journal: None,
                pub_date: None,
                r#abstract: None,
                url: None,
            },
        }
    }

    pub fn doi(mut self, doi: impl AsRef<str>) -> Self {
        self.record.doi = crate::utils::normalize_doi(doi.as_ref());
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.record.authors = authors
            .into_iter()
            .map(|a| crate::utils::normalize_whitespace(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();
        self
    }

    pub fn journal(mut self, journal: impl AsRef<str>) -> Self {
        self.record.journal = non_empty(journal.as_ref());
        self
    }

    pub fn pub_date(mut self, date: Option<PubDate>) -> Self {
        self.record.pub_date = date;
        self
    }

    pub fn abstract_text(mut self, text: impl AsRef<str>) -> Self {
        self.record.r#abstract = non_empty(text.as_ref());
        self
    }

    pub fn url(mut self, url: impl AsRef<str>) -> Self {
        self.record.url = non_empty(url.as_ref());
        self
    }

    /// Build the record, rejecting ones that break the record invariants
    pub fn build(self) -> Result<IntermediateRecord, String> {
        if self.record.source_id.is_empty() {
            return Err("missing source identifier".to_string());
        }
        if self.record.title.is_empty() {
            return Err("missing title".to_string());
        }
        Ok(self.record)
    }
}

fn non_empty(value: &str) -> Option<String> {
    let value = crate::utils::normalize_whitespace(value);
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// One distinct publication after cross-source merging
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    /// Provider whose record ranks highest in the merge priority
    pub source: SourceKind,
    pub source_id: String,
    pub doi: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub journal: Option<String>,
    pub pub_date: Option<PubDate>,
    pub r#abstract: Option<String>,
    pub url: Option<String>,

    /// Every provider that returned this publication
    pub matched_sources: BTreeSet<SourceKind>,

    /// Provenance: provider-native identifier per contributing provider
    pub source_ids: BTreeMap<SourceKind, String>,
}

/// The ordered output of one run
pub type ResultSet = Vec<CanonicalRecord>;
