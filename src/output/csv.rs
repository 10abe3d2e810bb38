//! CSV encoding of the result set.

use serde::{Deserialize, Serialize};
use std::io::Read;

use crate::models::CanonicalRecord;

/// Separator for multi-valued fields (authors, matched sources)
pub const MULTI_VALUE_SEPARATOR: &str = "; ";

/// One CSV line; field order is the column order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRow {
    pub source: String,
    pub source_id: String,
    pub doi: String,
    pub title: String,
    pub authors: String,
    pub journal: String,
    pub pub_date: String,
    pub pub_date_precision: String,
    pub r#abstract: String,
    pub url: String,
    pub matched_sources: String,
}

impl From<&CanonicalRecord> for CsvRow {
    fn from(record: &CanonicalRecord) -> Self {
        Self {
            source: record.source.to_string(),
            source_id: record.source_id.clone(),
            doi: record.doi.clone().unwrap_or_default(),
            title: record.title.clone(),
            authors: record.authors.join(MULTI_VALUE_SEPARATOR),
            journal: record.journal.clone().unwrap_or_default(),
            pub_date: record.pub_date.map(|d| d.to_string()).unwrap_or_default(),
            pub_date_precision: record
                .pub_date
                .map(|d| d.precision.as_str().to_string())
                .unwrap_or_default(),
            r#abstract: record.r#abstract.clone().unwrap_or_default(),
            url: record.url.clone().unwrap_or_default(),
            matched_sources: record
                .matched_sources
                .iter()
                .map(|s| s.id())
                .collect::<Vec<_>>()
                .join(MULTI_VALUE_SEPARATOR),
        }
    }
}

impl CsvRow {
    pub fn author_list(&self) -> Vec<&str> {
        split_multi(&self.authors)
    }

    pub fn matched_source_list(&self) -> Vec<&str> {
        split_multi(&self.matched_sources)
    }
}

fn split_multi(value: &str) -> Vec<&str> {
    value
        .split(MULTI_VALUE_SEPARATOR)
        .filter(|v| !v.is_empty())
        .collect()
}

/// Encode records as CSV, header included
pub fn encode<'a>(records: impl IntoIterator<Item = &'a CanonicalRecord>) -> Result<Vec<u8>, csv::Error> {
    let mut wtr = csv::WriterBuilder::new().has_headers(true).from_writer(Vec::new());

    let mut empty = true;
    for record in records {
        wtr.serialize(CsvRow::from(record))?;
        empty = false;
    }
    if empty {
        // serialize() writes the header lazily; an empty run still gets one
        wtr.write_record(COLUMNS)?;
    }

    wtr.into_inner().map_err(|e| csv::Error::from(e.into_error()))
}

/// Column names in output order
pub const COLUMNS: [&str; 11] = [
    "source",
    "source_id",
    "doi",
    "title",
    "authors",
    "journal",
    "pub_date",
    "pub_date_precision",
    "abstract",
    "url",
    "matched_sources",
];

/// Decode rows written by [`encode`]
pub fn read_rows(reader: impl Read) -> Result<Vec<CsvRow>, csv::Error> {
    csv::Reader::from_reader(reader).deserialize().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PubDate, SourceKind};
    use std::collections::{BTreeMap, BTreeSet};

    fn canonical() -> CanonicalRecord {
        CanonicalRecord {
            source: SourceKind::CrossRef,
            source_id: "10.1/x".to_string(),
            doi: Some("10.1/x".to_string()),
            title: "Aortic stenosis, \"quoted\"\nand multiline".to_string(),
            authors: vec!["Doe, Jane".to_string(), "Roe, Richard".to_string()],
            journal: None,
            pub_date: PubDate::from_parts(2021, Some(7), None),
            r#abstract: None,
            url: Some("https://doi.org/10.1/x".to_string()),
            matched_sources: BTreeSet::from([SourceKind::PubMed, SourceKind::CrossRef]),
            source_ids: BTreeMap::new(),
        }
    }

    #[test]
    fn test_header_order() {
        let bytes = encode(&[canonical()]).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert_eq!(text.lines().next().unwrap(), COLUMNS.join(","));
    }

    #[test]
    fn test_empty_result_set_has_header() {
        let bytes = encode(&Vec::<CanonicalRecord>::new()).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap().trim_end(), COLUMNS.join(","));
        assert!(read_rows(&b"source,source_id\n"[..]).unwrap().is_empty());
    }

    #[test]
    fn test_row_values() {
        let row = CsvRow::from(&canonical());
        assert_eq!(row.source, "crossref");
        assert_eq!(row.authors, "Doe, Jane; Roe, Richard");
        assert_eq!(row.pub_date, "2021-07-01");
        assert_eq!(row.pub_date_precision, "month");
        assert_eq!(row.journal, "");
        assert_eq!(row.matched_sources, "pubmed; crossref");
        assert_eq!(row.matched_source_list(), vec!["pubmed", "crossref"]);
    }

    #[test]
    fn test_quoting_survives_round_trip() {
        let record = canonical();
        let bytes = encode(&[record.clone()]).unwrap();
        let rows = read_rows(bytes.as_slice()).unwrap();

        assert_eq!(rows, vec![CsvRow::from(&record)]);
        assert_eq!(rows[0].author_list(), vec!["Doe, Jane", "Roe, Richard"]);
    }
}
