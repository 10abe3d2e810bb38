//! Cross-source deduplication and merging of records.
//!
//! Two records describe the same publication when their normalized DOIs are
//! equal, or, when at least one of them has no DOI, when their title keys
//! are equal and their publication years agree (if both are known). Records
//! with two different DOIs are never merged, and a record without a DOI only
//! joins a group whose every member it matches.

use futures_util::StreamExt;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::normalize::title_key;
use crate::error::FetchError;
use crate::models::{CanonicalRecord, IntermediateRecord, ResultSet, SourceKind};
use crate::sources::RecordStream;

/// Merges intermediate records from every provider into the result set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMerger {
    priority: Vec<SourceKind>,
}

impl Default for RecordMerger {
    /// Crossref > PubMed > OpenAlex
    fn default() -> Self {
        Self::new(vec![SourceKind::CrossRef, SourceKind::PubMed, SourceKind::OpenAlex])
    }
}

impl RecordMerger {
    /// Create a merger with a field-conflict priority, highest first.
    ///
    /// Providers missing from `priority` rank after the listed ones, in enum order.
    pub fn new(priority: Vec<SourceKind>) -> Self {
        let mut ordered: Vec<SourceKind> = Vec::with_capacity(SourceKind::ALL.len());
        for kind in priority.into_iter().chain(SourceKind::ALL) {
            if !ordered.contains(&kind) {
                ordered.push(kind);
            }
        }
        Self { priority: ordered }
    }

    pub fn priority(&self) -> &[SourceKind] {
        &self.priority
    }

    fn rank(&self, kind: SourceKind) -> usize {
        self.priority
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(self.priority.len())
    }

    /// Drain every stream and merge what they produced.
    ///
    /// Malformed records are skipped. A stream that ends with
    /// `SourceUnavailable` contributes nothing.
    pub async fn merge_streams(&self, streams: Vec<RecordStream<'_>>) -> ResultSet {
        let mut records = Vec::new();

        for mut stream in streams {
            let mut collected = Vec::new();
            let mut failed = false;

            while let Some(item) = stream.next().await {
                match item {
                    Ok(record) => collected.push(record),
                    Err(e @ FetchError::MalformedRecord { .. }) => tracing::warn!("Skipping {}", e),
                    Err(e) => {
                        tracing::warn!("Discarding stream: {}", e);
                        failed = true;
                        break;
                    }
                }
            }

            if !failed {
                records.extend(collected);
            }
        }

        self.merge(records)
    }

    /// Deduplicate, merge and order a batch of records.
    ///
    /// The result does not depend on the order of `records`.
    pub fn merge(&self, records: impl IntoIterator<Item = IntermediateRecord>) -> ResultSet {
        let groups = self.group(records);
        let input_count: usize = groups.iter().map(Vec::len).sum();

        let mut result: ResultSet = groups.into_iter().map(|g| self.combine(g)).collect();
        result.sort_by(result_order);

        tracing::debug!(
            "Merged {} records into {} publications",
            input_count,
            result.len()
        );
        result
    }

    /// Partition records into publications without combining their fields.
    ///
    /// Records sharing a normalized DOI form one group. A record without a DOI
    /// joins the first group whose every member has its title key and, where
    /// both are known, its publication year; otherwise it starts a new group.
    pub fn group(&self, records: impl IntoIterator<Item = IntermediateRecord>) -> Vec<Vec<IntermediateRecord>> {
        let mut records: Vec<IntermediateRecord> = records.into_iter().collect();
        records.sort_by(|a, b| {
            (a.source, &a.source_id, &a.title, &a.doi).cmp(&(b.source, &b.source_id, &b.title, &b.doi))
        });

        let mut groups: Vec<Vec<IntermediateRecord>> = Vec::new();
        let mut by_doi: HashMap<String, usize> = HashMap::new();
        let mut by_title: HashMap<String, Vec<usize>> = HashMap::new();

        let (with_doi, without_doi): (Vec<_>, Vec<_>) =
            records.into_iter().partition(|r| r.doi.is_some());

        for record in with_doi {
            let doi = record.doi.clone().unwrap_or_default();
            let index = *by_doi.entry(doi).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            index_title(&mut by_title, &record, index);
            groups[index].push(record);
        }

        for record in without_doi {
            let key = title_key(&record.title);
            let year = record.pub_date.map(|d| d.year());

            // Every member must agree, so an undated record cannot bridge two years
            let found = by_title.get(&key).and_then(|candidates| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| groups[i].iter().all(|m| same_title_year(&key, year, m)))
            });

            let index = match found {
                Some(index) if !key.is_empty() => index,
                _ => {
                    groups.push(Vec::new());
                    groups.len() - 1
                }
            };
            index_title(&mut by_title, &record, index);
            groups[index].push(record);
        }

        groups
    }

    /// Field-by-field merge; the highest-priority provider with a value wins
    fn combine(&self, mut members: Vec<IntermediateRecord>) -> CanonicalRecord {
        members.sort_by(|a, b| (self.rank(a.source), &a.source_id).cmp(&(self.rank(b.source), &b.source_id)));
        let primary = &members[0];

        let mut source_ids = BTreeMap::new();
        for member in &members {
            source_ids
                .entry(member.source)
                .or_insert_with(|| member.source_id.clone());
        }

        CanonicalRecord {
            source: primary.source,
            source_id: primary.source_id.clone(),
            doi: first(&members, |m| m.doi.clone()),
            title: primary.title.clone(),
            authors: members
                .iter()
                .find(|m| !m.authors.is_empty())
                .map(|m| m.authors.clone())
                .unwrap_or_default(),
            journal: first(&members, |m| m.journal.clone()),
            pub_date: first(&members, |m| m.pub_date),
            r#abstract: first(&members, |m| m.r#abstract.clone()),
            url: first(&members, |m| m.url.clone()),
            matched_sources: members.iter().map(|m| m.source).collect::<BTreeSet<_>>(),
            source_ids,
        }
    }
}

fn first<T>(members: &[IntermediateRecord], field: impl Fn(&IntermediateRecord) -> Option<T>) -> Option<T> {
    members.iter().find_map(field)
}

fn index_title(by_title: &mut HashMap<String, Vec<usize>>, record: &IntermediateRecord, group: usize) {
    let key = title_key(&record.title);
    if key.is_empty() {
        return;
    }
    let entry = by_title.entry(key).or_default();
    if !entry.contains(&group) {
        entry.push(group);
    }
}

fn same_title_year(key: &str, year: Option<i32>, other: &IntermediateRecord) -> bool {
    if key.is_empty() || title_key(&other.title) != key {
        return false;
    }
    match (year, other.pub_date.map(|d| d.year())) {
        (Some(a), Some(b)) => a == b,
        _ => true,
    }
}

/// Result set ordering: newest first, undated last, then title, then primary source and id
pub fn result_order(a: &CanonicalRecord, b: &CanonicalRecord) -> Ordering {
    let by_date = match (a.pub_date, b.pub_date) {
        (Some(x), Some(y)) => y.date.cmp(&x.date),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };

    by_date
        .then_with(|| a.title.cmp(&b.title))
        .then_with(|| a.source.cmp(&b.source))
        .then_with(|| a.source_id.cmp(&b.source_id))
        .then_with(|| a.doi.cmp(&b.doi))
}
