//! Integration tests for Literature Collector
//!
//! These tests run whole collection runs, from adapters through the merge to
//! the files on disk.

use chrono::{TimeZone, Utc};
use literature_collector::error::HarvestError;
use literature_collector::models::{Query, SourceKind};
use literature_collector::output::{read_rows, ResultWriter, SNAPSHOT_FILE};
use literature_collector::pipeline::{Harvester, RunSettings, SourceStatus};
use literature_collector::sources::mock::make_dated_record;
use literature_collector::sources::{
    AdapterRegistry, CrossRefAdapter, MockAdapter, OpenAlexAdapter, PubMedAdapter,
};
use literature_collector::utils::{HttpSettings, ProviderClient, RateGate, RecordMerger, RetryConfig};
use std::fs;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

fn harvester(registry: AdapterRegistry) -> Harvester {
    Harvester::new(
        registry,
        RecordMerger::default(),
        RunSettings {
            deadline: Duration::from_secs(10),
            ..RunSettings::default()
        },
    )
}

fn mock_registry(adapters: Vec<MockAdapter>) -> AdapterRegistry {
    let mut registry = AdapterRegistry::empty();
    for adapter in adapters {
        registry.register(Arc::new(adapter));
    }
    registry
}

/// Client with fast retries for talking to a local mock server
fn fast_client(kind: SourceKind, max_retries: u32) -> ProviderClient {
    let retry = RetryConfig {
        max_retries,
        initial_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        backoff_multiplier: 2.0,
        jitter: 0.0,
    };
    let gate = Arc::new(RateGate::new(kind, Duration::from_millis(1)));
    ProviderClient::new(kind, &HttpSettings::default(), gate, retry).unwrap()
}

#[tokio::test]
async fn test_same_doi_from_two_sources_is_one_row() {
    let registry = mock_registry(vec![
        MockAdapter::new(SourceKind::PubMed).page(vec![Ok(make_dated_record(
            SourceKind::PubMed,
            "38000001",
            "Aortic Stenosis Review",
            Some("10.1/x"),
            Some("2023-05-01"),
        ))]),
        MockAdapter::new(SourceKind::CrossRef).page(vec![Ok(make_dated_record(
            SourceKind::CrossRef,
            "10.1/X",
            "Aortic Stenosis: A Review",
            Some("10.1/X"),
            Some("2023-05"),
        ))]),
    ]);
    let query = Query::parse("aortic stenosis", Some("pubmed,crossref")).unwrap();

    let output = harvester(registry).run(&query).await.unwrap();
    assert_eq!(output.results.len(), 1);

    let dir = tempdir().unwrap();
    let files = ResultWriter::new(dir.path()).write(&output.results, Utc::now()).unwrap();
    let rows = read_rows(fs::read(&files.csv_path).unwrap().as_slice()).unwrap();

    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].source, "crossref");
    assert_eq!(rows[0].title, "Aortic Stenosis: A Review");
    assert_eq!(rows[0].doi, "10.1/x");
    assert_eq!(rows[0].matched_source_list(), vec!["pubmed", "crossref"]);
}

#[tokio::test]
async fn test_exhausted_provider_does_not_block_the_run() {
    let mut server = mockito::Server::new_async().await;
    let esearch = server
        .mock("GET", "/esearch.fcgi")
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let records = (1..=5)
        .map(|i| {
            Ok(make_dated_record(
                SourceKind::CrossRef,
                &format!("10.1/{}", i),
                &format!("Mitral study {}", i),
                Some(&format!("10.1/{}", i)),
                Some("2024-01-01"),
            ))
        })
        .collect();

    let mut registry = mock_registry(vec![MockAdapter::new(SourceKind::CrossRef).page(records)]);
    registry.register(Arc::new(
        PubMedAdapter::new(fast_client(SourceKind::PubMed, 1), None, None).with_base_url(server.url()),
    ));
    let query = Query::parse("mitral regurgitation", Some("pubmed,crossref")).unwrap();

    let output = harvester(registry).run(&query).await.unwrap();
    esearch.assert_async().await;

    let pubmed = &output.report.sources[0];
    assert_eq!(pubmed.source, SourceKind::PubMed);
    assert!(matches!(pubmed.status, SourceStatus::Failed { .. }));

    let dir = tempdir().unwrap();
    let files = ResultWriter::new(dir.path()).write(&output.results, Utc::now()).unwrap();
    let rows = read_rows(fs::read(&files.csv_path).unwrap().as_slice()).unwrap();
    assert_eq!(rows.len(), 5);
    assert!(rows.iter().all(|r| r.source == "crossref"));
}

#[tokio::test]
async fn test_total_failure_preserves_previous_snapshot() {
    let dir = tempdir().unwrap();
    let writer = ResultWriter::new(dir.path());
    let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    writer
        .write(
            &RecordMerger::default().merge(vec![make_dated_record(
                SourceKind::OpenAlex,
                "W1",
                "Earlier run",
                None,
                None,
            )]),
            earlier,
        )
        .unwrap();
    let snapshot = fs::read(dir.path().join(SNAPSHOT_FILE)).unwrap();

    let registry = mock_registry(vec![
        MockAdapter::new(SourceKind::PubMed).fail_at_page(0, "HTTP 500"),
        MockAdapter::new(SourceKind::CrossRef).fail_at_page(0, "connection refused"),
        MockAdapter::new(SourceKind::OpenAlex).fail_at_page(0, "HTTP 429"),
    ]);
    let query = Query::parse("valvular heart disease", None).unwrap();

    let err = harvester(registry).run(&query).await.unwrap_err();
    assert_eq!(err.exit_code(), 1);
    match &err {
        HarvestError::TotalFailure { failures } => {
            let sources: Vec<_> = failures.iter().map(|f| f.source).collect();
            assert_eq!(sources, vec![SourceKind::PubMed, SourceKind::CrossRef, SourceKind::OpenAlex]);
        }
        other => panic!("Expected TotalFailure, got {}", other),
    }

    // Nothing was written: the earlier files are all that exist
    assert_eq!(fs::read(dir.path().join(SNAPSHOT_FILE)).unwrap(), snapshot);
    assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 3);
}

#[tokio::test]
async fn test_deadline_keeps_completed_sources() {
    let registry = mock_registry(vec![
        MockAdapter::new(SourceKind::CrossRef).page(vec![Ok(make_dated_record(
            SourceKind::CrossRef,
            "10.1/fast",
            "Fast provider",
            Some("10.1/fast"),
            None,
        ))]),
        MockAdapter::new(SourceKind::OpenAlex)
            .page(vec![Ok(make_dated_record(SourceKind::OpenAlex, "W2", "Slow provider", None, None))])
            .delay(Duration::from_secs(60)),
    ]);
    let harvester = Harvester::new(
        registry,
        RecordMerger::default(),
        RunSettings {
            deadline: Duration::from_millis(300),
            ..RunSettings::default()
        },
    );
    let query = Query::parse("tavr", Some("crossref,openalex")).unwrap();

    let output = harvester.run(&query).await.unwrap();

    assert_eq!(output.results.len(), 1);
    assert_eq!(output.results[0].title, "Fast provider");
    assert_eq!(output.report.sources[1].status, SourceStatus::TimedOut);
    assert_eq!(output.report.failures()[0].reason, "timed out");
}

#[tokio::test]
async fn test_end_to_end_with_http_providers() {
    let mut server = mockito::Server::new_async().await;
    let crossref = server
        .mock("GET", "/crossref/works")
        .match_query(mockito::Matcher::UrlEncoded("query".into(), "tavr".into()))
        .with_body(
            serde_json::json!({
                "message": {
                    "items": [{
                        "DOI": "10.1016/J.JACC.2024.01.001",
                        "title": ["Transcatheter <i>aortic</i> valve replacement outcomes"],
                        "author": [{"given": "Jane", "family": "Doe"}],
                        "container-title": ["JACC"],
                        "published-online": {"date-parts": [[2024, 2]]}
                    }],
                    "next-cursor": "ignored"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;
    let openalex_first = server
        .mock("GET", "/openalex/works")
        .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "*".into()))
        .with_body(
            serde_json::json!({
                "meta": {"next_cursor": "page2"},
                "results": [
                    {
                        "id": "https://openalex.org/W100",
                        "doi": "https://doi.org/10.1016/j.jacc.2024.01.001",
                        "title": "Transcatheter aortic valve replacement outcomes",
                        "publication_date": "2024-02-15",
                        "authorships": [{"author": {"display_name": "Jane Doe"}}],
                        "abstract_inverted_index": {"TAVR": [0], "works.": [1]}
                    },
                    {
                        "id": "https://openalex.org/W200",
                        "title": "Deep learning echocardiography",
                        "publication_year": 2023
                    },
                    {"id": "https://openalex.org/W300", "title": null}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let openalex_last = server
        .mock("GET", "/openalex/works")
        .match_query(mockito::Matcher::UrlEncoded("cursor".into(), "page2".into()))
        .with_body(serde_json::json!({"meta": {"next_cursor": null}, "results": []}).to_string())
        .create_async()
        .await;

    let mut registry = AdapterRegistry::empty();
    registry.register(Arc::new(
        CrossRefAdapter::new(fast_client(SourceKind::CrossRef, 0), Some("lab@example.org".into()))
            .with_base_url(format!("{}/crossref", server.url())),
    ));
    registry.register(Arc::new(
        OpenAlexAdapter::new(fast_client(SourceKind::OpenAlex, 0), None, None)
            .with_base_url(format!("{}/openalex", server.url())),
    ));
    let query = Query::parse("TAVR", Some("crossref,openalex,scopus")).unwrap();

    let output = harvester(registry).run(&query).await.unwrap();
    crossref.assert_async().await;
    openalex_first.assert_async().await;
    openalex_last.assert_async().await;

    assert_eq!(output.report.completed(), 2);
    let openalex = &output.report.sources[1];
    assert_eq!(openalex.status, SourceStatus::Completed { records: 2 });
    assert_eq!(openalex.malformed, 1);

    let dir = tempdir().unwrap();
    let run_at = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let files = ResultWriter::new(dir.path().join("data")).write(&output.results, run_at).unwrap();
    let rows = read_rows(fs::read(&files.timestamped_csv_path).unwrap().as_slice()).unwrap();

    assert_eq!(rows.len(), 2);
    // Newest first
    let merged = &rows[0];
    assert_eq!(merged.source, "crossref");
    assert_eq!(merged.doi, "10.1016/j.jacc.2024.01.001");
    assert_eq!(merged.title, "Transcatheter aortic valve replacement outcomes");
    assert_eq!(merged.journal, "JACC");
    assert_eq!(merged.pub_date, "2024-02-01");
    assert_eq!(merged.r#abstract, "TAVR works.");
    assert_eq!(merged.matched_source_list(), vec!["crossref", "openalex"]);

    assert_eq!(rows[1].source, "openalex");
    assert_eq!(rows[1].source_id, "W200");
    assert_eq!(rows[1].pub_date_precision, "year");

    let summary = fs::read_to_string(&files.summary_md_path).unwrap();
    assert!(summary.starts_with("# Literature Summary (2024-06-01 12:00:00 UTC)"));
    assert!(summary.contains("[10.1016/j.jacc.2024.01.001](https://doi.org/10.1016/j.jacc.2024.01.001)"));
}
