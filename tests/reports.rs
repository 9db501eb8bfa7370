mod common;

use std::fs;

use assert_matches::assert_matches;

use common::{MockArchiveIt, ok};
use warc_harvest::archive_it::ApiResponse;
use warc_harvest::domain::{ReportFilter, ReportKind, ReportType};
use warc_harvest::reports::{FetchOutcome, MetadataAggregator, ReportFetcher};
use warc_harvest::seed::{
    METADATA_SUCCESS, NO_EMPTY_REPORTS, REDACTION_SUCCESS, SeedRecord, Stage,
};

fn seed(id: &str, jobs: &[&str]) -> SeedRecord {
    let mut seed = SeedRecord::new(id.parse().unwrap());
    seed.aip_id = Some("harg-0123-web-202103-0001".to_string());
    seed.collection_ids = vec!["12263".to_string()];
    seed.job_ids = jobs.iter().map(|job| job.to_string()).collect();
    seed
}

#[test]
fn existing_report_is_not_fetched_again() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_seed_reports("42", &[]);
    let fetcher = ReportFetcher::new(&client);
    let mut record = seed("42", &[]);

    let first = fetcher.fetch_kind(&mut record, temp.path(), &ReportKind::Collection, "12263");
    let path = temp.path().join("harg-0123-web-202103-0001_coll.csv");
    assert_eq!(first, FetchOutcome::Written(path.clone()));
    fs::write(&path, "locally edited").unwrap();

    let second = fetcher.fetch_kind(&mut record, temp.path(), &ReportKind::Collection, "12263");
    assert_eq!(second, FetchOutcome::Skipped(path.clone()));
    assert_eq!(client.calls_mentioning("report collection").len(), 1);
    assert_eq!(fs::read_to_string(&path).unwrap(), "locally edited");
}

#[test]
fn non_200_is_recorded_not_raised() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_report(
        ReportType::Collection,
        ReportFilter::Id,
        "12263",
        ApiResponse {
            status: 500,
            body: b"oops".to_vec(),
        },
    );
    let mut record = seed("42", &[]);
    let outcome = ReportFetcher::new(&client).fetch(
        &mut record,
        temp.path(),
        ReportType::Collection,
        ReportFilter::Id,
        "12263",
        "x_coll.csv",
    );
    assert_matches!(outcome, FetchOutcome::Failed);
    assert_eq!(record.render(Stage::ReportDownload), "x_coll.csv API Error 500");
    assert!(!temp.path().join("x_coll.csv").exists());
}

#[test]
fn shared_crawl_definition_is_downloaded_once() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_seed_reports("42", &["7001", "7002"]);
    let mut record = seed("42", &["7001", "7002"]);

    MetadataAggregator::new(&client).download_metadata(&mut record, temp.path());

    let names: Vec<String> = fs::read_dir(temp.path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    let jobs = names.iter().filter(|n| n.ends_with("_crawljob.csv")).count();
    let definitions = names.iter().filter(|n| n.ends_with("_crawldef.csv")).count();
    assert_eq!(jobs, 2);
    assert_eq!(definitions, 1);
    assert_eq!(client.calls_mentioning("report crawl_definition").len(), 1);
    assert_eq!(record.render(Stage::ReportDownload), METADATA_SUCCESS);
    assert_eq!(record.render(Stage::ReportEmpty), NO_EMPTY_REPORTS);
}

#[test]
fn empty_collection_scope_is_not_an_error() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default()
        .with_seed_reports("42", &["7001"])
        .with_report(ReportType::ScopeRule, ReportFilter::Collection, "12263", ok(""));
    let mut record = seed("42", &["7001"]);

    MetadataAggregator::new(&client).download_metadata(&mut record, temp.path());

    assert!(
        !temp
            .path()
            .join("harg-0123-web-202103-0001_collscope.csv")
            .exists()
    );
    assert_eq!(
        record.render(Stage::ReportEmpty),
        "harg-0123-web-202103-0001_collscope.csv"
    );
    assert_eq!(record.render(Stage::ReportDownload), METADATA_SUCCESS);
    assert!(record.failure_categories().is_empty());
}

#[test]
fn failed_crawl_job_blocks_its_definition() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_seed_reports("42", &[]);
    let mut record = seed("42", &["9999"]);

    MetadataAggregator::new(&client).download_metadata(&mut record, temp.path());

    let errors = record.render(Stage::ReportDownload);
    assert!(errors.contains("_9999_crawljob.csv API Error 404"));
    assert!(errors.contains("Crawl job 9999 was not downloaded so can't get crawl definition id"));
    assert_eq!(client.calls_mentioning("report crawl_definition").len(), 0);
}

#[test]
fn seed_report_logins_are_redacted_in_place() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_seed_reports("42", &[]);
    let mut record = seed("42", &[]);

    MetadataAggregator::new(&client).download_metadata(&mut record, temp.path());

    let report =
        fs::read_to_string(temp.path().join("harg-0123-web-202103-0001_seed.csv")).unwrap();
    assert_eq!(
        report,
        "id,url,login_username,login_password\n42,https://example.org,REDACTED,REDACTED\n"
    );
    assert_eq!(record.render(Stage::Redaction), REDACTION_SUCCESS);
}

#[test]
fn seed_without_collection_logs_metadata_error() {
    let temp = tempfile::tempdir().unwrap();
    let client = MockArchiveIt::default().with_seed_reports("42", &[]);
    let mut record = seed("42", &[]);
    record.collection_ids.clear();

    MetadataAggregator::new(&client).download_metadata(&mut record, temp.path());

    assert_eq!(
        record.render(Stage::ReportDownload),
        "No collection id so can't get collection reports"
    );
    assert_eq!(client.calls_mentioning("report collection").len(), 0);
}
