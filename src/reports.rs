use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::archive_it::ArchiveItClient;
use crate::domain::{ReportFilter, ReportKind, ReportType};
use crate::error::HarvestError;
use crate::seed::{
    METADATA_SUCCESS, NO_EMPTY_REPORTS, NO_LOGIN_COLUMNS, NO_SEED_REPORT, REDACTION_SUCCESS,
    SeedRecord, Stage,
};

const LOGIN_COLUMNS: [&str; 2] = ["login_password", "login_username"];
const REDACTED: &str = "REDACTED";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Written(PathBuf),
    /// Destination already existed, so no request was made.
    Skipped(PathBuf),
    Empty,
    Failed,
}

pub struct ReportFetcher<'a, C: ArchiveItClient + ?Sized> {
    client: &'a C,
}

impl<'a, C: ArchiveItClient + ?Sized> ReportFetcher<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self { client }
    }

    /// Fetches one report into `folder/destination_name`. Never fails: errors and
    /// empty bodies are recorded on `seed`.
    pub fn fetch(
        &self,
        seed: &mut SeedRecord,
        folder: &Path,
        report_type: ReportType,
        filter: ReportFilter,
        value: &str,
        destination_name: &str,
    ) -> FetchOutcome {
        let destination = folder.join(destination_name);
        if destination.exists() {
            debug!(report = destination_name, "report already present");
            return FetchOutcome::Skipped(destination);
        }

        let response = match self.client.report(report_type, filter, value) {
            Ok(response) => response,
            Err(err) => {
                warn!(report = destination_name, error = %err, "report request failed");
                seed.failure(
                    Stage::ReportDownload,
                    format!("{destination_name} API Error no response"),
                );
                return FetchOutcome::Failed;
            }
        };

        if !response.is_success() {
            warn!(report = destination_name, status = response.status, "report API error");
            seed.failure(
                Stage::ReportDownload,
                format!("{destination_name} API Error {}", response.status),
            );
            return FetchOutcome::Failed;
        }

        if response.body.is_empty() {
            seed.notice(Stage::ReportEmpty, destination_name);
            return FetchOutcome::Empty;
        }

        match fs::write(&destination, &response.body) {
            Ok(()) => FetchOutcome::Written(destination),
            Err(err) => {
                seed.failure(
                    Stage::ReportDownload,
                    format!("{destination_name} could not be saved: {err}"),
                );
                FetchOutcome::Failed
            }
        }
    }

    pub fn fetch_kind(
        &self,
        seed: &mut SeedRecord,
        folder: &Path,
        kind: &ReportKind,
        value: &str,
    ) -> FetchOutcome {
        let prefix = seed.folder_name().to_string();
        self.fetch(
            seed,
            folder,
            kind.report_type(),
            kind.filter(),
            value,
            &kind.file_name(&prefix),
        )
    }
}

pub struct MetadataAggregator<'a, C: ArchiveItClient + ?Sized> {
    fetcher: ReportFetcher<'a, C>,
}

impl<'a, C: ArchiveItClient + ?Sized> MetadataAggregator<'a, C> {
    pub fn new(client: &'a C) -> Self {
        Self {
            fetcher: ReportFetcher::new(client),
        }
    }

    /// Downloads every metadata report for `seed` into `folder` and records the
    /// outcome of each on the seed.
    pub fn download_metadata(&self, seed: &mut SeedRecord, folder: &Path) {
        let seed_id = seed.seed_id.to_string();
        self.fetcher
            .fetch_kind(seed, folder, &ReportKind::Seed, &seed_id);
        self.fetcher
            .fetch_kind(seed, folder, &ReportKind::SeedScope, &seed_id);

        match seed.primary_collection().map(str::to_string) {
            Some(collection) => {
                self.fetcher
                    .fetch_kind(seed, folder, &ReportKind::CollectionScope, &collection);
                self.fetcher
                    .fetch_kind(seed, folder, &ReportKind::Collection, &collection);
            }
            None => seed.failure(
                Stage::ReportDownload,
                "No collection id so can't get collection reports",
            ),
        }

        self.download_crawl_reports(seed, folder);
        redact_seed_report(seed, folder);
        finalize_metadata_log(seed);
    }

    fn download_crawl_reports(&self, seed: &mut SeedRecord, folder: &Path) {
        let mut definitions: HashSet<String> = HashSet::new();
        for job_id in seed.job_ids.clone() {
            let job = ReportKind::CrawlJob(job_id.clone());
            self.fetcher.fetch_kind(seed, folder, &job, &job_id);

            let job_report = folder.join(job.file_name(seed.folder_name()));
            if !job_report.exists() {
                seed.failure(
                    Stage::ReportDownload,
                    format!("Crawl job {job_id} was not downloaded so can't get crawl definition id"),
                );
                continue;
            }

            let definition_id = match read_crawl_definition(&job_report) {
                Ok(Some(definition_id)) => definition_id,
                Ok(None) => {
                    seed.failure(
                        Stage::ReportDownload,
                        format!("Crawl job {job_id} report has no crawl definition id"),
                    );
                    continue;
                }
                Err(err) => {
                    seed.failure(
                        Stage::ReportDownload,
                        format!("Crawl job {job_id} report could not be read: {err}"),
                    );
                    continue;
                }
            };

            // Jobs of one seed usually share a definition; fetch each only once.
            if !definitions.insert(definition_id.clone()) {
                continue;
            }
            let definition = ReportKind::CrawlDefinition(definition_id.clone());
            self.fetcher
                .fetch_kind(seed, folder, &definition, &definition_id);
        }
    }
}

/// Reads the `crawl_definition` value of the first data row of a crawl-job report.
pub fn read_crawl_definition(path: &Path) -> Result<Option<String>, HarvestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)?;
    let headers = reader.headers()?.clone();
    let Some(position) = headers
        .iter()
        .position(|header| header.trim() == "crawl_definition")
    else {
        return Ok(None);
    };
    for row in reader.records() {
        let row = row?;
        if let Some(value) = row.get(position).map(str::trim).filter(|v| !v.is_empty()) {
            return Ok(Some(value.to_string()));
        }
    }
    Ok(None)
}

/// Replaces login credential cells with `REDACTED`. Returns `None` when the report
/// has no login columns. Column order and all other cells are preserved.
pub fn redact_login_columns(content: &[u8]) -> Result<Option<Vec<u8>>, HarvestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(content);
    // Reports are not guaranteed to be UTF-8, so cells are handled as raw bytes.
    let headers = reader.byte_headers()?.clone();
    let targets: Vec<usize> = headers
        .iter()
        .enumerate()
        .filter(|(_, header)| {
            LOGIN_COLUMNS
                .iter()
                .any(|column| header.trim_ascii() == column.as_bytes())
        })
        .map(|(position, _)| position)
        .collect();
    if targets.is_empty() {
        return Ok(None);
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_byte_record(&headers)?;
    for row in reader.byte_records() {
        let row = row?;
        let redacted: Vec<&[u8]> = row
            .iter()
            .enumerate()
            .map(|(position, cell)| {
                if targets.contains(&position) {
                    REDACTED.as_bytes()
                } else {
                    cell
                }
            })
            .collect();
        writer.write_record(&redacted)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|err| HarvestError::Csv(err.to_string()))?;
    Ok(Some(bytes))
}

pub fn redact_seed_report(seed: &mut SeedRecord, folder: &Path) {
    let name = ReportKind::Seed.file_name(seed.folder_name());
    let path = folder.join(&name);
    if !path.exists() {
        seed.notice(Stage::Redaction, NO_SEED_REPORT);
        return;
    }

    let result = fs::read(&path)
        .map_err(|err| HarvestError::Filesystem(err.to_string()))
        .and_then(|content| redact_login_columns(&content));
    match result {
        Ok(Some(redacted)) => match fs::write(&path, redacted) {
            Ok(()) => seed.success(Stage::Redaction, REDACTION_SUCCESS),
            Err(err) => seed.failure(Stage::Redaction, format!("Error redacting {name}: {err}")),
        },
        Ok(None) => seed.notice(Stage::Redaction, NO_LOGIN_COLUMNS),
        Err(err) => seed.failure(Stage::Redaction, format!("Error redacting {name}: {err}")),
    }
}

/// Fills the report error and empty-report fields with their sentinels when nothing
/// was recorded. Safe to call more than once.
pub fn finalize_metadata_log(seed: &mut SeedRecord) {
    if !seed.has_entries(Stage::ReportDownload) {
        seed.success(Stage::ReportDownload, METADATA_SUCCESS);
    }
    if !seed.has_entries(Stage::ReportEmpty) {
        seed.notice(Stage::ReportEmpty, NO_EMPTY_REPORTS);
    }
}
