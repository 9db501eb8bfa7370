use std::fmt;
use std::path::Path;

use camino::Utf8Path;
use serde::Serialize;
use tracing::info;

use crate::archive_it::ArchiveItClient;
use crate::domain::{DateWindow, ReportKind, SeedId};
use crate::error::HarvestError;
use crate::fs_util;
use crate::inventory::aggregate_warcs;
use crate::naming::{NamingInput, NamingPolicy, assign_aip_ids};
use crate::seed::SeedTable;

pub const COMPLETENESS_REPORT_FILE: &str = "completeness_check.csv";

const COLUMNS: [&str; 15] = [
    "Seed_ID",
    "AIP_ID",
    "AIP_Folder_Made",
    "seed.csv",
    "seedscope.csv",
    "coll.csv",
    "collscope.csv",
    "crawljob.csv_Count",
    "crawldef.csv_Count",
    "WARCs_Expected",
    "WARCs_Downloaded",
    "WARC_Count_Correct",
    "All_Expected_File_Types",
    "Progress_Log_Status",
    "Complete",
];
const NOT_APPLICABLE: &str = "Not applicable";
const NOT_IN_LOG: &str = "Not in seeds log";
const NOT_FINISHED: &str = "Not finished";
const EXPECTED_EXTENSIONS: [&str; 3] = [".csv", ".warc", ".warc.gz"];

/// A seed the API says belongs in the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedSeed {
    pub seed_id: SeedId,
    pub aip_id: Option<String>,
    pub warc_count: usize,
}

impl ExpectedSeed {
    pub fn folder_name(&self) -> &str {
        self.aip_id.as_deref().unwrap_or(self.seed_id.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field<T> {
    Value(T),
    NotApplicable,
    Blank,
}

impl Field<bool> {
    fn render(&self) -> String {
        match self {
            Field::Value(true) => "True".to_string(),
            Field::Value(false) => "False".to_string(),
            Field::NotApplicable => NOT_APPLICABLE.to_string(),
            Field::Blank => String::new(),
        }
    }
}

impl Field<usize> {
    fn render(&self) -> String {
        match self {
            Field::Value(count) => count.to_string(),
            Field::NotApplicable => NOT_APPLICABLE.to_string(),
            Field::Blank => String::new(),
        }
    }
}

impl Field<String> {
    fn render(&self) -> String {
        match self {
            Field::Value(text) => text.clone(),
            Field::NotApplicable => NOT_APPLICABLE.to_string(),
            Field::Blank => String::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Verdict {
    Complete,
    Incomplete,
    NotExpected,
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Verdict::Complete => "Complete",
            Verdict::Incomplete => "Incomplete",
            Verdict::NotExpected => "Not expected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletenessRow {
    pub seed_id: Option<String>,
    pub aip_id: String,
    pub folder_made: Field<bool>,
    pub seed_report: Field<bool>,
    pub seed_scope: Field<bool>,
    pub collection: Field<bool>,
    pub collection_scope: Field<bool>,
    pub crawl_jobs: Field<usize>,
    pub crawl_definitions: Field<usize>,
    pub warcs_expected: Field<usize>,
    pub warcs_downloaded: Field<usize>,
    pub warc_count_correct: Field<bool>,
    pub expected_file_types: Field<bool>,
    pub progress_status: Field<String>,
    pub verdict: Verdict,
}

impl CompletenessRow {
    fn missing_folder(expected: &ExpectedSeed) -> Self {
        Self {
            seed_id: Some(expected.seed_id.to_string()),
            aip_id: expected.folder_name().to_string(),
            folder_made: Field::Value(false),
            seed_report: Field::NotApplicable,
            seed_scope: Field::NotApplicable,
            collection: Field::NotApplicable,
            collection_scope: Field::NotApplicable,
            crawl_jobs: Field::NotApplicable,
            crawl_definitions: Field::NotApplicable,
            warcs_expected: Field::NotApplicable,
            warcs_downloaded: Field::NotApplicable,
            warc_count_correct: Field::NotApplicable,
            expected_file_types: Field::NotApplicable,
            progress_status: Field::NotApplicable,
            verdict: Verdict::Incomplete,
        }
    }

    fn not_expected(folder: &str) -> Self {
        Self {
            seed_id: None,
            aip_id: folder.to_string(),
            folder_made: Field::Blank,
            seed_report: Field::Blank,
            seed_scope: Field::Blank,
            collection: Field::Blank,
            collection_scope: Field::Blank,
            crawl_jobs: Field::Blank,
            crawl_definitions: Field::Blank,
            warcs_expected: Field::Blank,
            warcs_downloaded: Field::Blank,
            warc_count_correct: Field::Blank,
            expected_file_types: Field::Blank,
            progress_status: Field::Blank,
            verdict: Verdict::NotExpected,
        }
    }

    fn cells(&self) -> Vec<String> {
        vec![
            self.seed_id.clone().unwrap_or_default(),
            self.aip_id.clone(),
            self.folder_made.render(),
            self.seed_report.render(),
            self.seed_scope.render(),
            self.collection.render(),
            self.collection_scope.render(),
            self.crawl_jobs.render(),
            self.crawl_definitions.render(),
            self.warcs_expected.render(),
            self.warcs_downloaded.render(),
            self.warc_count_correct.render(),
            self.expected_file_types.render(),
            self.progress_status.render(),
            self.verdict.to_string(),
        ]
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompletenessSummary {
    pub expected: usize,
    pub complete: usize,
    pub incomplete: usize,
    pub not_expected: usize,
}

impl CompletenessSummary {
    pub fn from_rows(rows: &[CompletenessRow]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            match row.verdict {
                Verdict::Complete => summary.complete += 1,
                Verdict::Incomplete => summary.incomplete += 1,
                Verdict::NotExpected => summary.not_expected += 1,
            }
        }
        summary.expected = summary.complete + summary.incomplete;
        summary
    }
}

/// Rebuilds the expected seeds for `window`. Seed metadata is looked up once per
/// seed to drop seeds that belong to no configured department. Any failure aborts.
pub fn expected_inventory<C: ArchiveItClient + ?Sized>(
    client: &C,
    window: &DateWindow,
    naming: &dyn NamingPolicy,
) -> Result<Vec<ExpectedSeed>, HarvestError> {
    let records = client.list_warcs(window)?;
    let table = aggregate_warcs(&records, window)?;

    let mut affiliated = Vec::new();
    for seed in table.iter() {
        let metadata = client.seed_metadata(&seed.seed_id)?;
        if !naming.is_affiliated(metadata.department.as_deref()) {
            continue;
        }
        affiliated.push((seed.seed_id.clone(), seed.warc_count(), metadata));
    }

    let inputs: Vec<NamingInput<'_>> = affiliated
        .iter()
        .map(|(seed_id, _, metadata)| NamingInput {
            seed_id,
            department: metadata.department.as_deref(),
            related_collection: metadata.related_collection.as_deref(),
        })
        .collect();
    let aip_ids = assign_aip_ids(naming, window, &inputs);

    Ok(affiliated
        .iter()
        .zip(aip_ids)
        .map(|((seed_id, warc_count, _), aip_id)| ExpectedSeed {
            seed_id: seed_id.clone(),
            aip_id,
            warc_count: *warc_count,
        })
        .collect())
}

/// Checks one expected seed's folder. A missing folder is reported, not raised.
pub fn check_seed(
    expected: &ExpectedSeed,
    output_dir: &Path,
    progress: &SeedTable,
) -> Result<CompletenessRow, HarvestError> {
    let folder = output_dir.join(expected.folder_name());
    if !folder.is_dir() {
        return Ok(CompletenessRow::missing_folder(expected));
    }

    let names: Vec<String> = fs_util::list_files(&folder)?
        .iter()
        .map(|path| fs_util::file_name(path))
        .collect();
    let count = |suffix: &str| names.iter().filter(|name| name.ends_with(suffix)).count();
    let has = |suffix: &str| count(suffix) > 0;

    let warcs_downloaded = names
        .iter()
        .filter(|name| name.ends_with(".warc") || name.ends_with(".warc.gz"))
        .count();
    let expected_types = names.iter().all(|name| {
        EXPECTED_EXTENSIONS
            .iter()
            .any(|extension| name.ends_with(extension))
    });

    let seed_report = has(ReportKind::SEED_SUFFIX);
    let collection = has(ReportKind::COLLECTION_SUFFIX);
    let crawl_jobs = count(ReportKind::CRAWL_JOB_SUFFIX);
    let crawl_definitions = count(ReportKind::CRAWL_DEFINITION_SUFFIX);
    let count_correct = warcs_downloaded == expected.warc_count;

    let complete = seed_report
        && collection
        && crawl_jobs > 0
        && crawl_definitions > 0
        && count_correct
        && expected_types;

    let progress_status = match progress.get(&expected.seed_id) {
        Some(seed) => seed.complete().unwrap_or(NOT_FINISHED).to_string(),
        None => NOT_IN_LOG.to_string(),
    };

    Ok(CompletenessRow {
        seed_id: Some(expected.seed_id.to_string()),
        aip_id: expected.folder_name().to_string(),
        folder_made: Field::Value(true),
        seed_report: Field::Value(seed_report),
        seed_scope: Field::Value(has(ReportKind::SEED_SCOPE_SUFFIX)),
        collection: Field::Value(collection),
        collection_scope: Field::Value(has(ReportKind::COLLECTION_SCOPE_SUFFIX)),
        crawl_jobs: Field::Value(crawl_jobs),
        crawl_definitions: Field::Value(crawl_definitions),
        warcs_expected: Field::Value(expected.warc_count),
        warcs_downloaded: Field::Value(warcs_downloaded),
        warc_count_correct: Field::Value(count_correct),
        expected_file_types: Field::Value(expected_types),
        progress_status: Field::Value(progress_status),
        verdict: if complete {
            Verdict::Complete
        } else {
            Verdict::Incomplete
        },
    })
}

/// Folders in `output_dir` that belong to no expected seed. A folder matches when
/// its name is an expected folder name, optionally followed by `_` and a suffix.
pub fn unexpected_folders(
    output_dir: &Path,
    expected: &[ExpectedSeed],
    ignored: &[String],
) -> Result<Vec<CompletenessRow>, HarvestError> {
    let mut rows = Vec::new();
    for folder in fs_util::list_dirs(output_dir)? {
        let name = fs_util::file_name(&folder);
        if ignored.iter().any(|ignored| ignored == &name) {
            continue;
        }
        let known = expected.iter().any(|seed| {
            let prefix = seed.folder_name();
            name == prefix
                || name
                    .strip_prefix(prefix)
                    .is_some_and(|rest| rest.starts_with('_'))
        });
        if !known {
            rows.push(CompletenessRow::not_expected(&name));
        }
    }
    Ok(rows)
}

/// Builds every report row: one per expected seed, then one per unexpected folder.
/// Expectations always come from the API; the progress log is only quoted.
/// Nothing is returned when the expected inventory cannot be rebuilt.
pub fn reconcile<C: ArchiveItClient + ?Sized>(
    client: &C,
    window: &DateWindow,
    naming: &dyn NamingPolicy,
    seed_table: &SeedTable,
    output_dir: &Utf8Path,
    ignored: &[String],
) -> Result<Vec<CompletenessRow>, HarvestError> {
    let expected = expected_inventory(client, window, naming)?;
    info!(expected = expected.len(), "rebuilt expected inventory");

    let mut rows = expected
        .iter()
        .map(|seed| check_seed(seed, output_dir.as_std_path(), seed_table))
        .collect::<Result<Vec<_>, _>>()?;
    rows.extend(unexpected_folders(
        output_dir.as_std_path(),
        &expected,
        ignored,
    )?);
    Ok(rows)
}

pub fn render_report(rows: &[CompletenessRow]) -> Result<Vec<u8>, HarvestError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(COLUMNS)?;
    for row in rows {
        writer.write_record(row.cells())?;
    }
    writer
        .into_inner()
        .map_err(|err| HarvestError::Csv(err.to_string()))
}

pub fn write_report(rows: &[CompletenessRow], path: &Utf8Path) -> Result<(), HarvestError> {
    let bytes = render_report(rows)?;
    fs_util::write_bytes_atomic(path, &bytes)
}
