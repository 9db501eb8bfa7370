use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::domain::SeedId;

pub const SEED_METADATA_SUCCESS: &str = "Successfully got seed metadata";
pub const METADATA_SUCCESS: &str = "Successfully downloaded all metadata reports";
pub const NO_EMPTY_REPORTS: &str = "No empty reports";
pub const NO_LOGIN_COLUMNS: &str = "No login columns to redact";
pub const REDACTION_SUCCESS: &str = "Successfully redacted login columns";
pub const NO_SEED_REPORT: &str = "No seed report to redact";
pub const SEED_COMPLETE: &str = "Successfully downloaded all metadata and WARCs";

const SUCCESS_PREFIX: &str = "Successfully";
const ENTRY_SEPARATOR: &str = "; ";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    SeedMetadata,
    ReportDownload,
    ReportEmpty,
    Redaction,
    WarcDownload,
    WarcFixity,
    WarcUnzip,
}

impl Stage {
    pub const ALL: [Stage; 7] = [
        Stage::SeedMetadata,
        Stage::ReportDownload,
        Stage::ReportEmpty,
        Stage::Redaction,
        Stage::WarcDownload,
        Stage::WarcFixity,
        Stage::WarcUnzip,
    ];

    /// Progress log column holding this stage's entries.
    pub fn column(&self) -> &'static str {
        match self {
            Stage::SeedMetadata => "Seed_Metadata_Errors",
            Stage::ReportDownload => "Metadata_Report_Errors",
            Stage::ReportEmpty => "Metadata_Report_Empty",
            Stage::Redaction => "Seed_Report_Redaction",
            Stage::WarcDownload => "WARC_API_Errors",
            Stage::WarcFixity => "WARC_Fixity_Errors",
            Stage::WarcUnzip => "WARC_Unzip_Errors",
        }
    }

    /// Recovers the outcome of an entry read back from its rendered text.
    fn classify(&self, message: &str) -> Outcome {
        if message.starts_with(SUCCESS_PREFIX) {
            return Outcome::Success;
        }
        match self {
            Stage::ReportEmpty => Outcome::Notice,
            Stage::Redaction if message.starts_with("No ") => Outcome::Notice,
            _ => Outcome::Failure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
    Notice,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    pub stage: Stage,
    pub outcome: Outcome,
    pub message: String,
    pub at: Option<DateTime<Utc>>,
}

/// Rolled-up failure categories, in the order they are reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Metadata,
    WarcDownload,
    WarcFixity,
    WarcUnzip,
}

impl FailureCategory {
    pub fn label(&self) -> &'static str {
        match self {
            FailureCategory::Metadata => "Metadata error",
            FailureCategory::WarcDownload => "WARC download error",
            FailureCategory::WarcFixity => "WARC fixity error",
            FailureCategory::WarcUnzip => "WARC unzip error",
        }
    }

    fn from_label(label: &str) -> Option<Self> {
        [
            FailureCategory::Metadata,
            FailureCategory::WarcDownload,
            FailureCategory::WarcFixity,
            FailureCategory::WarcUnzip,
        ]
        .into_iter()
        .find(|category| category.label() == label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedState {
    Pending,
    MetadataDone,
    WarcsDone,
    Complete,
    Error(FailureCategory),
}

impl SeedState {
    /// Terminal states are skipped when a run resumes.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SeedState::Complete | SeedState::Error(_))
    }
}

/// Stages append [`LogEntry`] values here; the `; `-joined column text exists only
/// at the progress-log boundary ([`SeedRecord::render`] / [`SeedRecord::restore`]).
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub seed_id: SeedId,
    pub aip_id: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub related_collection: Option<String>,
    pub collection_ids: Vec<String>,
    pub job_ids: Vec<String>,
    pub size_gb: f64,
    pub warc_filenames: Vec<String>,
    log: Vec<LogEntry>,
    complete: Option<String>,
}

impl SeedRecord {
    pub fn new(seed_id: SeedId) -> Self {
        Self {
            seed_id,
            aip_id: None,
            title: None,
            department: None,
            related_collection: None,
            collection_ids: Vec::new(),
            job_ids: Vec::new(),
            size_gb: 0.0,
            warc_filenames: Vec::new(),
            log: Vec::new(),
            complete: None,
        }
    }

    pub fn warc_count(&self) -> usize {
        self.warc_filenames.len()
    }

    /// Seed folders are named by AIP id, falling back to the raw seed id.
    pub fn folder_name(&self) -> &str {
        self.aip_id.as_deref().unwrap_or(self.seed_id.as_str())
    }

    /// Collection whose collection-level reports describe this seed.
    pub fn primary_collection(&self) -> Option<&str> {
        self.collection_ids.first().map(String::as_str)
    }

    pub fn record(&mut self, stage: Stage, outcome: Outcome, message: impl Into<String>) {
        self.log.push(LogEntry {
            stage,
            outcome,
            message: message.into(),
            at: Some(Utc::now()),
        });
    }

    pub fn success(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Outcome::Success, message);
    }

    pub fn failure(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Outcome::Failure, message);
    }

    pub fn notice(&mut self, stage: Stage, message: impl Into<String>) {
        self.record(stage, Outcome::Notice, message);
    }

    pub fn entries(&self, stage: Stage) -> impl Iterator<Item = &LogEntry> {
        self.log.iter().filter(move |entry| entry.stage == stage)
    }

    pub fn log(&self) -> &[LogEntry] {
        &self.log
    }

    pub fn has_entries(&self, stage: Stage) -> bool {
        self.entries(stage).next().is_some()
    }

    pub fn has_failures(&self, stage: Stage) -> bool {
        self.entries(stage)
            .any(|entry| entry.outcome == Outcome::Failure)
    }

    fn count(&self, stage: Stage, outcome: Outcome) -> usize {
        self.entries(stage)
            .filter(|entry| entry.outcome == outcome)
            .count()
    }

    /// Column text for one stage.
    pub fn render(&self, stage: Stage) -> String {
        self.entries(stage)
            .map(|entry| entry.message.replace(['\r', '\n'], " "))
            .collect::<Vec<_>>()
            .join(ENTRY_SEPARATOR)
    }

    /// Rebuilds a stage's entries from its column text.
    pub fn restore(&mut self, stage: Stage, rendered: &str) {
        self.log.retain(|entry| entry.stage != stage);
        for message in rendered
            .split(ENTRY_SEPARATOR)
            .map(str::trim)
            .filter(|message| !message.is_empty())
        {
            self.log.push(LogEntry {
                stage,
                outcome: stage.classify(message),
                message: message.to_string(),
                at: None,
            });
        }
    }

    pub fn complete(&self) -> Option<&str> {
        self.complete.as_deref()
    }

    pub fn restore_complete(&mut self, value: &str) {
        let value = value.trim();
        self.complete = (!value.is_empty()).then(|| value.to_string());
    }

    /// Clears every processing log field so the seed is retried from scratch.
    /// Seed metadata entries belong to the inventory and survive.
    pub fn reset_log(&mut self) {
        self.log.retain(|entry| entry.stage == Stage::SeedMetadata);
        self.complete = None;
    }

    /// Whether any stage after inventory building has recorded something.
    pub fn has_processing_entries(&self) -> bool {
        self.complete.is_some()
            || self
                .log
                .iter()
                .any(|entry| entry.stage != Stage::SeedMetadata)
    }

    pub fn failure_categories(&self) -> Vec<FailureCategory> {
        let mut categories = Vec::new();
        let metadata_finalized = self.entries(Stage::ReportDownload).any(|entry| {
            entry.outcome == Outcome::Success || entry.outcome == Outcome::Failure
        });
        if !metadata_finalized
            || self.has_failures(Stage::ReportDownload)
            || self.has_failures(Stage::SeedMetadata)
            || self.has_failures(Stage::Redaction)
        {
            categories.push(FailureCategory::Metadata);
        }
        if self.has_failures(Stage::WarcDownload)
            || self.count(Stage::WarcDownload, Outcome::Success) < self.warc_count()
        {
            categories.push(FailureCategory::WarcDownload);
        }
        if self.has_failures(Stage::WarcFixity) {
            categories.push(FailureCategory::WarcFixity);
        }
        if self.has_failures(Stage::WarcUnzip) {
            categories.push(FailureCategory::WarcUnzip);
        }
        categories
    }

    /// Sets the terminal field from every stage's outcomes and returns it.
    pub fn roll_up(&mut self) -> &str {
        let categories = self.failure_categories();
        let verdict = if categories.is_empty() {
            SEED_COMPLETE.to_string()
        } else {
            categories
                .iter()
                .map(FailureCategory::label)
                .collect::<Vec<_>>()
                .join(ENTRY_SEPARATOR)
        };
        self.complete.insert(verdict).as_str()
    }

    pub fn state(&self) -> SeedState {
        if let Some(complete) = self.complete.as_deref() {
            if complete == SEED_COMPLETE {
                return SeedState::Complete;
            }
            let category = complete
                .split(ENTRY_SEPARATOR)
                .find_map(FailureCategory::from_label)
                .unwrap_or(FailureCategory::Metadata);
            return SeedState::Error(category);
        }
        if !self.has_entries(Stage::ReportDownload) {
            return SeedState::Pending;
        }
        if self.entries(Stage::WarcDownload).count() >= self.warc_count() {
            SeedState::WarcsDone
        } else {
            SeedState::MetadataDone
        }
    }

    pub fn is_done(&self) -> bool {
        self.state().is_terminal()
    }
}

/// Seeds in inventory order, indexed by seed id.
#[derive(Debug, Clone, Default)]
pub struct SeedTable {
    records: Vec<SeedRecord>,
    index: HashMap<SeedId, usize>,
}

impl SeedTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record, replacing any record with the same seed id in place.
    pub fn upsert(&mut self, record: SeedRecord) {
        match self.index.get(&record.seed_id) {
            Some(&position) => self.records[position] = record,
            None => {
                self.index.insert(record.seed_id.clone(), self.records.len());
                self.records.push(record);
            }
        }
    }

    pub fn get(&self, seed_id: &SeedId) -> Option<&SeedRecord> {
        self.index.get(seed_id).map(|&position| &self.records[position])
    }

    pub fn get_mut(&mut self, seed_id: &SeedId) -> Option<&mut SeedRecord> {
        match self.index.get(seed_id) {
            Some(&position) => self.records.get_mut(position),
            None => None,
        }
    }

    pub fn position(&self, seed_id: &SeedId) -> Option<usize> {
        self.index.get(seed_id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SeedRecord> {
        self.records.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut SeedRecord> {
        self.records.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn into_records(self) -> Vec<SeedRecord> {
        self.records
    }
}

impl FromIterator<SeedRecord> for SeedTable {
    fn from_iter<I: IntoIterator<Item = SeedRecord>>(iter: I) -> Self {
        let mut table = SeedTable::new();
        for record in iter {
            table.upsert(record);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn seed_with_warcs(count: usize) -> SeedRecord {
        let mut seed = SeedRecord::new("2027707".parse().unwrap());
        seed.warc_filenames = (0..count).map(|i| format!("w{i}.warc.gz")).collect();
        seed
    }

    #[test]
    fn clean_seed_rolls_up_to_success() {
        let mut seed = seed_with_warcs(1);
        seed.success(Stage::ReportDownload, METADATA_SUCCESS);
        seed.success(Stage::WarcDownload, "Successfully downloaded w0.warc.gz");
        seed.success(Stage::WarcFixity, "Successfully verified w0.warc.gz fixity on now");
        seed.success(Stage::WarcUnzip, "Successfully unzipped w0.warc.gz");

        assert_eq!(seed.state(), SeedState::WarcsDone);
        assert_eq!(seed.roll_up(), SEED_COMPLETE);
        assert_eq!(seed.state(), SeedState::Complete);
    }

    #[test]
    fn failures_are_listed_in_category_order() {
        let mut seed = seed_with_warcs(2);
        seed.failure(Stage::WarcUnzip, "Error unzipping w1.warc.gz: boom");
        seed.failure(Stage::ReportDownload, "x_coll.csv API Error 500");
        seed.success(Stage::WarcDownload, "Successfully downloaded w0.warc.gz");
        seed.success(Stage::WarcDownload, "Successfully downloaded w1.warc.gz");

        assert_eq!(seed.roll_up(), "Metadata error; WARC unzip error");
        assert_matches!(seed.state(), SeedState::Error(FailureCategory::Metadata));
        assert!(seed.is_done());
    }

    #[test]
    fn missing_download_counts_as_download_error() {
        let mut seed = seed_with_warcs(2);
        seed.success(Stage::ReportDownload, METADATA_SUCCESS);
        seed.success(Stage::WarcDownload, "Successfully downloaded w0.warc.gz");
        assert_eq!(
            seed.failure_categories(),
            vec![FailureCategory::WarcDownload]
        );
    }

    #[test]
    fn render_and_restore_keep_outcomes() {
        let mut seed = seed_with_warcs(0);
        seed.failure(Stage::ReportDownload, "a_coll.csv API Error 404");
        seed.failure(
            Stage::ReportDownload,
            "Crawl job 7 was not downloaded so can't get crawl definition id",
        );
        seed.notice(Stage::Redaction, NO_LOGIN_COLUMNS);
        let rendered = seed.render(Stage::ReportDownload);
        assert_eq!(
            rendered,
            "a_coll.csv API Error 404; Crawl job 7 was not downloaded so can't get crawl definition id"
        );

        let mut restored = seed_with_warcs(0);
        restored.restore(Stage::ReportDownload, &rendered);
        restored.restore(Stage::Redaction, &seed.render(Stage::Redaction));
        assert_eq!(restored.entries(Stage::ReportDownload).count(), 2);
        assert!(restored.has_failures(Stage::ReportDownload));
        assert!(!restored.has_failures(Stage::Redaction));
    }

    #[test]
    fn reset_clears_terminal_field() {
        let mut seed = seed_with_warcs(0);
        seed.success(Stage::ReportDownload, METADATA_SUCCESS);
        seed.roll_up();
        assert!(seed.is_done());
        seed.reset_log();
        assert_eq!(seed.state(), SeedState::Pending);
        assert!(seed.log().is_empty());
    }

    #[test]
    fn table_keeps_insertion_order() {
        let table: SeedTable = ["3", "1", "2"]
            .iter()
            .map(|id| SeedRecord::new(id.parse().unwrap()))
            .collect();
        let ids: Vec<_> = table.iter().map(|s| s.seed_id.to_string()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(table.position(&"1".parse().unwrap()), Some(1));
    }
}
