use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveDateTime};
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::HarvestError;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SeedId(String);

impl SeedId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeedId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeedId {
    type Err = HarvestError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim();
        if normalized.is_empty() || !normalized.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(HarvestError::InvalidSeedId(value.to_string()));
        }
        Ok(Self(normalized.to_string()))
    }
}

fn seed_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"-SEED(\d+)-").expect("valid seed regex"))
}

/// Pulls the seed id out of a WARC filename such as
/// `ARCHIVEIT-12263-CRAWL_SELECTED_SEEDS-JOB1360199-SEED2027707-20210203-...warc.gz`.
pub fn extract_seed_id(filename: &str) -> Result<SeedId, HarvestError> {
    seed_pattern()
        .captures(filename)
        .and_then(|caps| caps.get(1))
        .map(|m| SeedId(m.as_str().to_string()))
        .ok_or_else(|| HarvestError::SeedIdNotFound(filename.to_string()))
}

/// Store-times from the binary-file API are ISO 8601, usually with a `Z` suffix.
pub fn parse_store_time(filename: &str, value: &str) -> Result<NaiveDate, HarvestError> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.date_naive());
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, format) {
            return Ok(parsed.date());
        }
    }
    Err(HarvestError::InvalidTimestamp {
        filename: filename.to_string(),
        value: value.to_string(),
    })
}

pub fn parse_date(value: &str) -> Result<NaiveDate, HarvestError> {
    let trimmed = value.trim();
    if trimmed.len() != 10 {
        return Err(HarvestError::InvalidDate(value.to_string()));
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map_err(|_| HarvestError::InvalidDate(value.to_string()))
}

/// How the end of a download window is interpreted. Applied identically by the
/// inventory builder and the completeness reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryPolicy {
    #[default]
    StartInclusiveEndExclusive,
    BothInclusive,
}

impl fmt::Display for BoundaryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BoundaryPolicy::StartInclusiveEndExclusive => write!(f, "start-inclusive-end-exclusive"),
            BoundaryPolicy::BothInclusive => write!(f, "both-inclusive"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    start: NaiveDate,
    end: NaiveDate,
    policy: BoundaryPolicy,
}

impl DateWindow {
    pub fn new(
        start: NaiveDate,
        end: NaiveDate,
        policy: BoundaryPolicy,
    ) -> Result<Self, HarvestError> {
        if start >= end {
            return Err(HarvestError::InvalidWindow {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end, policy })
    }

    pub fn parse(start: &str, end: &str, policy: BoundaryPolicy) -> Result<Self, HarvestError> {
        Self::new(parse_date(start)?, parse_date(end)?, policy)
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn policy(&self) -> BoundaryPolicy {
        self.policy
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        match self.policy {
            BoundaryPolicy::StartInclusiveEndExclusive => date >= self.start && date < self.end,
            BoundaryPolicy::BothInclusive => date >= self.start && date <= self.end,
        }
    }

    /// Values for `store-time-after` and `store-time-before`.
    pub fn query_bounds(&self) -> (String, String) {
        let before = match self.policy {
            BoundaryPolicy::StartInclusiveEndExclusive => self.end,
            BoundaryPolicy::BothInclusive => self
                .end
                .checked_add_days(Days::new(1))
                .unwrap_or(self.end),
        };
        (
            self.start.format("%Y-%m-%d").to_string(),
            before.format("%Y-%m-%d").to_string(),
        )
    }

    pub fn year_month(&self) -> (i32, u32) {
        (self.end.year(), self.end.month())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportType {
    Seed,
    ScopeRule,
    Collection,
    CrawlJob,
    CrawlDefinition,
}

impl ReportType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportType::Seed => "seed",
            ReportType::ScopeRule => "scope_rule",
            ReportType::Collection => "collection",
            ReportType::CrawlJob => "crawl_job",
            ReportType::CrawlDefinition => "crawl_definition",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFilter {
    Id,
    Seed,
    Collection,
}

impl ReportFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFilter::Id => "id",
            ReportFilter::Seed => "seed",
            ReportFilter::Collection => "collection",
        }
    }
}

/// One metadata report as stored in a seed folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportKind {
    Seed,
    SeedScope,
    CollectionScope,
    Collection,
    CrawlJob(String),
    CrawlDefinition(String),
}

impl ReportKind {
    pub const SEED_SUFFIX: &'static str = "_seed.csv";
    pub const SEED_SCOPE_SUFFIX: &'static str = "_seedscope.csv";
    pub const COLLECTION_SCOPE_SUFFIX: &'static str = "_collscope.csv";
    pub const COLLECTION_SUFFIX: &'static str = "_coll.csv";
    pub const CRAWL_JOB_SUFFIX: &'static str = "_crawljob.csv";
    pub const CRAWL_DEFINITION_SUFFIX: &'static str = "_crawldef.csv";

    pub fn report_type(&self) -> ReportType {
        match self {
            ReportKind::Seed => ReportType::Seed,
            ReportKind::SeedScope | ReportKind::CollectionScope => ReportType::ScopeRule,
            ReportKind::Collection => ReportType::Collection,
            ReportKind::CrawlJob(_) => ReportType::CrawlJob,
            ReportKind::CrawlDefinition(_) => ReportType::CrawlDefinition,
        }
    }

    pub fn filter(&self) -> ReportFilter {
        match self {
            ReportKind::SeedScope => ReportFilter::Seed,
            ReportKind::CollectionScope => ReportFilter::Collection,
            _ => ReportFilter::Id,
        }
    }

    pub fn file_name(&self, prefix: &str) -> String {
        match self {
            ReportKind::Seed => format!("{prefix}{}", Self::SEED_SUFFIX),
            ReportKind::SeedScope => format!("{prefix}{}", Self::SEED_SCOPE_SUFFIX),
            ReportKind::CollectionScope => format!("{prefix}{}", Self::COLLECTION_SCOPE_SUFFIX),
            ReportKind::Collection => format!("{prefix}{}", Self::COLLECTION_SUFFIX),
            ReportKind::CrawlJob(job) => format!("{prefix}_{job}{}", Self::CRAWL_JOB_SUFFIX),
            ReportKind::CrawlDefinition(def) => {
                format!("{prefix}_{def}{}", Self::CRAWL_DEFINITION_SUFFIX)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn extracts_seed_id_from_filename() {
        let name = "ARCHIVEIT-12263-CRAWL_SELECTED_SEEDS-JOB1360199-SEED2027707-20210203183001063-00000-h3.warc.gz";
        assert_eq!(extract_seed_id(name).unwrap().as_str(), "2027707");
    }

    #[test]
    fn filename_without_seed_is_rejected() {
        let err = extract_seed_id("ARCHIVEIT-12263-TEST-JOB1-20210203.warc.gz").unwrap_err();
        assert_matches!(err, HarvestError::SeedIdNotFound(_));
    }

    #[test]
    fn parse_seed_id_rejects_non_digits() {
        assert_matches!("12a".parse::<SeedId>(), Err(HarvestError::InvalidSeedId(_)));
        assert_eq!(" 42 ".parse::<SeedId>().unwrap().as_str(), "42");
    }

    #[test]
    fn store_time_formats() {
        let expected = NaiveDate::from_ymd_opt(2021, 2, 3).unwrap();
        assert_eq!(parse_store_time("a", "2021-02-03T18:30:01Z").unwrap(), expected);
        assert_eq!(parse_store_time("a", "2021-02-03T18:30:01.123Z").unwrap(), expected);
        assert_matches!(
            parse_store_time("a", "03/02/2021"),
            Err(HarvestError::InvalidTimestamp { .. })
        );
    }

    #[test]
    fn date_arguments_are_strict() {
        assert!(parse_date("2021-02-03").is_ok());
        assert_matches!(parse_date("2021-2-3"), Err(HarvestError::InvalidDate(_)));
        assert_matches!(parse_date("2021-13-01"), Err(HarvestError::InvalidDate(_)));
    }

    #[test]
    fn window_must_be_ordered() {
        let err = DateWindow::parse("2021-03-01", "2021-02-01", BoundaryPolicy::default())
            .unwrap_err();
        assert_matches!(err, HarvestError::InvalidWindow { .. });
        assert!(
            DateWindow::parse("2021-03-01", "2021-03-01", BoundaryPolicy::default()).is_err()
        );
    }

    #[test]
    fn end_boundary_follows_policy() {
        let end = NaiveDate::from_ymd_opt(2021, 3, 1).unwrap();
        let exclusive =
            DateWindow::parse("2021-02-01", "2021-03-01", BoundaryPolicy::StartInclusiveEndExclusive)
                .unwrap();
        let inclusive =
            DateWindow::parse("2021-02-01", "2021-03-01", BoundaryPolicy::BothInclusive).unwrap();

        assert!(exclusive.contains(exclusive.start()));
        assert!(!exclusive.contains(end));
        assert!(inclusive.contains(end));

        assert_eq!(
            exclusive.query_bounds(),
            ("2021-02-01".to_string(), "2021-03-01".to_string())
        );
        assert_eq!(
            inclusive.query_bounds(),
            ("2021-02-01".to_string(), "2021-03-02".to_string())
        );
    }

    #[test]
    fn report_file_names() {
        assert_eq!(ReportKind::Seed.file_name("harg-0001"), "harg-0001_seed.csv");
        assert_eq!(
            ReportKind::CrawlJob("77".to_string()).file_name("harg-0001"),
            "harg-0001_77_crawljob.csv"
        );
        assert_eq!(ReportKind::CollectionScope.filter(), ReportFilter::Collection);
        assert_eq!(ReportKind::SeedScope.report_type(), ReportType::ScopeRule);
    }
}
