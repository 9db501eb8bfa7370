use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum HarvestError {
    #[error("invalid date {0}: expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("invalid date window: start {start} must be before end {end}")]
    InvalidWindow { start: String, end: String },

    #[error("invalid seed id: {0}")]
    InvalidSeedId(String),

    #[error("no seed id in WARC filename: {0}")]
    #[diagnostic(help("WARC filenames are expected to contain -SEED<digits>-"))]
    SeedIdNotFound(String),

    #[error("invalid store-time {value} for {filename}")]
    InvalidTimestamp { filename: String, value: String },

    #[error("missing config file warc-harvest.json in current directory")]
    MissingConfig,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing Archive-It credentials")]
    #[diagnostic(help("set username/password in the config or ARCHIVE_IT_USERNAME/ARCHIVE_IT_PASSWORD"))]
    MissingCredentials,

    #[error("Archive-It request failed: {0}")]
    ApiHttp(String),

    #[error("Archive-It returned status {status}: {message}")]
    ApiStatus { status: u16, message: String },

    #[error("unexpected Archive-It response: {0}")]
    ApiPayload(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("csv error: {0}")]
    Csv(String),

    #[error("could not run {tool}: {message}")]
    ToolLaunch { tool: String, message: String },
}

impl From<csv::Error> for HarvestError {
    fn from(err: csv::Error) -> Self {
        HarvestError::Csv(err.to_string())
    }
}
