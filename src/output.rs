use std::io::{self, Write};

use serde::Serialize;

use crate::completeness::CompletenessSummary;
use crate::pipeline::{ProgressEvent, ProgressSink, RunSummary};

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

/// Operator-facing progress on stdout. Diagnostics go through `tracing` instead.
pub struct ConsoleOutput;

impl ConsoleOutput {
    pub fn print_run(summary: &RunSummary) {
        println!(
            "Processed {} of {} seeds ({} complete, {} with errors, {} already done)",
            summary.processed, summary.seeds, summary.complete, summary.errored, summary.skipped
        );
    }

    pub fn print_completeness(summary: &CompletenessSummary) {
        println!(
            "Completeness check: {} of {} expected seeds complete, {} incomplete, {} unexpected folders",
            summary.complete, summary.expected, summary.incomplete, summary.not_expected
        );
    }
}

impl ProgressSink for ConsoleOutput {
    fn event(&self, event: ProgressEvent) {
        println!("{}", event.message);
    }
}

pub struct JsonOutput;

#[derive(Debug, Serialize)]
pub struct JsonReport<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<&'a RunSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completeness: Option<&'a CompletenessSummary>,
}

impl JsonOutput {
    pub fn print_report(report: &JsonReport<'_>) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}
