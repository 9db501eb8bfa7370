use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{info, warn};

use crate::archive_it::ArchiveItClient;
use crate::fs_util;
use crate::seed::{SeedRecord, Stage};
use crate::tools::{Decompressor, FixityTool, decompressed_name, open_sentinel, parse_md5_output};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhaseResult<T> {
    Succeeded(T),
    Failed,
}

impl<T> PhaseResult<T> {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, PhaseResult::Succeeded(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarcInfo {
    pub url: String,
    pub md5: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnzipOutcome {
    Unzipped(PathBuf),
    /// The tool reported an error; the compressed file is kept.
    ToolError,
    /// The tool wrote a `.gz.open` file instead of the WARC; the compressed file is kept.
    OpenFileDefect,
}

/// How far one WARC got through the phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WarcOutcome {
    InfoFailed,
    DownloadFailed,
    FixityFailed,
    Unzip(UnzipOutcome),
}

/// Downloads, checks and decompresses one WARC at a time. Every phase records its
/// outcome on the seed; a failed phase stops work on that WARC only.
pub struct WarcRetriever<'a, C: ArchiveItClient + ?Sized> {
    client: &'a C,
    fixity: &'a dyn FixityTool,
    decompressor: &'a dyn Decompressor,
}

impl<'a, C: ArchiveItClient + ?Sized> WarcRetriever<'a, C> {
    pub fn new(
        client: &'a C,
        fixity: &'a dyn FixityTool,
        decompressor: &'a dyn Decompressor,
    ) -> Self {
        Self {
            client,
            fixity,
            decompressor,
        }
    }

    /// Runs every phase for `filename`, saving into `folder`.
    pub fn retrieve(&self, seed: &mut SeedRecord, filename: &str, folder: &Path) -> WarcOutcome {
        let info = match self.get_warc_info(seed, filename) {
            PhaseResult::Succeeded(info) => info,
            PhaseResult::Failed => return WarcOutcome::InfoFailed,
        };
        let destination = folder.join(filename);
        if !self.get_warc(seed, &info.url, &destination).is_succeeded() {
            return WarcOutcome::DownloadFailed;
        }
        if !self.verify_fixity(seed, &destination, &info.md5).is_succeeded() {
            return WarcOutcome::FixityFailed;
        }
        WarcOutcome::Unzip(self.unzip(seed, &destination, folder))
    }

    pub fn get_warc_info(&self, seed: &mut SeedRecord, filename: &str) -> PhaseResult<WarcInfo> {
        let response = match self.client.lookup_warc(filename) {
            Ok(response) => response,
            Err(err) => {
                warn!(warc = filename, error = %err, "WARC lookup failed");
                seed.failure(
                    Stage::WarcDownload,
                    format!("API error no response: can't get info for {filename}"),
                );
                return PhaseResult::Failed;
            }
        };
        if response.status != 200 {
            seed.failure(
                Stage::WarcDownload,
                format!("API error {}: can't get info for {filename}", response.status),
            );
            return PhaseResult::Failed;
        }
        match parse_warc_info(&response.body) {
            Some(info) => PhaseResult::Succeeded(info),
            None => {
                seed.failure(
                    Stage::WarcDownload,
                    format!("Index or key error: can't get location or md5 for {filename}"),
                );
                PhaseResult::Failed
            }
        }
    }

    pub fn get_warc(&self, seed: &mut SeedRecord, url: &str, destination: &Path) -> PhaseResult<()> {
        let filename = fs_util::file_name(destination);
        match self.client.download(url, destination) {
            Ok(200) => {
                info!(warc = %filename, "downloaded WARC");
                seed.success(Stage::WarcDownload, format!("Successfully downloaded {filename}"));
                PhaseResult::Succeeded(())
            }
            Ok(status) => {
                discard(destination);
                seed.failure(
                    Stage::WarcDownload,
                    format!("API error {status}: can't download {filename}"),
                );
                PhaseResult::Failed
            }
            Err(err) => {
                warn!(warc = %filename, error = %err, "WARC download failed");
                discard(destination);
                seed.failure(
                    Stage::WarcDownload,
                    format!("API error no response: can't download {filename}"),
                );
                PhaseResult::Failed
            }
        }
    }

    pub fn verify_fixity(
        &self,
        seed: &mut SeedRecord,
        path: &Path,
        expected_md5: &str,
    ) -> PhaseResult<()> {
        let filename = fs_util::file_name(path);
        let output = match self.fixity.checksum_output(path) {
            Ok(output) => output.combined(),
            Err(err) => err.to_string(),
        };

        // Unparseable output leaves the file for manual inspection.
        let Some(actual) = parse_md5_output(&output) else {
            seed.failure(
                Stage::WarcFixity,
                format!("Fixity for {filename} cannot be extracted from md5deep output: {output}"),
            );
            return PhaseResult::Failed;
        };

        if !actual.eq_ignore_ascii_case(expected_md5.trim()) {
            let deleted = fs_util::remove_file_if_exists(path).is_ok();
            let action = if deleted { "it was deleted" } else { "it could not be deleted" };
            warn!(warc = %filename, expected = expected_md5, actual = %actual, "fixity mismatch");
            seed.failure(
                Stage::WarcFixity,
                format!(
                    "Fixity for {filename} changed and {action}: {expected_md5} before, {actual} after"
                ),
            );
            return PhaseResult::Failed;
        }

        let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S");
        seed.success(
            Stage::WarcFixity,
            format!("Successfully verified {filename} fixity on {timestamp}"),
        );
        PhaseResult::Succeeded(())
    }

    pub fn unzip(&self, seed: &mut SeedRecord, path: &Path, destination_dir: &Path) -> UnzipOutcome {
        let filename = fs_util::file_name(path);
        let target = destination_dir.join(decompressed_name(&filename));
        // Decompressing onto the input would leave nothing after the cleanup below.
        if target == path {
            seed.failure(
                Stage::WarcUnzip,
                format!("Error unzipping {filename}: not a gzip archive"),
            );
            return UnzipOutcome::ToolError;
        }
        let output = match self.decompressor.decompress(path, destination_dir) {
            Ok(output) => output,
            Err(err) => {
                seed.failure(Stage::WarcUnzip, format!("Error unzipping {filename}: {err}"));
                return UnzipOutcome::ToolError;
            }
        };

        if !output.stderr.trim().is_empty() {
            seed.failure(
                Stage::WarcUnzip,
                format!("Error unzipping {filename}: {}", output.combined()),
            );
            return UnzipOutcome::ToolError;
        }

        let sentinel = open_sentinel(path);
        if sentinel.exists() {
            discard(&sentinel);
            seed.failure(
                Stage::WarcUnzip,
                format!("Error unzipping {filename}: unzipped to '.gz.open' file"),
            );
            return UnzipOutcome::OpenFileDefect;
        }

        if let Err(err) = fs_util::remove_file_if_exists(path) {
            warn!(warc = %filename, error = %err, "could not remove compressed WARC");
        }
        seed.success(Stage::WarcUnzip, format!("Successfully unzipped {filename}"));
        UnzipOutcome::Unzipped(target)
    }
}

fn discard(path: &Path) {
    if let Err(err) = fs_util::remove_file_if_exists(path) {
        warn!(path = %path.display(), error = %err, "could not remove file");
    }
}

/// Reads `files[0].locations[0]` and `files[0].checksums.md5` from a filename lookup.
pub fn parse_warc_info(body: &[u8]) -> Option<WarcInfo> {
    let raw: Value = serde_json::from_slice(body).ok()?;
    let file = raw.get("files")?.as_array()?.first()?;
    let url = file.get("locations")?.as_array()?.first()?.as_str()?;
    let md5 = file.get("checksums")?.get("md5")?.as_str()?;
    Some(WarcInfo {
        url: url.to_string(),
        md5: md5.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn warc_info_from_lookup() {
        let body = br#"{"files": [{"locations": ["https://x/a.warc.gz"], "checksums": {"md5": "abc"}}]}"#;
        assert_eq!(
            parse_warc_info(body),
            Some(WarcInfo {
                url: "https://x/a.warc.gz".to_string(),
                md5: "abc".to_string()
            })
        );
    }

    #[test]
    fn warc_info_missing_fields() {
        assert_eq!(parse_warc_info(br#"{"files": []}"#), None);
        assert_eq!(parse_warc_info(br#"{"files": [{"locations": []}]}"#), None);
        assert_eq!(parse_warc_info(b"not json"), None);
    }
}
