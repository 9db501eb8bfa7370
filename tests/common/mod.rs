#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

use warc_harvest::archive_it::{ApiResponse, ArchiveItClient, Checksums, SeedMetadata, WarcRecord};
use warc_harvest::domain::{DateWindow, ReportFilter, ReportType, SeedId};
use warc_harvest::error::HarvestError;
use warc_harvest::tools::{Decompressor, FixityTool, ToolOutput, decompressed_name};

pub const GOOD_MD5: &str = "0cc175b9c0f1b6a831c399e269772661";
pub const HARGRETT: &str = "Hargrett Rare Book and Manuscript Library";

#[derive(Default)]
pub struct MockArchiveIt {
    warcs: Vec<WarcRecord>,
    reports: HashMap<String, ApiResponse>,
    lookups: HashMap<String, ApiResponse>,
    downloads: HashMap<String, (u16, Vec<u8>)>,
    interrupted: HashMap<String, Vec<u8>>,
    metadata: HashMap<String, SeedMetadata>,
    calls: Mutex<Vec<String>>,
}

fn report_key(report_type: ReportType, filter: ReportFilter, value: &str) -> String {
    format!("{} {}={}", report_type.as_str(), filter.as_str(), value)
}

pub fn ok(body: &str) -> ApiResponse {
    ApiResponse {
        status: 200,
        body: body.as_bytes().to_vec(),
    }
}

pub fn warc_name(seed: &str, job: &str, n: usize) -> String {
    format!("ARCHIVEIT-12263-TEST-JOB{job}-SEED{seed}-20210203{n:06}-00000.warc.gz")
}

impl MockArchiveIt {
    pub fn with_report(
        mut self,
        report_type: ReportType,
        filter: ReportFilter,
        value: &str,
        response: ApiResponse,
    ) -> Self {
        self.reports
            .insert(report_key(report_type, filter, value), response);
        self
    }

    /// Every report a healthy seed in collection 12263 needs, crawl definition 555.
    pub fn with_seed_reports(self, seed: &str, jobs: &[&str]) -> Self {
        let mut mock = self
            .with_report(
                ReportType::Seed,
                ReportFilter::Id,
                seed,
                ok(&format!("id,url,login_username,login_password\n{seed},https://example.org,u,p\n")),
            )
            .with_report(
                ReportType::ScopeRule,
                ReportFilter::Seed,
                seed,
                ok("id,type,value\n1,ignore,robots\n"),
            )
            .with_report(
                ReportType::ScopeRule,
                ReportFilter::Collection,
                "12263",
                ok("id,type,value\n2,block,ads\n"),
            )
            .with_report(
                ReportType::Collection,
                ReportFilter::Id,
                "12263",
                ok("id,name\n12263,Test collection\n"),
            )
            .with_report(
                ReportType::CrawlDefinition,
                ReportFilter::Id,
                "555",
                ok("id,recurrence_type\n555,NONE\n"),
            );
        for job in jobs {
            mock = mock.with_report(
                ReportType::CrawlJob,
                ReportFilter::Id,
                job,
                ok(&format!("id,crawl_definition,status\n{job},555,FINISHED\n")),
            );
        }
        mock
    }

    /// A WARC in the listing whose lookup and download both succeed.
    pub fn with_warc(mut self, seed: &str, job: &str, n: usize, size: u64) -> Self {
        let filename = warc_name(seed, job, n);
        let url = format!("https://warcs.example/{filename}");
        self.warcs.push(WarcRecord {
            filename: filename.clone(),
            collection: Some("12263".to_string()),
            crawl: Some(job.to_string()),
            size,
            store_time: Some("2021-02-03T18:30:01Z".to_string()),
            checksums: Checksums {
                md5: Some(GOOD_MD5.to_string()),
                sha1: None,
            },
            locations: vec![url.clone()],
        });
        self.lookups.insert(
            filename.clone(),
            ok(&format!(
                r#"{{"count": 1, "files": [{{"filename": "{filename}", "locations": ["{url}"], "checksums": {{"md5": "{GOOD_MD5}"}}}}]}}"#
            )),
        );
        self.downloads
            .insert(url, (200, format!("WARC/1.0 {filename}").into_bytes()));
        self
    }

    pub fn with_lookup(mut self, filename: &str, response: ApiResponse) -> Self {
        self.lookups.insert(filename.to_string(), response);
        self
    }

    pub fn with_download(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.downloads
            .insert(url.to_string(), (status, body.to_vec()));
        self
    }

    /// Writes `partial` to the destination and then fails as a dropped connection would.
    pub fn with_interrupted_download(mut self, url: &str, partial: &[u8]) -> Self {
        self.interrupted.insert(url.to_string(), partial.to_vec());
        self
    }

    pub fn with_metadata(mut self, seed: &str, department: &str, related: &str) -> Self {
        self.metadata.insert(
            seed.to_string(),
            SeedMetadata {
                url: Some("https://example.org/".to_string()),
                title: Some(format!("Seed {seed}")),
                department: Some(department.to_string()),
                related_collection: Some(related.to_string()),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_mentioning(&self, needle: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.contains(needle))
            .collect()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

impl ArchiveItClient for MockArchiveIt {
    fn report(
        &self,
        report_type: ReportType,
        filter: ReportFilter,
        value: &str,
    ) -> Result<ApiResponse, HarvestError> {
        let key = report_key(report_type, filter, value);
        self.record(format!("report {key}"));
        Ok(self.reports.get(&key).cloned().unwrap_or(ApiResponse {
            status: 404,
            body: Vec::new(),
        }))
    }

    fn list_warcs(&self, _window: &DateWindow) -> Result<Vec<WarcRecord>, HarvestError> {
        self.record("list".to_string());
        Ok(self.warcs.clone())
    }

    fn lookup_warc(&self, filename: &str) -> Result<ApiResponse, HarvestError> {
        self.record(format!("lookup {filename}"));
        Ok(self.lookups.get(filename).cloned().unwrap_or(ApiResponse {
            status: 404,
            body: Vec::new(),
        }))
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u16, HarvestError> {
        self.record(format!("download {url}"));
        if let Some(partial) = self.interrupted.get(url) {
            fs::write(destination, partial).map_err(|err| HarvestError::Filesystem(err.to_string()))?;
            return Err(HarvestError::ApiHttp("connection reset".to_string()));
        }
        match self.downloads.get(url) {
            Some((status, body)) => {
                if *status == 200 {
                    fs::write(destination, body)
                        .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
                }
                Ok(*status)
            }
            None => Ok(404),
        }
    }

    fn seed_metadata(&self, seed_id: &SeedId) -> Result<SeedMetadata, HarvestError> {
        self.record(format!("seed {seed_id}"));
        self.metadata
            .get(seed_id.as_str())
            .cloned()
            .ok_or_else(|| HarvestError::ApiStatus {
                status: 404,
                message: format!("no seed {seed_id}"),
            })
    }
}

/// Reports `GOOD_MD5` unless a filename has its own output.
#[derive(Default)]
pub struct MockFixity {
    outputs: HashMap<String, String>,
}

impl MockFixity {
    pub fn with_output(mut self, filename: &str, output: &str) -> Self {
        self.outputs.insert(filename.to_string(), output.to_string());
        self
    }
}

impl FixityTool for MockFixity {
    fn checksum_output(&self, path: &Path) -> Result<ToolOutput, HarvestError> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        let stdout = self
            .outputs
            .get(&name)
            .cloned()
            .unwrap_or_else(|| format!("{GOOD_MD5}  {}", path.display()));
        Ok(ToolOutput {
            success: true,
            stdout,
            stderr: String::new(),
        })
    }
}

#[derive(Debug, Clone)]
pub enum UnzipBehaviour {
    Clean,
    Stderr(String),
    OpenDefect,
}

/// Copies `x.warc.gz` to `x.warc`, or misbehaves per filename.
#[derive(Default)]
pub struct MockDecompressor {
    behaviours: HashMap<String, UnzipBehaviour>,
}

impl MockDecompressor {
    pub fn with_behaviour(mut self, filename: &str, behaviour: UnzipBehaviour) -> Self {
        self.behaviours.insert(filename.to_string(), behaviour);
        self
    }
}

impl Decompressor for MockDecompressor {
    fn decompress(
        &self,
        archive: &Path,
        destination_dir: &Path,
    ) -> Result<ToolOutput, HarvestError> {
        let name = archive.file_name().unwrap().to_string_lossy().to_string();
        match self
            .behaviours
            .get(&name)
            .cloned()
            .unwrap_or(UnzipBehaviour::Clean)
        {
            UnzipBehaviour::Clean => {
                fs::copy(archive, destination_dir.join(decompressed_name(&name))).unwrap();
                Ok(ToolOutput {
                    success: true,
                    ..ToolOutput::default()
                })
            }
            UnzipBehaviour::Stderr(text) => Ok(ToolOutput {
                success: false,
                stdout: String::new(),
                stderr: text,
            }),
            UnzipBehaviour::OpenDefect => {
                fs::write(destination_dir.join(format!("{name}.open")), b"partial").unwrap();
                Ok(ToolOutput {
                    success: true,
                    ..ToolOutput::default()
                })
            }
        }
    }
}
