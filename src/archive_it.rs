use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::debug;

use crate::config::{Credentials, ResolvedConfig};
use crate::domain::{DateWindow, ReportFilter, ReportType, SeedId};
use crate::error::HarvestError;

/// Status and raw body of a call whose non-success outcomes are recorded, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One entry of the binary-file (WASAPI) listing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WarcRecord {
    pub filename: String,
    #[serde(default, deserialize_with = "id_string")]
    pub collection: Option<String>,
    #[serde(default, deserialize_with = "id_string")]
    pub crawl: Option<String>,
    #[serde(default)]
    pub size: u64,
    #[serde(rename = "store-time", default)]
    pub store_time: Option<String>,
    #[serde(default)]
    pub checksums: Checksums,
    #[serde(default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Checksums {
    #[serde(default)]
    pub md5: Option<String>,
    #[serde(default)]
    pub sha1: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WasapiPage {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub files: Vec<WarcRecord>,
}

/// Descriptive metadata attached to a seed in the partner API.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeedMetadata {
    pub url: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub related_collection: Option<String>,
}

pub trait ArchiveItClient: Send + Sync {
    /// A metadata report as CSV bytes; empty bodies are normal.
    fn report(
        &self,
        report_type: ReportType,
        filter: ReportFilter,
        value: &str,
    ) -> Result<ApiResponse, HarvestError>;

    /// Every WARC stored inside `window`, across all pages.
    fn list_warcs(&self, window: &DateWindow) -> Result<Vec<WarcRecord>, HarvestError>;

    /// Binary-file listing filtered to a single filename.
    fn lookup_warc(&self, filename: &str) -> Result<ApiResponse, HarvestError>;

    /// Streams `url` into `destination` when the status is a success and returns the status.
    fn download(&self, url: &str, destination: &Path) -> Result<u16, HarvestError>;

    fn seed_metadata(&self, seed_id: &SeedId) -> Result<SeedMetadata, HarvestError>;
}

#[derive(Clone)]
pub struct ArchiveItHttpClient {
    client: Client,
    download_client: Client,
    credentials: Credentials,
    partner_api: String,
    wasapi: String,
    page_size: u32,
}

impl ArchiveItHttpClient {
    pub fn new(config: &ResolvedConfig) -> Result<Self, HarvestError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("warc-harvest/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| HarvestError::ApiHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers.clone())
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
        let download_client = Client::builder()
            .default_headers(headers)
            .timeout(config.download_timeout)
            .build()
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;

        Ok(Self {
            client,
            download_client,
            credentials: config.credentials.clone(),
            partner_api: config.partner_api.clone(),
            wasapi: config.wasapi.clone(),
            page_size: config.page_size,
        })
    }

    fn authed(&self, client: &Client, url: &str) -> reqwest::blocking::RequestBuilder {
        client
            .get(url)
            .basic_auth(&self.credentials.username, Some(&self.credentials.password))
    }

    fn send_with_retries<F>(
        &self,
        mut make_req: F,
    ) -> Result<reqwest::blocking::Response, HarvestError>
    where
        F: FnMut() -> reqwest::blocking::RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 500;
        let mut attempt = 0usize;
        loop {
            let response = make_req().send();
            match response {
                Ok(resp) => {
                    let status = resp.status().as_u16();
                    if attempt < MAX_RETRIES && is_retryable_status(status) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        debug!(status, attempt, "retrying Archive-It request");
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        let delay = BASE_DELAY_MS * (attempt as u64 + 1);
                        thread::sleep(Duration::from_millis(delay));
                        attempt += 1;
                        continue;
                    }
                    return Err(HarvestError::ApiHttp(err.to_string()));
                }
            }
        }
    }

    fn into_api_response(
        response: reqwest::blocking::Response,
    ) -> Result<ApiResponse, HarvestError> {
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn handle_status(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, HarvestError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "Archive-It request failed".to_string());
        Err(HarvestError::ApiStatus { status, message })
    }
}

impl ArchiveItClient for ArchiveItHttpClient {
    fn report(
        &self,
        report_type: ReportType,
        filter: ReportFilter,
        value: &str,
    ) -> Result<ApiResponse, HarvestError> {
        let url = format!("{}/reports/{}", self.partner_api, report_type.as_str());
        let response = self.send_with_retries(|| {
            self.authed(&self.client, &url).query(&[
                (filter.as_str(), value),
                ("limit", "-1"),
                ("format", "csv"),
            ])
        })?;
        Self::into_api_response(response)
    }

    fn list_warcs(&self, window: &DateWindow) -> Result<Vec<WarcRecord>, HarvestError> {
        let (after, before) = window.query_bounds();
        let page_size = self.page_size.to_string();
        collect_pages(|next| {
            let response = match next {
                None => self.send_with_retries(|| {
                    self.authed(&self.client, &self.wasapi).query(&[
                        ("store-time-after", after.as_str()),
                        ("store-time-before", before.as_str()),
                        ("page_size", page_size.as_str()),
                    ])
                })?,
                Some(url) => self.send_with_retries(|| self.authed(&self.client, url))?,
            };
            let bytes = Self::handle_status(response)?
                .bytes()
                .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
            parse_page(&bytes)
        })
    }

    fn lookup_warc(&self, filename: &str) -> Result<ApiResponse, HarvestError> {
        let response = self.send_with_retries(|| {
            self.authed(&self.client, &self.wasapi)
                .query(&[("filename", filename)])
        })?;
        Self::into_api_response(response)
    }

    fn download(&self, url: &str, destination: &Path) -> Result<u16, HarvestError> {
        let mut response = self.send_with_retries(|| self.authed(&self.download_client, url))?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Ok(status);
        }
        let mut file = File::create(destination)
            .map_err(|err| HarvestError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| HarvestError::ApiHttp(err.to_string()))?;
        Ok(status)
    }

    fn seed_metadata(&self, seed_id: &SeedId) -> Result<SeedMetadata, HarvestError> {
        let url = format!("{}/seed/{}", self.partner_api, seed_id.as_str());
        let response = self.send_with_retries(|| self.authed(&self.client, &url))?;
        let response = Self::handle_status(response)?;
        let raw: Value = response
            .json()
            .map_err(|err| HarvestError::ApiPayload(err.to_string()))?;
        Ok(extract_seed_metadata(&raw))
    }
}

pub fn parse_page(bytes: &[u8]) -> Result<WasapiPage, HarvestError> {
    serde_json::from_slice(bytes).map_err(|err| HarvestError::ApiPayload(err.to_string()))
}

/// Follows `next` links until a page has none, concatenating every page's files.
/// `fetch_page` receives `None` for the first page and the `next` URL afterwards.
pub fn collect_pages<F>(mut fetch_page: F) -> Result<Vec<WarcRecord>, HarvestError>
where
    F: FnMut(Option<&str>) -> Result<WasapiPage, HarvestError>,
{
    let mut records = Vec::new();
    let mut next: Option<String> = None;
    loop {
        let page = fetch_page(next.as_deref())?;
        debug!(files = page.files.len(), total = ?page.count, "read WASAPI page");
        records.extend(page.files);
        next = page.next.filter(|url| !url.trim().is_empty());
        if next.is_none() {
            return Ok(records);
        }
    }
}

/// Reads `metadata.{Title,Creator,Relation}[0].value` from a partner API seed record.
pub fn extract_seed_metadata(raw: &Value) -> SeedMetadata {
    let field = |name: &str| {
        raw.get("metadata")
            .and_then(|value| value.get(name))
            .and_then(|value| value.as_array())
            .and_then(|array| array.first())
            .and_then(|value| value.get("value"))
            .and_then(|value| value.as_str())
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };
    SeedMetadata {
        url: raw
            .get("url")
            .and_then(|value| value.as_str())
            .map(|value| value.to_string()),
        title: field("Title"),
        department: field("Creator"),
        related_collection: field("Relation").map(|value| collection_code(&value)),
    }
}

/// Relation values end with the collection identifier (`... ua12-345`,
/// `... RBRL/001/CBG`). Slashes become dashes so the code is safe in folder names.
fn collection_code(relation: &str) -> String {
    relation
        .split_whitespace()
        .last()
        .map(|token| token.replace('/', "-"))
        .unwrap_or_else(|| relation.to_string())
}

fn id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(text)) if !text.is_empty() => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect() || err.is_request()
}
