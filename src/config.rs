use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::domain::BoundaryPolicy;
use crate::error::HarvestError;
use crate::naming::DepartmentScheme;

pub const CONFIG_FILE: &str = "warc-harvest.json";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub partner_api: Option<String>,
    #[serde(default)]
    pub wasapi: Option<String>,
    #[serde(default)]
    pub page_size: Option<u32>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub download_timeout_secs: Option<u64>,
    #[serde(default)]
    pub warc_delay_secs: Option<u64>,
    #[serde(default)]
    pub boundary: Option<BoundaryPolicy>,
    #[serde(default)]
    pub departments: Option<Vec<DepartmentEntry>>,
    #[serde(default)]
    pub fixity_tool: Option<String>,
    #[serde(default)]
    pub decompressor: Option<DecompressorKind>,
    #[serde(default)]
    pub seven_zip: Option<String>,
    #[serde(default)]
    pub ignored_folders: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DepartmentEntry {
    /// Department name exactly as it appears in the seed's `Creator` metadata.
    pub name: String,
    #[serde(flatten)]
    pub scheme: DepartmentScheme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecompressorKind {
    #[default]
    SevenZip,
    Gzip,
}

#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub credentials: Credentials,
    pub partner_api: String,
    pub wasapi: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub download_timeout: Duration,
    pub warc_delay: Duration,
    pub boundary: BoundaryPolicy,
    pub departments: Vec<DepartmentEntry>,
    pub fixity_tool: String,
    pub decompressor: DecompressorKind,
    pub seven_zip: String,
    pub ignored_folders: Vec<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, HarvestError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => Self::default_path().ok_or(HarvestError::MissingConfig)?,
        };

        let content = fs::read_to_string(&config_path)
            .map_err(|_| HarvestError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| HarvestError::ConfigParse(err.to_string()))?;

        let env_credentials = (
            std::env::var("ARCHIVE_IT_USERNAME").ok(),
            std::env::var("ARCHIVE_IT_PASSWORD").ok(),
        );
        Self::resolve_with_env(config, env_credentials)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, HarvestError> {
        Self::resolve_with_env(config, (None, None))
    }

    /// Environment credentials, when present and non-blank, win over the file.
    pub fn resolve_with_env(
        config: Config,
        env_credentials: (Option<String>, Option<String>),
    ) -> Result<ResolvedConfig, HarvestError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let pick = |env: Option<String>, file: Option<String>| {
            env.filter(|value| !value.trim().is_empty())
                .or(file.filter(|value| !value.trim().is_empty()))
        };
        let username = pick(env_credentials.0, config.username);
        let password = pick(env_credentials.1, config.password);
        let credentials = match (username, password) {
            (Some(username), Some(password)) => Credentials { username, password },
            _ => return Err(HarvestError::MissingCredentials),
        };

        Ok(ResolvedConfig {
            schema_version,
            credentials,
            partner_api: trim_url(
                config
                    .partner_api
                    .unwrap_or_else(|| "https://partner.archive-it.org/api".to_string()),
            ),
            wasapi: trim_url(
                config
                    .wasapi
                    .unwrap_or_else(|| "https://warcs.archive-it.org/wasapi/v1/webdata".to_string()),
            ),
            page_size: config.page_size.unwrap_or(1000).max(1),
            request_timeout: Duration::from_secs(config.request_timeout_secs.unwrap_or(60)),
            download_timeout: Duration::from_secs(config.download_timeout_secs.unwrap_or(3600)),
            warc_delay: Duration::from_secs(config.warc_delay_secs.unwrap_or(15)),
            boundary: config.boundary.unwrap_or_default(),
            departments: config.departments.unwrap_or_else(default_departments),
            fixity_tool: config.fixity_tool.unwrap_or_else(|| "md5deep".to_string()),
            decompressor: config.decompressor.unwrap_or_default(),
            seven_zip: config.seven_zip.unwrap_or_else(|| "7z".to_string()),
            ignored_folders: config.ignored_folders.unwrap_or_default(),
        })
    }

    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(CONFIG_FILE);
        if local.exists() {
            return Some(local);
        }
        ProjectDirs::from("", "", "warc-harvest")
            .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
            .filter(|path| path.exists())
    }
}

fn trim_url(url: String) -> String {
    url.trim_end_matches('/').to_string()
}

pub fn default_departments() -> Vec<DepartmentEntry> {
    vec![
        DepartmentEntry {
            name: "Hargrett Rare Book and Manuscript Library".to_string(),
            scheme: DepartmentScheme::CollectionSequence {
                code: "harg".to_string(),
            },
        },
        DepartmentEntry {
            name: "Richard B. Russell Library for Political Research and Studies".to_string(),
            scheme: DepartmentScheme::CollectionSequence {
                code: "rbrl".to_string(),
            },
        },
        DepartmentEntry {
            name: "Map and Government Information Library".to_string(),
            scheme: DepartmentScheme::SeedMonth {
                prefix: "magil-ggp".to_string(),
            },
        },
    ]
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn with_credentials() -> Config {
        Config {
            username: Some("user".to_string()),
            password: Some("secret".to_string()),
            ..Config::default()
        }
    }

    #[test]
    fn defaults_fill_optional_fields() {
        let resolved = ConfigLoader::resolve_config(with_credentials()).unwrap();
        assert_eq!(resolved.schema_version, 1);
        assert_eq!(resolved.partner_api, "https://partner.archive-it.org/api");
        assert_eq!(resolved.page_size, 1000);
        assert_eq!(resolved.warc_delay, Duration::from_secs(15));
        assert_eq!(resolved.boundary, BoundaryPolicy::StartInclusiveEndExclusive);
        assert_eq!(resolved.departments, default_departments());
        assert_eq!(resolved.decompressor, DecompressorKind::SevenZip);
    }

    #[test]
    fn missing_credentials_are_fatal() {
        let err = ConfigLoader::resolve_config(Config::default()).unwrap_err();
        assert_matches!(err, HarvestError::MissingCredentials);
    }

    #[test]
    fn env_credentials_override_file() {
        let resolved = ConfigLoader::resolve_with_env(
            with_credentials(),
            (Some("env-user".to_string()), Some("  ".to_string())),
        )
        .unwrap();
        assert_eq!(resolved.credentials.username, "env-user");
        assert_eq!(resolved.credentials.password, "secret");
    }
}
