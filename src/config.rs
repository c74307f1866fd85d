use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Server;
use crate::error::KiraError;
use crate::retry::RetryPolicy;

pub const DEFAULT_CONFIG_FILE: &str = "kira-ga.json";
pub const DEFAULT_OUTPUT_ROOT: &str = "data";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub output_root: Option<String>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub retry: Option<RetryEntry>,
    #[serde(default)]
    pub servers: Option<ServerEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub initial_delay_secs: Option<u64>,
    #[serde(default)]
    pub retry_not_found: Option<bool>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ServerEntry {
    #[serde(default)]
    pub ensembl: Option<String>,
    #[serde(default)]
    pub plants: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub output_root: Utf8PathBuf,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    pub ensembl_url: String,
    pub plants_url: String,
}

impl ResolvedConfig {
    pub fn server_url(&self, server: Server) -> &str {
        match server {
            Server::Ensembl => &self.ensembl_url,
            Server::Plants => &self.plants_url,
        }
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            schema_version: 1,
            output_root: Utf8PathBuf::from(DEFAULT_OUTPUT_ROOT),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            ensembl_url: Server::Ensembl.default_url().to_string(),
            plants_url: Server::Plants.default_url().to_string(),
        }
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `kira-ga.json` from the working directory when no
    /// path is given. A missing default file yields the built-in defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let defaults = ResolvedConfig::default();
        let schema_version = config.schema_version.unwrap_or(defaults.schema_version);

        let output_root = match config.output_root {
            Some(root) if root.trim().is_empty() => {
                return Err(KiraError::InvalidConfig(
                    "output_root must not be empty".to_string(),
                ));
            }
            Some(root) => Utf8PathBuf::from(root),
            None => defaults.output_root,
        };

        let request_timeout = match config.request_timeout_secs {
            Some(0) => {
                return Err(KiraError::InvalidConfig(
                    "request_timeout_secs must be positive".to_string(),
                ));
            }
            Some(secs) => Duration::from_secs(secs),
            None => defaults.request_timeout,
        };

        let retry_entry = config.retry.unwrap_or_default();
        let retry = RetryPolicy {
            max_attempts: retry_entry
                .max_attempts
                .unwrap_or(defaults.retry.max_attempts),
            initial_delay: retry_entry
                .initial_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.retry.initial_delay),
            retry_not_found: retry_entry
                .retry_not_found
                .unwrap_or(defaults.retry.retry_not_found),
        };
        if retry.max_attempts == 0 {
            return Err(KiraError::InvalidConfig(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }

        let servers = config.servers.unwrap_or_default();
        let ensembl_url = server_override(servers.ensembl, defaults.ensembl_url)?;
        let plants_url = server_override(servers.plants, defaults.plants_url)?;

        Ok(ResolvedConfig {
            schema_version,
            output_root,
            request_timeout,
            retry,
            ensembl_url,
            plants_url,
        })
    }
}

fn server_override(value: Option<String>, default: String) -> Result<String, KiraError> {
    match value {
        None => Ok(default),
        Some(url) if url.starts_with("http://") || url.starts_with("https://") => {
            Ok(url.trim_end_matches('/').to_string())
        }
        Some(url) => Err(KiraError::InvalidConfig(format!(
            "server url must be http(s): {url}"
        ))),
    }
}
