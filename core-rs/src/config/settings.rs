/**
 * settings.rs
 * Orchestrator configuration (YAML file + environment overrides)
 *
 * Format:
 * ```yaml
 * bmpApiUrl: http://bmp.internal:8000
 * cstrApiUrl: http://cstr.internal:8000
 * appUrl: https://app.procycla.com
 * dataDir: ./data
 * listen: 127.0.0.1:3000
 * requestTimeoutSecs: 600
 * substrateConcurrency: 1
 * ```
 *
 * Environment variables override file values:
 * BMP_API_URL, CSTR_API_URL, APP_URL, PROCYCLA_DATA_DIR, PROCYCLA_LISTEN,
 * PROCYCLA_REQUEST_TIMEOUT_SECS, PROCYCLA_SUBSTRATE_CONCURRENCY
 */

use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::errors::{Result, SimError};

pub const ENV_BMP_API_URL: &str = "BMP_API_URL";
pub const ENV_CSTR_API_URL: &str = "CSTR_API_URL";
pub const ENV_APP_URL: &str = "APP_URL";
pub const ENV_DATA_DIR: &str = "PROCYCLA_DATA_DIR";
pub const ENV_LISTEN: &str = "PROCYCLA_LISTEN";
pub const ENV_REQUEST_TIMEOUT_SECS: &str = "PROCYCLA_REQUEST_TIMEOUT_SECS";
pub const ENV_SUBSTRATE_CONCURRENCY: &str = "PROCYCLA_SUBSTRATE_CONCURRENCY";

/// Default config file name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "procycla.yaml";

fn default_data_dir() -> PathBuf {
    PathBuf::from(crate::DEFAULT_DATA_DIR)
}

fn default_listen() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    600
}

fn default_substrate_concurrency() -> usize {
    1
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrchestratorConfig {
    /// Base URL of the BMP service
    pub bmp_api_url: String,
    /// Base URL of the CSTR service
    pub cstr_api_url: String,
    /// Public base URL of this system, used to build progress callback URLs
    pub app_url: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Per external call timeout; a timeout is a transport failure
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Substrates processed in parallel during the CSTR fan-out
    #[serde(default = "default_substrate_concurrency")]
    pub substrate_concurrency: usize,
}

impl OrchestratorConfig {
    /// Configuration with the three service URLs and defaults elsewhere
    pub fn new(bmp_api_url: &str, cstr_api_url: &str, app_url: &str) -> Self {
        Self {
            bmp_api_url: bmp_api_url.to_string(),
            cstr_api_url: cstr_api_url.to_string(),
            app_url: app_url.to_string(),
            data_dir: default_data_dir(),
            listen: default_listen(),
            request_timeout_secs: default_request_timeout_secs(),
            substrate_concurrency: default_substrate_concurrency(),
        }
    }

    /// Load configuration from a YAML file
    ///
    /// # Example
    /// ```no_run
    /// use procycla_core::OrchestratorConfig;
    ///
    /// let config = OrchestratorConfig::load("procycla.yaml").unwrap();
    /// assert!(config.substrate_concurrency >= 1);
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(SimError::FileNotFound(path.to_string_lossy().to_string()));
        }

        let content = fs::read_to_string(path)?;
        let config: OrchestratorConfig = serde_yaml::from_str(&content)
            .map_err(|e| SimError::Config(format!("Invalid config YAML in {}: {}", path.display(), e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Build configuration from the process environment alone
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load `path` if given, otherwise `procycla.yaml` in the working
    /// directory if present, otherwise the environment. Environment variables
    /// override file values.
    pub fn load_or_env(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => Some(p.to_path_buf()),
            None => {
                let local = PathBuf::from(CONFIG_FILE_NAME);
                local.exists().then_some(local)
            }
        };

        match file {
            Some(p) => {
                let content = fs::read_to_string(&p).map_err(|e| match e.kind() {
                    std::io::ErrorKind::NotFound => SimError::FileNotFound(p.to_string_lossy().to_string()),
                    _ => SimError::Io(e),
                })?;
                let mut config: OrchestratorConfig = serde_yaml::from_str(&content)
                    .map_err(|e| SimError::Config(format!("Invalid config YAML in {}: {}", p.display(), e)))?;
                config.apply_overrides(|key| std::env::var(key).ok())?;
                config.validate()?;
                Ok(config)
            }
            None => Self::from_env(),
        }
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key).ok_or_else(|| SimError::Config(format!("{} is not set", key)))
        };

        let mut config = Self::new(
            &required(ENV_BMP_API_URL)?,
            &required(ENV_CSTR_API_URL)?,
            &required(ENV_APP_URL)?,
        );
        config.apply_overrides(&lookup)?;
        config.validate()?;
        Ok(config)
    }

    /// Overwrite fields with any variables `lookup` provides
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup(ENV_BMP_API_URL) {
            self.bmp_api_url = v;
        }
        if let Some(v) = lookup(ENV_CSTR_API_URL) {
            self.cstr_api_url = v;
        }
        if let Some(v) = lookup(ENV_APP_URL) {
            self.app_url = v;
        }
        if let Some(v) = lookup(ENV_DATA_DIR) {
            self.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LISTEN) {
            self.listen = v;
        }
        if let Some(v) = lookup(ENV_REQUEST_TIMEOUT_SECS) {
            self.request_timeout_secs = parse_number(ENV_REQUEST_TIMEOUT_SECS, &v)?;
        }
        if let Some(v) = lookup(ENV_SUBSTRATE_CONCURRENCY) {
            self.substrate_concurrency = parse_number(ENV_SUBSTRATE_CONCURRENCY, &v)?;
        }
        Ok(())
    }

    /// Validate configuration
    ///
    /// Ensures:
    /// - service and app URLs are absolute http(s) URLs
    /// - the listen address parses
    /// - timeout and concurrency are positive
    pub fn validate(&self) -> Result<()> {
        validate_url("bmpApiUrl", &self.bmp_api_url)?;
        validate_url("cstrApiUrl", &self.cstr_api_url)?;
        validate_url("appUrl", &self.app_url)?;

        self.listen_addr()?;

        if self.request_timeout_secs == 0 {
            return Err(SimError::Config("requestTimeoutSecs must be greater than 0".to_string()));
        }
        if self.substrate_concurrency == 0 {
            return Err(SimError::Config("substrateConcurrency must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        self.listen
            .parse()
            .map_err(|e| SimError::Config(format!("Invalid listen address '{}': {}", self.listen, e)))
    }
}

fn validate_url(field: &str, value: &str) -> Result<()> {
    let url = reqwest::Url::parse(value)
        .map_err(|e| SimError::Config(format!("{} '{}' is not a valid URL: {}", field, value, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SimError::Config(format!(
            "{} must use http or https, got '{}'",
            field, other
        ))),
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| SimError::Config(format!("{} must be a positive integer, got '{}'", key, value)))
}
