//! Console configuration.
//!
//! Loaded from `~/.aegis/console.toml`. A missing file yields defaults; a file
//! that exists but does not parse is an error rather than a silent fallback.

use aegis_protocol::LOG_STREAM_PATH;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::buffer::DEFAULT_LOG_CAPACITY;
use crate::error::{ConsoleError, Result};

pub const API_URL_ENV: &str = "AEGIS_API_URL";
pub const STREAM_URL_ENV: &str = "AEGIS_STREAM_URL";

const AEGIS_DIR: &str = ".aegis";
const CONFIG_FILE: &str = "console.toml";
const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8000/api";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 3_000;
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_PROJECT: &str = "Default_Project";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConsoleConfig {
    pub api_base_url: String,
    /// Derived from `api_base_url` when unset.
    pub stream_url: Option<String>,
    pub reconnect_delay_ms: u64,
    pub log_capacity: usize,
    pub request_timeout_ms: u64,
    pub default_project: String,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            stream_url: None,
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
            log_capacity: DEFAULT_LOG_CAPACITY,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
            default_project: DEFAULT_PROJECT.to_string(),
        }
    }
}

impl ConsoleConfig {
    /// Applies `AEGIS_API_URL` / `AEGIS_STREAM_URL` when set and non-empty.
    pub fn with_env_overrides(self) -> Self {
        let api = env::var(API_URL_ENV).ok();
        let stream = env::var(STREAM_URL_ENV).ok();
        self.with_overrides(api, stream)
    }

    pub fn with_overrides(mut self, api_base_url: Option<String>, stream_url: Option<String>) -> Self {
        if let Some(value) = api_base_url.filter(|value| !value.trim().is_empty()) {
            self.api_base_url = value.trim().to_string();
        }
        if let Some(value) = stream_url.filter(|value| !value.trim().is_empty()) {
            self.stream_url = Some(value.trim().to_string());
        }
        self
    }

    pub fn api_url(&self) -> Result<Url> {
        let url = parse_url(&self.api_base_url)?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConsoleError::InvalidUrl {
                url: self.api_base_url.clone(),
                details: format!("expected http or https, got {}", other),
            }),
        }
    }

    /// The log feed URL: explicit `stream_url`, or the API base with its
    /// scheme switched to `ws`/`wss` and the log stream path appended.
    pub fn stream_url(&self) -> Result<Url> {
        if let Some(explicit) = &self.stream_url {
            let url = parse_url(explicit)?;
            return match url.scheme() {
                "ws" | "wss" => Ok(url),
                other => Err(ConsoleError::InvalidUrl {
                    url: explicit.clone(),
                    details: format!("expected ws or wss, got {}", other),
                }),
            };
        }

        let mut url = self.api_url()?;
        let scheme = if url.scheme() == "https" { "wss" } else { "ws" };
        url.set_scheme(scheme).map_err(|_| ConsoleError::InvalidUrl {
            url: self.api_base_url.clone(),
            details: format!("cannot switch scheme to {}", scheme),
        })?;
        let path = format!("{}{}", url.path().trim_end_matches('/'), LOG_STREAM_PATH);
        url.set_path(&path);
        url.set_query(None);
        Ok(url)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Returns `~/.aegis`, the root for config and diagnostics.
pub fn aegis_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(ConsoleError::HomeDirNotFound)?;
    Ok(home.join(AEGIS_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(aegis_dir()?.join(CONFIG_FILE))
}

pub fn load_config(path: Option<PathBuf>) -> Result<ConsoleConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };

    if !config_path.exists() {
        return Ok(ConsoleConfig::default());
    }

    let content = fs_err::read_to_string(&config_path).map_err(|source| ConsoleError::Io {
        context: format!("reading {}", config_path.display()),
        source,
    })?;
    toml::from_str::<ConsoleConfig>(&content).map_err(|err| ConsoleError::ConfigMalformed {
        path: config_path,
        details: err.to_string(),
    })
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|err| ConsoleError::InvalidUrl {
        url: raw.to_string(),
        details: err.to_string(),
    })
}
