//! Application configuration
//!
//! Each parameter is looked up in an environment variable first, then in the
//! TOML config files, then falls back to a default. Files are read in order
//! (`/etc/twack.toml`, `~/.twack.toml`, `./twack.toml`); later files win.

use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{Result, TwackError};

pub const DEFAULT_DB_PATH: &str = "twack.db";
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_API_BASE: &str = "https://api.twitter.com";

/// Database settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub busy_timeout: Duration,
}

/// API credentials and endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TwitterConfig {
    pub consumer_key: String,
    pub consumer_secret: String,
    pub api_base: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    path: Option<String>,
    busy_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct TwitterSection {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    api_base: Option<String>,
}

/// Contents of one config file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    twitter: TwitterSection,
}

impl FileConfig {
    pub fn parse(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| TwackError::Config(e.to_string()))
    }

    /// Values in `other` override values in `self`
    fn merge(self, other: FileConfig) -> FileConfig {
        FileConfig {
            database: DatabaseSection {
                path: other.database.path.or(self.database.path),
                busy_timeout_ms: other.database.busy_timeout_ms.or(self.database.busy_timeout_ms),
            },
            twitter: TwitterSection {
                consumer_key: other.twitter.consumer_key.or(self.twitter.consumer_key),
                consumer_secret: other.twitter.consumer_secret.or(self.twitter.consumer_secret),
                api_base: other.twitter.api_base.or(self.twitter.api_base),
            },
        }
    }
}

/// Candidate config file locations, lowest precedence first
pub fn config_paths() -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/twack.toml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".twack.toml"));
    }
    paths.push(PathBuf::from("twack.toml"));
    paths
}

pub struct AppConfig {
    file: FileConfig,
    env: HashMap<String, String>,
}

impl AppConfig {
    /// Read the process environment and whichever config files exist.
    pub fn load() -> Result<Self> {
        let mut file = FileConfig::default();
        for path in config_paths() {
            if let Some(found) = read_file(&path)? {
                debug!(path = %path.display(), "read config file");
                file = file.merge(found);
            }
        }

        Ok(Self::from_parts(file, std::env::vars().collect()))
    }

    pub fn from_parts(file: FileConfig, env: HashMap<String, String>) -> Self {
        AppConfig { file, env }
    }

    fn param(&self, env_var: &str, file_value: &Option<String>) -> Option<String> {
        self.env
            .get(env_var)
            .filter(|v| !v.is_empty())
            .cloned()
            .or_else(|| file_value.clone())
    }

    fn required(&self, env_var: &str, section: &str, key: &str, file_value: &Option<String>) -> Result<String> {
        self.param(env_var, file_value).ok_or_else(|| {
            TwackError::Config(format!(
                "required configuration is missing: set the env-var '{}' or '{}.{}' in a config file",
                env_var, section, key
            ))
        })
    }

    pub fn database(&self) -> Result<DatabaseConfig> {
        let path = self
            .param("TWACK_DB_PATH", &self.file.database.path)
            .unwrap_or_else(|| DEFAULT_DB_PATH.to_string());

        let timeout_text = self.param(
            "TWACK_BUSY_TIMEOUT_MS",
            &self.file.database.busy_timeout_ms.map(|ms| ms.to_string()),
        );
        let busy_timeout_ms = match timeout_text {
            Some(text) => text.parse::<u64>().map_err(|_| {
                TwackError::Config(format!("busy timeout must be milliseconds, got '{}'", text))
            })?,
            None => DEFAULT_BUSY_TIMEOUT_MS,
        };

        Ok(DatabaseConfig {
            path: PathBuf::from(path),
            busy_timeout: Duration::from_millis(busy_timeout_ms),
        })
    }

    pub fn twitter(&self) -> Result<TwitterConfig> {
        let section = &self.file.twitter;
        Ok(TwitterConfig {
            consumer_key: self.required("TWITTER_CONSUMER_KEY", "twitter", "consumer_key", &section.consumer_key)?,
            consumer_secret: self.required(
                "TWITTER_CONSUMER_SECRET",
                "twitter",
                "consumer_secret",
                &section.consumer_secret,
            )?,
            api_base: self
                .param("TWITTER_API_BASE", &section.api_base)
                .map(|base| base.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
        })
    }
}

fn read_file(path: &Path) -> Result<Option<FileConfig>> {
    match std::fs::read_to_string(path) {
        Ok(text) => FileConfig::parse(&text)
            .map(Some)
            .map_err(|e| TwackError::Config(format!("{}: {}", path.display(), e))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TwackError::Config(format!("cannot read {}: {}", path.display(), e))),
    }
}
