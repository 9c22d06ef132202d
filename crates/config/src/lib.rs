//! Configuration loading and validation.
//!
//! Values are layered with `figment`, later layers winning:
//!
//! 1. built-in defaults (the `[transfer]` table only),
//! 2. a config file (TOML, YAML or JSON, picked by extension),
//! 3. environment variables prefixed `FERRY_`, with `__` separating nested
//!    keys (`FERRY_TRANSFER__MAX_WORKERS=4`).
//!
//! # Examples
//!
//! ```toml
//! [source]
//! kind = "drive"
//! root_folder_id = "10j7Z3ySuFNgzVwEXE16TDXWBWHNh8UO2"
//! access_token = "ya29..."
//!
//! [destination]
//! kind = "s3"
//! bucket = "kinetics-600"
//! region = "us-east-1"
//! key_id = "AKIA..."
//! key_secret = "..."
//!
//! [transfer]
//! max_workers = 4
//! ```

pub mod error;

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Toml, Yaml};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};

pub const ENV_PREFIX: &str = "FERRY_";
pub const DEFAULT_FILE_NAME: &str = "ferry.toml";

/// Where media items are read from.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A Google Drive folder, accessed with an already issued OAuth token.
    Drive {
        root_folder_id: String,
        access_token: String,
        #[serde(default = "default_timeout_secs")]
        timeout_secs: u64,
    },
    /// A directory on disk.
    Local { root: PathBuf },
}

/// Where media items are uploaded to.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum DestinationConfig {
    /// Any S3-compatible object store.
    S3 {
        bucket: String,
        region: String,
        /// Custom endpoint for non-AWS stores (MinIO, R2, ...).
        #[serde(default)]
        endpoint: Option<String>,
        key_id: String,
        key_secret: String,
    },
    /// A directory on disk, mostly useful for dry runs.
    Local { root: PathBuf },
}

const REDACTED: &str = "<redacted>";

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Drive { root_folder_id, access_token: _, timeout_secs } => f
                .debug_struct("Drive")
                .field("root_folder_id", root_folder_id)
                .field("access_token", &REDACTED)
                .field("timeout_secs", timeout_secs)
                .finish(),
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
        }
    }
}

impl fmt::Debug for DestinationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::S3 { bucket, region, endpoint, key_id, key_secret: _ } => f
                .debug_struct("S3")
                .field("bucket", bucket)
                .field("region", region)
                .field("endpoint", endpoint)
                .field("key_id", key_id)
                .field("key_secret", &REDACTED)
                .finish(),
            Self::Local { root } => f.debug_struct("Local").field("root", root).finish(),
        }
    }
}

/// Tunables of the transfer itself.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Fixed prefix of every destination key.
    pub base_prefix: String,
    /// Allowed leaf extensions, lowercase without the dot.
    pub extensions: Vec<String>,
    /// Local directory for in-flight downloads.
    pub staging_dir: PathBuf,
    /// Attempts per download and per upload (not retries on top of one).
    pub max_retries: u32,
    pub backoff_base: u32,
    pub backoff_unit_ms: u64,
    /// Size of each ranged read and of the staging write buffer, in bytes.
    pub chunk_size: usize,
    pub max_workers: usize,
    /// Capacity of the progress event channel.
    pub event_buffer: usize,
}
impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            base_prefix: "labels".to_string(),
            // Sorted, the same form `Config::normalize` produces.
            extensions: ["avi", "mkv", "mov", "mp4"].into_iter().map(String::from).collect(),
            staging_dir: PathBuf::from("temp_download"),
            max_retries: 5,
            backoff_base: 2,
            backoff_unit_ms: 1000,
            chunk_size: 1024 * 1024,
            max_workers: 2,
            event_buffer: 1024,
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load, normalise and validate the configuration.
    ///
    /// With no explicit `path`, `ferry.toml` in the platform config directory
    /// is used if it exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_figment(Self::figment(path)?)
    }

    /// The layered figment, before extraction. Callers can merge further
    /// providers (command line overrides) on top.
    pub fn figment(path: Option<&Path>) -> Result<Figment> {
        let mut figment = Figment::new();
        match path {
            Some(path) => {
                if !path.is_file() {
                    exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
                }
                figment = Self::merge_file(figment, path)?;
            },
            None => match default_path() {
                Some(path) if path.is_file() => {
                    tracing::debug!(path = %path.display(), "Using default config file");
                    figment = Self::merge_file(figment, &path)?;
                },
                _ => tracing::debug!("No config file, using environment only"),
            },
        }
        Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
    }

    /// Extract a config from an arbitrary figment.
    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut config: Self = figment.extract().or_raise(|| ErrorKind::Parse)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    fn merge_file(figment: Figment, path: &Path) -> Result<Figment> {
        let extension = path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase);
        Ok(match extension.as_deref() {
            Some("toml") => figment.merge(Toml::file(path)),
            Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
            Some("json") => figment.merge(Json::file(path)),
            _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
        })
    }

    fn normalize(&mut self) {
        let transfer = &mut self.transfer;
        transfer.extensions = transfer
            .extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_ascii_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        transfer.extensions.sort();
        transfer.extensions.dedup();
        transfer.base_prefix = transfer.base_prefix.trim_matches('/').to_string();
    }

    /// Reject values the transfer cannot run with.
    pub fn validate(&self) -> Result<()> {
        let transfer = &self.transfer;
        let problem = if transfer.max_retries == 0 {
            Some("transfer.max_retries must be at least 1")
        } else if transfer.max_workers == 0 {
            Some("transfer.max_workers must be at least 1")
        } else if transfer.chunk_size == 0 {
            Some("transfer.chunk_size must be at least 1")
        } else if transfer.backoff_base == 0 {
            Some("transfer.backoff_base must be at least 1")
        } else if transfer.event_buffer == 0 {
            Some("transfer.event_buffer must be at least 1")
        } else if transfer.extensions.is_empty() {
            Some("transfer.extensions must not be empty")
        } else if transfer.base_prefix.is_empty() {
            Some("transfer.base_prefix must not be empty")
        } else {
            None
        };
        if let Some(problem) = problem {
            exn::bail!(ErrorKind::Invalid(problem.to_string()));
        }
        if let SourceConfig::Drive { root_folder_id, .. } = &self.source
            && root_folder_id.is_empty()
        {
            exn::bail!(ErrorKind::Invalid("source.root_folder_id must not be empty".to_string()));
        }
        if let DestinationConfig::S3 { bucket, .. } = &self.destination
            && bucket.is_empty()
        {
            exn::bail!(ErrorKind::Invalid("destination.bucket must not be empty".to_string()));
        }
        Ok(())
    }
}

/// `ferry.toml` inside the platform-specific config directory, if the
/// platform has one.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "ferry").map(|dirs| dirs.config_dir().join(DEFAULT_FILE_NAME))
}
