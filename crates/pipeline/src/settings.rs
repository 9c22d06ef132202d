use crate::enumerate::Extensions;
use crate::error::{ErrorKind, Result};
use crate::retry::RetryPolicy;
use ferry_config::TransferConfig;
use std::path::PathBuf;
use std::time::Duration;

/// Immutable transfer settings, shared by every component of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub base_prefix: String,
    pub extensions: Extensions,
    pub staging_dir: PathBuf,
    /// Applies to downloads and uploads, each with its own attempt counter.
    pub retry: RetryPolicy,
    pub chunk_size: usize,
    pub max_workers: usize,
}

impl Settings {
    /// Defaults matching [`TransferConfig::default()`], staged in `staging_dir`.
    pub fn new(staging_dir: impl Into<PathBuf>) -> Self {
        let defaults = TransferConfig::default();
        Self {
            base_prefix: defaults.base_prefix,
            extensions: Extensions::new(&defaults.extensions),
            staging_dir: staging_dir.into(),
            retry: RetryPolicy::new(
                defaults.max_retries,
                defaults.backoff_base,
                Duration::from_millis(defaults.backoff_unit_ms),
            ),
            chunk_size: defaults.chunk_size,
            max_workers: defaults.max_workers,
        }
    }

    pub fn with_base_prefix(mut self, base_prefix: impl Into<String>) -> Self {
        self.base_prefix = base_prefix.into();
        self
    }

    pub fn with_extensions(mut self, extensions: Extensions) -> Self {
        self.extensions = extensions;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_workers == 0 {
            exn::bail!(ErrorKind::Config("at least one worker is required".to_string()));
        }
        if self.chunk_size == 0 {
            exn::bail!(ErrorKind::Config("chunk size must be at least one byte".to_string()));
        }
        if self.extensions.is_empty() {
            exn::bail!(ErrorKind::Config("no leaf extension is allowed".to_string()));
        }
        if self.base_prefix.is_empty() {
            exn::bail!(ErrorKind::Config("base prefix must not be empty".to_string()));
        }
        Ok(())
    }
}

impl TryFrom<&TransferConfig> for Settings {
    type Error = crate::Error;

    fn try_from(config: &TransferConfig) -> Result<Self> {
        if config.max_retries == 0 {
            exn::bail!(ErrorKind::Config("at least one attempt is required".to_string()));
        }
        let settings = Self {
            base_prefix: config.base_prefix.clone(),
            extensions: Extensions::new(&config.extensions),
            staging_dir: config.staging_dir.clone(),
            retry: RetryPolicy::new(
                config.max_retries,
                config.backoff_base,
                Duration::from_millis(config.backoff_unit_ms),
            ),
            chunk_size: config.chunk_size,
            max_workers: config.max_workers,
        };
        settings.validate()?;
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_follow_transfer_config() {
        let settings = Settings::try_from(&TransferConfig::default()).unwrap();
        assert_eq!(settings, Settings::new("temp_download"));
        assert_eq!(settings.retry.max_attempts(), 5);
        assert_eq!(settings.retry.delay_after(1), Duration::from_secs(2));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = TransferConfig { max_workers: 0, ..TransferConfig::default() };
        let err = Settings::try_from(&config).unwrap_err();
        assert!(matches!(&*err, ErrorKind::Config(_)));

        let config = TransferConfig { max_retries: 0, ..TransferConfig::default() };
        assert!(Settings::try_from(&config).is_err());
    }
}
