use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::{BackoffOptions, DEFAULT_RETRIES};

/// Invalid values in the `[retry]` section.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("retry.factor must be at least 1.0 (got {0})")]
    FactorBelowOne(f32),
    #[error("retry.min_delay_ms ({min}) exceeds retry.max_delay_ms ({max})")]
    DelayBoundsInverted { min: u64, max: u64 },
}

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of retries after the first attempt.
    pub retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub min_delay_ms: u64,
    /// Upper bound on any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays.
    pub factor: f32,
    /// Randomize delays.
    #[serde(default)]
    pub jitter: bool,
    /// Keep retrying with the last delay once the budget is spent.
    #[serde(default)]
    pub forever: bool,
    /// Give up once this many milliseconds have passed (None = no limit).
    #[serde(default)]
    pub max_retry_time_ms: Option<u64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let backoff = BackoffOptions::default();
        Self {
            retries: DEFAULT_RETRIES,
            min_delay_ms: backoff.min_delay.as_millis() as u64,
            max_delay_ms: backoff.max_delay.as_millis() as u64,
            factor: backoff.factor,
            jitter: backoff.jitter,
            forever: backoff.forever,
            max_retry_time_ms: None,
        }
    }
}

impl RetryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.factor < 1.0 {
            return Err(ConfigError::FactorBelowOne(self.factor));
        }
        if self.min_delay_ms > self.max_delay_ms {
            return Err(ConfigError::DelayBoundsInverted {
                min: self.min_delay_ms,
                max: self.max_delay_ms,
            });
        }
        Ok(())
    }
}

impl From<&RetryConfig> for BackoffOptions {
    fn from(cfg: &RetryConfig) -> Self {
        BackoffOptions {
            min_delay: Duration::from_millis(cfg.min_delay_ms),
            max_delay: Duration::from_millis(cfg.max_delay_ms),
            factor: cfg.factor,
            jitter: cfg.jitter,
            forever: cfg.forever,
            max_retry_time: cfg.max_retry_time_ms.map(Duration::from_millis),
        }
    }
}

/// Global configuration loaded from `~/.config/reattempt/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReattemptConfig {
    /// Exit codes that make `reattempt run` stop without retrying.
    #[serde(default)]
    pub fatal_exit_codes: Vec<i32>,
    /// Optional retry policy; if missing, built-in defaults are used.
    #[serde(default)]
    pub retry: Option<RetryConfig>,
}

impl ReattemptConfig {
    /// The `[retry]` section, or defaults when it is absent.
    pub fn retry_or_default(&self) -> RetryConfig {
        self.retry.clone().unwrap_or_default()
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("reattempt")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<ReattemptConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = ReattemptConfig {
            retry: Some(RetryConfig::default()),
            ..ReattemptConfig::default()
        };
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    load_from_path(&path)
}

/// Load and validate configuration from an explicit path.
pub fn load_from_path(path: &Path) -> Result<ReattemptConfig> {
    let data = fs::read_to_string(path)?;
    let cfg: ReattemptConfig = toml::from_str(&data)?;
    if let Some(retry) = &cfg.retry {
        retry.validate()?;
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn default_config_values() {
        let cfg = ReattemptConfig::default();
        assert!(cfg.fatal_exit_codes.is_empty());
        let retry = cfg.retry_or_default();
        assert_eq!(retry.retries, 10);
        assert_eq!(retry.min_delay_ms, 1000);
        assert_eq!(retry.max_delay_ms, 3_600_000);
        assert!((retry.factor - 2.0).abs() < 1e-6);
        assert!(retry.validate().is_ok());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = ReattemptConfig {
            fatal_exit_codes: vec![2, 127],
            retry: Some(RetryConfig::default()),
        };
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: ReattemptConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed, cfg);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            fatal_exit_codes = [2]

            [retry]
            retries = 3
            min_delay_ms = 250
            max_delay_ms = 5000
            factor = 1.5
            jitter = true
            max_retry_time_ms = 60000
        "#;
        let cfg: ReattemptConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.fatal_exit_codes, vec![2]);
        let retry = cfg.retry.as_ref().unwrap();
        assert_eq!(retry.retries, 3);
        assert!(retry.jitter);
        assert!(!retry.forever);

        let backoff = BackoffOptions::from(retry);
        assert_eq!(backoff.min_delay, Duration::from_millis(250));
        assert_eq!(backoff.max_delay, Duration::from_secs(5));
        assert_eq!(backoff.max_retry_time, Some(Duration::from_secs(60)));
    }

    #[test]
    fn missing_retry_section_uses_defaults() {
        let cfg: ReattemptConfig = toml::from_str("").unwrap();
        assert!(cfg.retry.is_none());
        assert_eq!(cfg.retry_or_default(), RetryConfig::default());
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut retry = RetryConfig {
            factor: 0.5,
            ..RetryConfig::default()
        };
        assert_eq!(retry.validate(), Err(ConfigError::FactorBelowOne(0.5)));
        retry.factor = 2.0;
        retry.min_delay_ms = 10_000;
        retry.max_delay_ms = 100;
        assert!(matches!(
            retry.validate(),
            Err(ConfigError::DelayBoundsInverted { min: 10_000, max: 100 })
        ));
    }

    #[test]
    fn load_from_path_validates() {
        let f = NamedTempFile::new().unwrap();
        fs::write(
            f.path(),
            "[retry]\nretries = 1\nmin_delay_ms = 10\nmax_delay_ms = 20\nfactor = 0.1\n",
        )
        .unwrap();
        let err = load_from_path(f.path()).unwrap_err();
        assert!(err.to_string().contains("retry.factor"));

        fs::write(
            f.path(),
            "[retry]\nretries = 1\nmin_delay_ms = 10\nmax_delay_ms = 20\nfactor = 3.0\n",
        )
        .unwrap();
        let cfg = load_from_path(f.path()).unwrap();
        assert_eq!(cfg.retry.unwrap().retries, 1);
    }
}
