//! `reattempt config` – show where the config and log live and what the config resolves to.

use anyhow::Result;
use reattempt_core::config::{self, ReattemptConfig};
use reattempt_core::logging;

pub fn run_config(cfg: &ReattemptConfig) -> Result<()> {
    println!("# config: {}", config::config_path()?.display());
    println!("# log: {}", logging::log_file_path()?.display());
    print!("{}", toml::to_string_pretty(&effective(cfg))?);
    Ok(())
}

/// The config as `run` sees it: a missing `[retry]` section is filled with defaults.
fn effective(cfg: &ReattemptConfig) -> ReattemptConfig {
    ReattemptConfig {
        retry: Some(cfg.retry_or_default()),
        ..cfg.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reattempt_core::config::RetryConfig;

    #[test]
    fn effective_fills_missing_retry_section() {
        let cfg = ReattemptConfig {
            fatal_exit_codes: vec![2],
            retry: None,
        };
        let out = effective(&cfg);
        assert_eq!(out.fatal_exit_codes, vec![2]);
        assert_eq!(out.retry, Some(RetryConfig::default()));
    }

    #[test]
    fn effective_keeps_configured_retry_section() {
        let retry = RetryConfig {
            retries: 3,
            ..RetryConfig::default()
        };
        let cfg = ReattemptConfig {
            fatal_exit_codes: vec![],
            retry: Some(retry.clone()),
        };
        assert_eq!(effective(&cfg).retry, Some(retry));
    }
}
