//! CLI for the reattempt command runner.

mod commands;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use reattempt_core::config::{self, RetryConfig};

use commands::{run_command, run_config};

/// Top-level CLI for reattempt.
#[derive(Debug, Parser)]
#[command(name = "reattempt")]
#[command(
    about = "reattempt: run a command until it succeeds, backing off between attempts",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Run a program, retrying it until it exits with status 0.
    Run {
        #[command(flatten)]
        policy: PolicyArgs,

        /// Exit code that stops retrying immediately. Repeatable; adds to the
        /// config's `fatal_exit_codes`.
        #[arg(long = "fatal-exit-code", value_name = "CODE", allow_negative_numbers = true)]
        fatal_exit_codes: Vec<i32>,

        /// Program to run, followed by its arguments (use `--` before them).
        #[arg(
            required = true,
            trailing_var_arg = true,
            allow_hyphen_values = true,
            value_name = "PROGRAM"
        )]
        command: Vec<String>,
    },

    /// Show the config file path and the effective retry settings.
    Config,
}

/// Retry policy flags. Each one that is set overrides the `[retry]` section of config.toml.
#[derive(Debug, Default, Args)]
pub struct PolicyArgs {
    /// Retries after the first attempt.
    #[arg(long, value_name = "N")]
    pub retries: Option<u32>,
    /// Delay before the first retry.
    #[arg(long, value_name = "MS")]
    pub min_delay_ms: Option<u64>,
    /// Upper bound on any single delay.
    #[arg(long, value_name = "MS")]
    pub max_delay_ms: Option<u64>,
    /// Growth factor between consecutive delays.
    #[arg(long, value_name = "F")]
    pub factor: Option<f32>,
    /// Randomize delays.
    #[arg(long)]
    pub jitter: bool,
    /// Keep retrying with the last delay after the budget is spent.
    #[arg(long)]
    pub forever: bool,
    /// Stop retrying once this much time has passed since the first attempt.
    #[arg(long, value_name = "MS")]
    pub max_retry_time_ms: Option<u64>,
}

impl PolicyArgs {
    /// Layer the flags over `base` (usually the config file values).
    pub fn apply(&self, base: RetryConfig) -> RetryConfig {
        RetryConfig {
            retries: self.retries.unwrap_or(base.retries),
            min_delay_ms: self.min_delay_ms.unwrap_or(base.min_delay_ms),
            max_delay_ms: self.max_delay_ms.unwrap_or(base.max_delay_ms),
            factor: self.factor.unwrap_or(base.factor),
            jitter: self.jitter || base.jitter,
            forever: self.forever || base.forever,
            max_retry_time_ms: self.max_retry_time_ms.or(base.max_retry_time_ms),
        }
    }
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();
        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);

        match cli.command {
            CliCommand::Run {
                policy,
                fatal_exit_codes,
                command,
            } => {
                let retry_cfg = policy.apply(cfg.retry_or_default());
                retry_cfg.validate()?;
                let mut fatal = cfg.fatal_exit_codes.clone();
                fatal.extend(fatal_exit_codes);
                run_command(&command, &retry_cfg, &fatal).await?;
            }
            CliCommand::Config => run_config(&cfg)?,
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests;
