//! `reattempt run` – run a program until it exits successfully.

use anyhow::{Context, Result};
use reattempt_core::config::RetryConfig;
use reattempt_core::retry::{retry, BackoffOptions, CancelSignal, Failure, RetryOptions};
use std::io;
use std::process::ExitStatus;
use std::time::Instant;
use tokio::process::Command;

/// Environment variable carrying the 1-based attempt number to the child.
pub const ATTEMPT_ENV: &str = "REATTEMPT_ATTEMPT";

/// Why a single run of the program failed.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} exited with code {code}")]
    Exit { program: String, code: i32 },
    #[error("{program} was terminated by a signal")]
    Signalled { program: String },
}

pub async fn run_command(command: &[String], retry_cfg: &RetryConfig, fatal: &[i32]) -> Result<()> {
    let (program, args) = command.split_first().context("no program given")?;

    let signal = CancelSignal::new();
    let ctrl_c = {
        let signal = signal.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                signal.cancel("interrupted by Ctrl-C");
            }
        })
    };

    let options = RetryOptions::new()
        .retries(retry_cfg.retries)
        .backoff(BackoffOptions::from(retry_cfg))
        .signal(signal)
        .on_failed_attempt(|record| {
            tracing::warn!(
                attempt = record.attempt_number(),
                retries_left = record.retries_left(),
                error = %record.cause(),
                "command failed"
            );
            eprintln!(
                "attempt {} failed: {} ({} retries left)",
                record.attempt_number(),
                record.cause(),
                record.retries_left()
            );
            Ok(())
        });

    let started = Instant::now();
    let outcome = retry(|attempt| run_attempt(program, args, attempt, fatal), options).await;
    ctrl_c.abort();

    match outcome {
        Ok(()) => {
            tracing::info!(
                program = %program,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "command succeeded"
            );
            Ok(())
        }
        Err(err) => {
            let attempts = err
                .attempt_number()
                .map(|n| format!(" after {} attempt(s)", n))
                .unwrap_or_default();
            Err(anyhow::Error::new(err).context(format!("giving up on {}{}", program, attempts)))
        }
    }
}

/// One run of the program. The child is killed if the session is cancelled mid-run.
async fn run_attempt(
    program: &str,
    args: &[String],
    attempt: u32,
    fatal: &[i32],
) -> Result<(), Failure<CommandError>> {
    tracing::debug!(program, attempt, "spawning");
    let status = Command::new(program)
        .args(args)
        .env(ATTEMPT_ENV, attempt.to_string())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| spawn_failure(program, e))?;
    exit_failure(program, status, fatal)
}

/// A program that cannot be found or executed will not start on a later attempt either.
fn spawn_failure(program: &str, source: io::Error) -> Failure<CommandError> {
    let kind = source.kind();
    let err = CommandError::Spawn {
        program: program.to_string(),
        source,
    };
    match kind {
        io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => Failure::type_error(err),
        _ => Failure::Error(err),
    }
}

fn exit_failure(
    program: &str,
    status: ExitStatus,
    fatal: &[i32],
) -> Result<(), Failure<CommandError>> {
    if status.success() {
        return Ok(());
    }
    let program = program.to_string();
    match status.code() {
        Some(code) if fatal.contains(&code) => {
            Err(Failure::abort(CommandError::Exit { program, code }))
        }
        Some(code) => Err(Failure::Error(CommandError::Exit { program, code })),
        None => Err(Failure::Error(CommandError::Signalled { program })),
    }
}
