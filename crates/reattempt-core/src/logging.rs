//! Logging init: file under XDG state dir, or graceful fallback to stderr.
//!
//! The file gets every attempt, delay and decision from the retry engine. The
//! stderr fallback shares the terminal with the CLI's own per-attempt lines,
//! so it only shows what the engine considers a problem.

use anyhow::Result;
use std::fs;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter override for reattempt; `RUST_LOG` is consulted when it is unset.
pub const LOG_ENV: &str = "REATTEMPT_LOG";

const FILE_DIRECTIVES: &str = "info,reattempt_core::retry=debug,reattempt::cli=debug";
const STDERR_DIRECTIVES: &str = "warn,reattempt_core::retry=error";

/// Writer that is either a file or stderr (used when file clone fails).
enum FileOrStderr {
    File(std::fs::File),
    Stderr,
}

impl io::Write for FileOrStderr {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            FileOrStderr::File(f) => f.write(buf),
            FileOrStderr::Stderr => io::stderr().lock().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            FileOrStderr::File(f) => f.flush(),
            FileOrStderr::Stderr => io::stderr().lock().flush(),
        }
    }
}

/// `~/.local/state/reattempt/reattempt.log`.
pub fn log_file_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("reattempt")?;
    Ok(xdg_dirs.get_state_home().join("reattempt.log"))
}

/// Initialize structured logging to [`log_file_path`].
/// On failure (e.g. log dir unwritable), returns Err so the caller can fall back to stderr.
pub fn init_logging() -> Result<()> {
    let log_file_path = log_file_path()?;
    if let Some(log_dir) = log_file_path.parent() {
        fs::create_dir_all(log_dir)?;
    }

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file_path)?;

    struct FileMakeWriter(std::fs::File);

    impl<'a> MakeWriter<'a> for FileMakeWriter {
        type Writer = FileOrStderr;

        fn make_writer(&'a self) -> Self::Writer {
            self.0
                .try_clone()
                .map(FileOrStderr::File)
                .unwrap_or(FileOrStderr::Stderr)
        }
    }

    let writer: BoxMakeWriter = BoxMakeWriter::new(FileMakeWriter(file));

    tracing_subscriber::fmt()
        .with_env_filter(filter(FILE_DIRECTIVES))
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("logging: {}", e))?;

    tracing::info!("reattempt logging initialized at {}", log_file_path.display());

    Ok(())
}

/// Initialize logging to stderr only. Use when `init_logging` fails.
/// A subscriber installed earlier is left in place.
pub fn init_logging_stderr() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter(STDERR_DIRECTIVES))
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .try_init();
}

/// `REATTEMPT_LOG`, then `RUST_LOG`, then `defaults`.
fn filter(defaults: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(defaults))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_directives_parse() {
        assert!(EnvFilter::try_new(FILE_DIRECTIVES).is_ok());
        assert!(EnvFilter::try_new(STDERR_DIRECTIVES).is_ok());
    }

    #[test]
    fn log_file_lives_under_reattempt_state_dir() {
        let path = log_file_path().unwrap();
        assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("reattempt.log"));
        assert!(path.parent().unwrap().ends_with("reattempt"));
    }
}

