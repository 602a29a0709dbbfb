//! Log output setup: stdout, a per-process log file, or both.
//!
//! The file is named after the process start time
//! (`app_<YYYY-mm-dd_HH-MM-SS>.log`) and opened in append mode.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, LoggingConfig};

/// Timestamp format used in log file names.
pub const LOG_FILE_TIME_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Where log lines go.
pub struct LogOutput {
    pub writer: BoxMakeWriter,
    /// The log file, if one was opened.
    pub file: Option<PathBuf>,
}

/// Create `dir` if needed and open a fresh `app_<timestamp>.log` in it.
pub fn open_log_file(dir: &Path) -> io::Result<(PathBuf, File)> {
    fs::create_dir_all(dir)?;
    let name = format!("app_{}.log", Local::now().format(LOG_FILE_TIME_FORMAT));
    let path = dir.join(name);
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    Ok((path, file))
}

pub fn make_writer(config: &LoggingConfig) -> io::Result<LogOutput> {
    let file = config.dir.as_deref().map(open_log_file).transpose()?;

    let output = match (file, config.console) {
        (Some((path, file)), true) => LogOutput {
            writer: BoxMakeWriter::new(io::stdout.and(Arc::new(file))),
            file: Some(path),
        },
        (Some((path, file)), false) => LogOutput {
            writer: BoxMakeWriter::new(Arc::new(file)),
            file: Some(path),
        },
        (None, true) => LogOutput {
            writer: BoxMakeWriter::new(io::stdout),
            file: None,
        },
        (None, false) => LogOutput {
            writer: BoxMakeWriter::new(io::sink),
            file: None,
        },
    };
    Ok(output)
}

/// Install the global subscriber. Returns the log file path, if any.
pub fn init(cli: &Cli, config: &LoggingConfig) -> io::Result<Option<PathBuf>> {
    let filter = if cli.verbose {
        "clf_serve=debug,tower_http=debug"
    } else {
        "clf_serve=info,tower_http=info"
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    let LogOutput { writer, file } = make_writer(config)?;

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(writer)
            .init();
    } else {
        // No escape codes in the file.
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_ansi(file.is_none())
            .with_writer(writer)
            .init();
    }
    Ok(file)
}
