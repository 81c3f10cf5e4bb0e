//! Logging setup
//!
//! Console logging goes through `env_logger`. When a log file is configured
//! the crate's own [`Logger`] writes every record to that file and echoes it
//! to stdout.

use log::{LevelFilter, Log, Metadata, Record};
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use crate::errors::{PipelineError, PipelineResult};

/// File logger
pub struct Logger {
    /// File handle for log output
    file: Mutex<File>,
    level: LevelFilter,
}

impl Logger {
    /// Creates a logger writing to `log_file`
    ///
    /// # Arguments
    ///
    /// * `log_file` - Path to the log file, truncated on open
    /// * `level` - Most verbose level written
    ///
    /// # Returns
    ///
    /// A new Logger instance or an error if the file cannot be created
    pub fn new(log_file: &Path, level: LevelFilter) -> io::Result<Self> {
        let file = File::create(log_file)?;
        Ok(Logger {
            file: Mutex::new(file),
            level,
        })
    }

    /// Writes one line to the log file
    pub fn write_line(&self, message: &str) -> io::Result<()> {
        let mut file = self.file
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "log file lock poisoned"))?;
        writeln!(file, "{}", message)?;
        file.flush()
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let message = format!("[{}] {}", record.level(), record.args());
            let _ = self.write_line(&message);

            // Also print to console
            println!("{}", message);
        }
    }

    fn flush(&self) {
        // Already flushing in write_line
    }
}

/// Parses a level name such as `info` or `debug`
pub fn parse_level(level: &str) -> PipelineResult<LevelFilter> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| PipelineError::Config(format!("unknown log level '{}'", level)))
}

/// Installs the global logger
///
/// # Arguments
/// * `level` - Default level; `RUST_LOG` still wins for console logging
/// * `file` - Log to this file instead of the console
pub fn init(level: &str, file: Option<&Path>) -> PipelineResult<()> {
    let filter = parse_level(level)?;

    match file {
        Some(path) => {
            let logger = Logger::new(path, filter)
                .map_err(|e| PipelineError::Config(format!("cannot open log file {}: {}", path.display(), e)))?;
            log::set_boxed_logger(Box::new(logger))
                .map_err(|e| PipelineError::Config(format!("logger already installed: {}", e)))?;
            log::set_max_level(filter);
        }
        None => {
            env_logger::Builder::new()
                .filter_level(filter)
                .parse_default_env()
                .try_init()
                .map_err(|e| PipelineError::Config(format!("logger already installed: {}", e)))?;
        }
    }
    Ok(())
}
