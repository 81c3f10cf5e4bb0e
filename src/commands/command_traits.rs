//! Command pattern interfaces
//!
//! This module defines the core Command pattern interfaces
//! for the CLI application.

use crate::config::LoggingConfig;
use crate::errors::PipelineResult;

/// Represents an executable command in the application
///
/// Command objects encapsulate the logic for a specific CLI operation.
/// Commands that drive the pipeline build their own async runtime.
pub trait Command {
    /// Execute the command
    ///
    /// # Returns
    /// Result indicating success or an error
    fn execute(&self) -> PipelineResult<()>;

    /// Logging settings the command brings along, if any
    fn logging(&self) -> Option<&LoggingConfig> {
        None
    }
}

/// Factory for creating commands from CLI arguments
pub trait CommandFactory {
    /// Create a new Command instance based on CLI arguments
    ///
    /// # Arguments
    /// * `args` - CLI argument matches from clap, including the subcommand
    ///
    /// # Returns
    /// A command that implements the Command trait, or an error
    fn create_command(&self, args: &clap::ArgMatches) -> PipelineResult<Box<dyn Command>>;
}

/// Multi-threaded runtime for commands that run the pipeline
pub(crate) fn runtime() -> PipelineResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| crate::errors::PipelineError::Config(format!("cannot start runtime: {}", e)))
}
