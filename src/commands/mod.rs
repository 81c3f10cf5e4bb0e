//! CLI command implementations
//!
//! This module contains implementations of the commands
//! supported by the CLI application using the Command pattern.

pub mod command_traits;
pub mod analyze_command;
pub mod split_command;
pub mod serve_command;

pub use command_traits::{Command, CommandFactory};
pub use analyze_command::AnalyzeCommand;
pub use split_command::SplitCommand;
pub use serve_command::ServeCommand;

use clap::ArgMatches;
use crate::errors::{PipelineError, PipelineResult};

/// Factory for creating command instances based on CLI arguments
///
/// Picks the command from the subcommand clap matched.
#[derive(Default)]
pub struct BandsplitCommandFactory;

impl BandsplitCommandFactory {
    /// Create a new factory instance
    pub fn new() -> Self {
        BandsplitCommandFactory
    }
}

impl CommandFactory for BandsplitCommandFactory {
    fn create_command(&self, args: &ArgMatches) -> PipelineResult<Box<dyn Command>> {
        match args.subcommand() {
            Some(("analyze", sub)) => Ok(Box::new(AnalyzeCommand::new(sub)?)),
            Some(("split", sub)) => Ok(Box::new(SplitCommand::new(sub)?)),
            Some(("serve", sub)) => Ok(Box::new(ServeCommand::new(sub)?)),
            Some((other, _)) => Err(PipelineError::Config(format!("Unknown command: {}", other))),
            None => Err(PipelineError::Config("No command given".to_string())),
        }
    }
}
