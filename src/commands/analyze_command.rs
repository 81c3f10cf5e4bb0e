//! Raster structure analysis command
//!
//! Prints the profile the band extractor would work from, and with
//! `--verbose` every IFD of the file.

use clap::ArgMatches;
use log::{debug, info};
use std::path::PathBuf;

use crate::commands::command_traits::Command;
use crate::compression::CompressionFactory;
use crate::errors::{PipelineError, PipelineResult};
use crate::raster::RasterDataset;
use crate::tiff::TiffReader;

/// Command for analyzing a raster file
pub struct AnalyzeCommand {
    /// Path to the input file
    input_file: PathBuf,
    /// Whether to list every IFD
    verbose: bool,
}

impl AnalyzeCommand {
    /// Create a new analyze command
    ///
    /// # Arguments
    /// * `args` - `analyze` subcommand matches
    ///
    /// # Returns
    /// A new AnalyzeCommand instance or an error
    pub fn new(args: &ArgMatches) -> PipelineResult<Self> {
        let input_file = args.get_one::<String>("input")
            .ok_or_else(|| PipelineError::Config("Missing input file".to_string()))?;

        Ok(AnalyzeCommand {
            input_file: PathBuf::from(input_file),
            verbose: args.get_flag("verbose"),
        })
    }

    fn source_error(&self, error: impl ToString) -> PipelineError {
        PipelineError::SourceDownloadFailure {
            path: self.input_file.display().to_string(),
            reason: error.to_string(),
        }
    }
}

impl Command for AnalyzeCommand {
    fn execute(&self) -> PipelineResult<()> {
        info!("Analyzing raster file: {}", self.input_file.display());

        let dataset = RasterDataset::open(&self.input_file).map_err(|e| self.source_error(e))?;
        let profile = dataset.profile();
        print!("{}", profile);

        if CompressionFactory::is_supported(u64::from(profile.compression)) {
            println!("  Bands can be extracted");
        } else {
            println!("  Compression {} cannot be decoded; extraction would fail", profile.compression);
        }

        if self.verbose {
            let mut reader = TiffReader::new();
            let tiff = reader.load(&self.input_file).map_err(|e| self.source_error(e))?;
            debug!("Listing {} IFDs", tiff.ifd_count());
            println!("Byte order: {}", tiff.byte_order.name());
            for ifd in &tiff.ifds {
                print!("{}", ifd);
            }
        }

        Ok(())
    }
}
