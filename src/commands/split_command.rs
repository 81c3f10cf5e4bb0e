//! Local band split command
//!
//! Runs the band extractor on one file with filesystem stores: the source is
//! staged under `{output-dir}/{bucket}/new/` and the bands land in
//! `{output-dir}/{bucket}/converted/`.

use clap::ArgMatches;
use log::info;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::commands::command_traits::{runtime, Command};
use crate::config::AppConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::model::ProcessingDocument;
use crate::store::{content_type_for, FsObjectStore, ObjectStore};
use crate::worker::{MultiLayerTiffWorker, ProcessingReport, Worker};

/// Command splitting a local multi-band file into per-layer files
pub struct SplitCommand {
    input_file: PathBuf,
    layers: Vec<String>,
    output_dir: PathBuf,
    id: String,
    extension: String,
}

impl SplitCommand {
    /// Create a new split command
    ///
    /// # Arguments
    /// * `args` - `split` subcommand matches
    ///
    /// # Returns
    /// A new SplitCommand instance or an error
    pub fn new(args: &ArgMatches) -> PipelineResult<Self> {
        let input_file = PathBuf::from(args.get_one::<String>("input")
            .ok_or_else(|| PipelineError::Config("Missing input file".to_string()))?);

        let layers: Vec<String> = args.get_one::<String>("layers")
            .map(|list| parse_layers(list))
            .unwrap_or_default();
        if layers.is_empty() {
            return Err(PipelineError::Config("--layers needs at least one name".to_string()));
        }

        let output_dir = PathBuf::from(args.get_one::<String>("output-dir")
            .ok_or_else(|| PipelineError::Config("Missing --output-dir".to_string()))?);

        let id = match args.get_one::<String>("id") {
            Some(id) => id.clone(),
            None => file_stem(&input_file)?,
        };
        let extension = input_file.extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("tif")
            .to_string();

        Ok(SplitCommand { input_file, layers, output_dir, id, extension })
    }

    fn print_report(&self, report: &ProcessingReport) {
        println!("Split {} into {} of {} layers", self.id, report.materialized().len(), report.outputs.len());
        for output in &report.outputs {
            match &output.result {
                Ok(size) => println!("  band {} -> {} ({} bytes)", output.band, output.object_path, size),
                Err(e) => println!("  band {} -> {} FAILED: {}", output.band, output.object_path, e),
            }
        }
        if report.skipped_bands > 0 {
            println!("  {} source bands had no layer and were skipped", report.skipped_bands);
        }
    }
}

impl Command for SplitCommand {
    fn execute(&self) -> PipelineResult<()> {
        let mut config = AppConfig::default();
        config.object_store.root = self.output_dir.clone();
        let settings = config.extractor_settings();

        info!("Splitting {} as '{}' into layers {:?}", self.input_file.display(), self.id, self.layers);

        let data = std::fs::read(&self.input_file).map_err(|e| PipelineError::SourceDownloadFailure {
            path: self.input_file.display().to_string(),
            reason: e.to_string(),
        })?;
        let document = ProcessingDocument::from_value(json!({
            "_id": self.id,
            "photoExtension": self.extension,
            "layers": self.layers,
        }))
        .ok_or_else(|| PipelineError::Config("cannot build document".to_string()))?;

        let report = runtime()?.block_on(async {
            let store = Arc::new(FsObjectStore::new(&self.output_dir));
            let source_path = settings.source_path(&self.id, &self.extension);
            store.put_object(&settings.bucket, &source_path, data, content_type_for(&self.extension)).await?;

            let worker = MultiLayerTiffWorker::new(store, settings.clone());
            worker.process(&self.id, document).await
        })?;

        self.print_report(&report);
        Ok(())
    }
}

/// Comma-separated layer names, blanks dropped
pub fn parse_layers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

fn file_stem(path: &Path) -> PipelineResult<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| PipelineError::Config(format!("cannot derive an id from {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layer_lists_ignore_blanks() {
        assert_eq!(parse_layers("red, nir,,green "), vec!["red", "nir", "green"]);
        assert!(parse_layers(" , ").is_empty());
    }

    #[test]
    fn id_defaults_to_file_stem() {
        assert_eq!(file_stem(Path::new("/data/abc.tif")).unwrap(), "abc");
    }
}
