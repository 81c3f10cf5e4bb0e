//! Processing strategies selected by a document's type tag

pub mod registry;
pub mod multi_layer_tiff;

use async_trait::async_trait;

use crate::errors::{PipelineError, PipelineResult};
use crate::model::{CompletionEvent, ProcessingDocument};

pub use registry::WorkerRegistry;
pub use multi_layer_tiff::{ExtractorSettings, MultiLayerTiffWorker, MULTI_LAYER_TIFF_KEY};

/// A processing strategy for one kind of document
///
/// Workers are shared across concurrently dispatched documents and keep no
/// per-call state.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Type tag this worker handles
    fn key(&self) -> &str;

    /// Processes one document
    ///
    /// # Arguments
    /// * `id` - Document identifier
    /// * `document` - The document without its type tag
    async fn process(&self, id: &str, document: ProcessingDocument) -> PipelineResult<ProcessingReport>;
}

/// Result of producing one output object
#[derive(Debug)]
pub struct OutputRecord {
    /// 1-based band index in the source
    pub band: usize,
    /// Declared layer name
    pub layer: String,
    /// Destination object path
    pub object_path: String,
    /// Uploaded size, or why the output was not produced
    pub result: PipelineResult<u64>,
}

impl OutputRecord {
    pub fn succeeded(&self) -> bool {
        self.result.is_ok()
    }

    pub fn error(&self) -> Option<&PipelineError> {
        self.result.as_ref().err()
    }
}

/// Per-document summary returned by a worker
#[derive(Debug)]
pub struct ProcessingReport {
    pub id: String,
    pub outputs: Vec<OutputRecord>,
    /// Source bands beyond the declared layers
    pub skipped_bands: usize,
    /// Event to publish once outputs are available
    pub completion: Option<CompletionEvent>,
}

impl ProcessingReport {
    /// Report for a document with nothing to produce
    pub fn empty(id: &str) -> Self {
        ProcessingReport {
            id: id.to_string(),
            outputs: Vec::new(),
            skipped_bands: 0,
            completion: None,
        }
    }

    /// Paths of outputs that were uploaded
    pub fn materialized(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .filter(|output| output.succeeded())
            .map(|output| output.object_path.as_str())
            .collect()
    }

    /// Outputs that failed
    pub fn failures(&self) -> Vec<&OutputRecord> {
        self.outputs.iter().filter(|output| !output.succeeded()).collect()
    }

    /// Whether every attempted output was produced
    pub fn is_complete(&self) -> bool {
        self.outputs.iter().all(OutputRecord::succeeded)
    }
}
