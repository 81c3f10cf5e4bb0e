//! Raster band extractor
//!
//! Splits a multi-band GeoTIFF into one single-band GeoTIFF per declared
//! layer. Per document: download the source to a scratch file, read its
//! profile, then for each band in order extract, write and upload it.
//! A band that fails is recorded and the next band still runs; only a
//! failed download (or an unreadable source) aborts the document.

use async_trait::async_trait;
use log::{debug, error, info, warn};
use std::future::Future;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::task;
use tokio::time::timeout;

use super::{OutputRecord, ProcessingReport, Worker};
use crate::errors::{PipelineError, PipelineResult};
use crate::model::{CompletionEvent, MultiLayerTiff, ProcessingDocument};
use crate::raster::{write_single_band, RasterDataset, RasterProfile};
use crate::store::{content_type_for, ObjectStore, StoreError, StoreResult};

/// Type tag handled by this worker
pub const MULTI_LAYER_TIFF_KEY: &str = "MultiLayerTiff";

/// Where the extractor reads from and writes to
#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub bucket: String,
    /// Folder holding uploaded sources, `new` by default
    pub source_prefix: String,
    /// Folder receiving band outputs, `converted` by default
    pub output_prefix: String,
    /// Directory for scratch files
    pub work_dir: PathBuf,
    /// Bound on each download and upload
    pub io_timeout: Duration,
}

impl ExtractorSettings {
    /// Object path of the uploaded source
    pub fn source_path(&self, id: &str, extension: &str) -> String {
        format!("{}/{}.{}", self.source_prefix, id, extension)
    }

    /// Object path of one band output
    pub fn output_path(&self, id: &str, layer: &str, extension: &str) -> String {
        format!("{}/{}-{}.{}", self.output_prefix, id, layer, extension)
    }
}

/// Worker for `MultiLayerTiff` documents
pub struct MultiLayerTiffWorker {
    store: Arc<dyn ObjectStore>,
    settings: ExtractorSettings,
}

impl MultiLayerTiffWorker {
    pub fn new(store: Arc<dyn ObjectStore>, settings: ExtractorSettings) -> Self {
        MultiLayerTiffWorker { store, settings }
    }

    pub fn settings(&self) -> &ExtractorSettings {
        &self.settings
    }

    /// Runs an object-store call under the configured timeout
    async fn bounded<T>(&self, operation: impl Future<Output = StoreResult<T>>) -> StoreResult<T> {
        match timeout(self.settings.io_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.settings.io_timeout)),
        }
    }

    /// Downloads the source into a scratch file and reads its profile
    async fn fetch_source(&self, id: &str, source_path: &str, extension: &str) -> PipelineResult<(NamedTempFile, RasterProfile)> {
        let download_failure = |reason: String| PipelineError::SourceDownloadFailure {
            path: source_path.to_string(),
            reason,
        };

        info!("Downloading {} for document {}", source_path, id);
        let bytes = self
            .bounded(self.store.get_object(&self.settings.bucket, source_path))
            .await
            .map_err(|e| download_failure(e.to_string()))?;

        let work_dir = self.settings.work_dir.clone();
        let suffix = format!(".{}", extension);
        let staged = task::spawn_blocking(move || -> Result<(NamedTempFile, RasterProfile), String> {
            let mut scratch = tempfile::Builder::new()
                .prefix("bandsplit-src-")
                .suffix(&suffix)
                .tempfile_in(&work_dir)
                .map_err(|e| format!("cannot create scratch file: {}", e))?;
            scratch.write_all(&bytes).map_err(|e| format!("cannot stage source: {}", e))?;
            scratch.flush().map_err(|e| format!("cannot stage source: {}", e))?;

            let dataset = RasterDataset::open(scratch.path())
                .map_err(|e| format!("cannot open raster: {}", e))?;
            let profile = dataset.profile().clone();
            Ok((scratch, profile))
        })
        .await
        .map_err(|e| download_failure(format!("staging task failed: {}", e)))?;

        staged.map_err(download_failure)
    }

    /// Extracts, writes and uploads one band
    async fn process_band(
        &self,
        source: &Path,
        profile: &RasterProfile,
        band: usize,
        layer: &str,
        object_path: &str,
        extension: &str,
    ) -> PipelineResult<u64> {
        info!("Extracting band {} as '{}'", band, layer);

        let source = source.to_path_buf();
        let single_band = profile.single_band();
        let work_dir = self.settings.work_dir.clone();
        let suffix = format!(".{}", extension);
        let layer_name = layer.to_string();

        let encoded = task::spawn_blocking(move || -> PipelineResult<Vec<u8>> {
            let mut dataset = RasterDataset::open(&source).map_err(|e| PipelineError::band(&layer_name, band, e))?;
            let data = dataset.read_band(band).map_err(|e| PipelineError::band(&layer_name, band, e))?;

            // Dropped on every path out of this closure, which removes the file
            let output = tempfile::Builder::new()
                .prefix("bandsplit-band-")
                .suffix(&suffix)
                .tempfile_in(&work_dir)
                .map_err(|e| PipelineError::band(&layer_name, band, e.into()))?;
            write_single_band(output.path(), &single_band, &data)
                .map_err(|e| PipelineError::band(&layer_name, band, e))?;
            std::fs::read(output.path()).map_err(|e| PipelineError::band(&layer_name, band, e.into()))
        })
        .await
        .map_err(|e| PipelineError::BandExtractionFailure {
            layer: layer.to_string(),
            band,
            reason: format!("extraction task failed: {}", e),
        })??;

        let size = encoded.len() as u64;
        self.bounded(self.store.put_object(
            &self.settings.bucket,
            object_path,
            encoded,
            content_type_for(extension),
        ))
        .await
        .map_err(|e| PipelineError::UploadFailure {
            path: object_path.to_string(),
            reason: e.to_string(),
        })?;

        info!("Uploaded {} ({} bytes)", object_path, size);
        Ok(size)
    }
}

#[async_trait]
impl Worker for MultiLayerTiffWorker {
    fn key(&self) -> &str {
        MULTI_LAYER_TIFF_KEY
    }

    async fn process(&self, id: &str, document: ProcessingDocument) -> PipelineResult<ProcessingReport> {
        let request = MultiLayerTiff::from_document(id, &document)?;
        let extension = request.photo_extension.clone();
        let source_path = self.settings.source_path(id, &extension);

        let (scratch, profile) = match self.fetch_source(id, &source_path, &extension).await {
            Ok(staged) => staged,
            Err(e) => {
                error!("Aborting document {}: {}", id, e);
                return Err(e);
            }
        };

        let band_count = profile.band_count;
        let layer_count = request.layers.len();
        let selected = band_count.min(layer_count);
        info!("Found {} bands, {} layers declared; extracting {}", band_count, layer_count, selected);
        if layer_count > band_count {
            warn!("Layers {:?} have no matching band", &request.layer_names()[band_count..]);
        }

        let mut report = ProcessingReport::empty(id);
        report.skipped_bands = band_count.saturating_sub(layer_count);

        for (index, layer) in request.layers.iter().take(selected).enumerate() {
            let band = index + 1;
            if let Some(declared) = layer.declared_index() {
                debug!("Layer '{}' declares index {}, using band {}", layer.name(), declared, band);
            }

            let object_path = self.settings.output_path(id, layer.name(), &extension);
            let result = self
                .process_band(scratch.path(), &profile, band, layer.name(), &object_path, &extension)
                .await;
            if let Err(e) = &result {
                error!("Band {} ('{}') of {} failed: {}", band, layer.name(), id, e);
            }

            report.outputs.push(OutputRecord {
                band,
                layer: layer.name().to_string(),
                object_path,
                result,
            });
        }

        drop(scratch);
        debug!("Released source scratch file for {}", id);

        if !report.materialized().is_empty() {
            if let (Some(contour_id), Some(date)) = (&request.contour_id, request.date) {
                report.completion = Some(CompletionEvent {
                    photo_id: id.to_string(),
                    contour_id: contour_id.clone(),
                    date,
                    extension: extension.clone(),
                });
            }
        }

        info!("Document {} done: {} of {} outputs produced", id, report.materialized().len(), report.outputs.len());
        Ok(report)
    }
}
