//! Pipeline error taxonomy
//!
//! Every failure a notification can run into while being dispatched and
//! processed. None of them stops the consumer except [`PipelineError::Queue`].

use std::fmt;

use crate::store::StoreError;
use crate::tiff::TiffError;

/// Failure while dispatching or processing one notification
#[derive(Debug)]
pub enum PipelineError {
    /// Payload is not a JSON notification
    MalformedMessage(String),
    /// No metadata document for the identifier
    DocumentNotFound(String),
    /// No worker registered for the document type
    WorkerNotFound(String),
    /// The document does not have the shape the worker expects
    InvalidDocument { id: String, reason: String },
    /// The source raster could not be fetched or opened
    SourceDownloadFailure { path: String, reason: String },
    /// One band could not be read or written
    BandExtractionFailure { layer: String, band: usize, reason: String },
    /// One band output could not be uploaded
    UploadFailure { path: String, reason: String },
    /// Two workers claim the same type key
    DuplicateWorker(String),
    /// Metadata store or publisher failure
    Store(StoreError),
    /// The message queue failed; the consumer cannot continue
    Queue(String),
    /// Invalid configuration
    Config(String),
}

impl PipelineError {
    /// Whether redelivering the message could change the outcome
    ///
    /// Routing and content failures are permanent; only transient store
    /// failures qualify.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Whether the consumer loop has to stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Queue(_))
    }

    /// Short machine-readable name, used in audit records
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::MalformedMessage(_) => "MalformedMessage",
            PipelineError::DocumentNotFound(_) => "DocumentNotFound",
            PipelineError::WorkerNotFound(_) => "WorkerNotFound",
            PipelineError::InvalidDocument { .. } => "InvalidDocument",
            PipelineError::SourceDownloadFailure { .. } => "SourceDownloadFailure",
            PipelineError::BandExtractionFailure { .. } => "BandExtractionFailure",
            PipelineError::UploadFailure { .. } => "UploadFailure",
            PipelineError::DuplicateWorker(_) => "DuplicateWorker",
            PipelineError::Store(_) => "Store",
            PipelineError::Queue(_) => "Queue",
            PipelineError::Config(_) => "Config",
        }
    }

    /// Band failure caused by the raster layer
    pub fn band(layer: &str, band: usize, error: TiffError) -> Self {
        PipelineError::BandExtractionFailure {
            layer: layer.to_string(),
            band,
            reason: error.to_string(),
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::MalformedMessage(msg) => write!(f, "Malformed message: {}", msg),
            PipelineError::DocumentNotFound(id) => write!(f, "Document not found: {}", id),
            PipelineError::WorkerNotFound(kind) => write!(f, "No worker registered for type '{}'", kind),
            PipelineError::InvalidDocument { id, reason } => write!(f, "Invalid document {}: {}", id, reason),
            PipelineError::SourceDownloadFailure { path, reason } => {
                write!(f, "Failed to download source {}: {}", path, reason)
            }
            PipelineError::BandExtractionFailure { layer, band, reason } => {
                write!(f, "Failed to extract band {} ({}): {}", band, layer, reason)
            }
            PipelineError::UploadFailure { path, reason } => write!(f, "Failed to upload {}: {}", path, reason),
            PipelineError::DuplicateWorker(key) => write!(f, "Worker key '{}' registered twice", key),
            PipelineError::Store(e) => write!(f, "Store error: {}", e),
            PipelineError::Queue(msg) => write!(f, "Queue error: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PipelineError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for PipelineError {
    fn from(error: StoreError) -> Self {
        PipelineError::Store(error)
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn only_queue_errors_are_fatal() {
        assert!(PipelineError::Queue("closed".into()).is_fatal());
        assert!(!PipelineError::WorkerNotFound("x".into()).is_fatal());
        assert!(!PipelineError::DocumentNotFound("x".into()).is_fatal());
    }

    #[test]
    fn routing_failures_are_not_retryable() {
        assert!(!PipelineError::MalformedMessage("x".into()).is_retryable());
        assert!(!PipelineError::WorkerNotFound("x".into()).is_retryable());
        assert!(!PipelineError::DocumentNotFound("x".into()).is_retryable());
        assert!(!PipelineError::InvalidDocument { id: "x".into(), reason: "y".into() }.is_retryable());
    }

    #[test]
    fn only_transient_store_failures_are_retryable() {
        assert!(PipelineError::Store(StoreError::Timeout(Duration::from_secs(1))).is_retryable());
        assert!(PipelineError::Store(StoreError::Backend("503".into())).is_retryable());
        assert!(!PipelineError::Store(StoreError::NotFound("abc".into())).is_retryable());
        assert!(!PipelineError::Store(StoreError::Serialization("bad json".into())).is_retryable());
    }
}
