//! Messages and documents flowing through the pipeline

pub mod document;
pub mod notification;
pub mod multi_layer_tiff;
pub mod completion;
pub mod audit;

pub use document::ProcessingDocument;
pub use notification::NotificationEvent;
pub use multi_layer_tiff::{LayerSpec, MultiLayerTiff};
pub use completion::CompletionEvent;
pub use audit::{AuditRecord, AuditStatus};
