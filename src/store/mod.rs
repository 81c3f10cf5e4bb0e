//! Collaborator interfaces: metadata lookup, object storage, publishing
//!
//! The pipeline only ever talks to these traits. In-memory implementations
//! back the tests; filesystem implementations back the CLI.

pub mod errors;
pub mod memory;
pub mod fs;

use async_trait::async_trait;

use crate::model::ProcessingDocument;

pub use errors::{StoreError, StoreResult};
pub use memory::{InMemoryMetadataStore, InMemoryObjectStore, StoredObject};
pub use fs::{FsMetadataStore, FsObjectStore, FsPublisher};

/// Content type for rasters without a better match
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Single-document lookup by primary key
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetches a document, `None` when there is none for `id`
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ProcessingDocument>>;
}

/// Named binary objects grouped in buckets
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetches a whole object
    async fn get_object(&self, bucket: &str, path: &str) -> StoreResult<Vec<u8>>;

    /// Stores an object, replacing any previous one at the same path
    async fn put_object(&self, bucket: &str, path: &str, data: Vec<u8>, content_type: &str) -> StoreResult<()>;
}

/// Outgoing messages (completion events, audit records)
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publishes one message to `topic`
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> StoreResult<()>;
}

/// Content type for a raster file extension
pub fn content_type_for(extension: &str) -> &'static str {
    match extension.to_ascii_lowercase().as_str() {
        "tif" | "tiff" => "image/tiff",
        _ => DEFAULT_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tiff_extensions_map_to_image_tiff() {
        assert_eq!(content_type_for("tif"), "image/tiff");
        assert_eq!(content_type_for("TIFF"), "image/tiff");
        assert_eq!(content_type_for("jp2"), DEFAULT_CONTENT_TYPE);
    }
}
