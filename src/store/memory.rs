//! In-memory stores (not persistent)
//!
//! Suitable for tests and local runs; everything is lost with the process.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{MetadataStore, ObjectStore, StoreError, StoreResult};
use crate::model::ProcessingDocument;

/// Documents keyed by identifier
#[derive(Debug, Default)]
pub struct InMemoryMetadataStore {
    documents: RwLock<HashMap<String, ProcessingDocument>>,
}

impl InMemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a document under its `_id`
    pub async fn insert(&self, document: Value) -> StoreResult<()> {
        let document = ProcessingDocument::from_value(document)
            .ok_or_else(|| StoreError::Serialization("document is not an object".to_string()))?;
        let id = document.id()
            .ok_or_else(|| StoreError::Serialization("document has no _id".to_string()))?
            .to_string();
        self.documents.write().await.insert(id, document);
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for InMemoryMetadataStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ProcessingDocument>> {
        Ok(self.documents.read().await.get(id).cloned())
    }
}

/// An object with its content type
#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

/// Objects keyed by bucket and path
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<BTreeMap<(String, String), StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns an object with its metadata
    pub async fn object(&self, bucket: &str, path: &str) -> Option<StoredObject> {
        self.objects.read().await.get(&(bucket.to_string(), path.to_string())).cloned()
    }

    /// Paths in `bucket`, sorted
    pub async fn paths(&self, bucket: &str) -> Vec<String> {
        self.objects
            .read()
            .await
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, path)| path.clone())
            .collect()
    }
}

#[async_trait]
impl ObjectStore for InMemoryObjectStore {
    async fn get_object(&self, bucket: &str, path: &str) -> StoreResult<Vec<u8>> {
        self.object(bucket, path)
            .await
            .map(|object| object.data)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", bucket, path)))
    }

    async fn put_object(&self, bucket: &str, path: &str, data: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.objects.write().await.insert(
            (bucket.to_string(), path.to_string()),
            StoredObject { data, content_type: content_type.to_string() },
        );
        Ok(())
    }
}
