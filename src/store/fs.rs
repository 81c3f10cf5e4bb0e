//! Filesystem-backed stores used by the command line
//!
//! Layouts:
//! - metadata documents: `{root}/{id}.json`
//! - objects: `{root}/{bucket}/{path}`
//! - published messages: one JSON line per message in `{root}/{topic}.jsonl`

use async_trait::async_trait;
use log::{debug, trace};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::{MessagePublisher, MetadataStore, ObjectStore, StoreError, StoreResult};
use crate::model::ProcessingDocument;

/// Joins `relative` onto `root`, refusing anything that could leave `root`
fn confined(root: &Path, relative: &str) -> StoreResult<PathBuf> {
    let relative_path = Path::new(relative);
    let clean = !relative.is_empty()
        && relative_path.components().all(|c| matches!(c, Component::Normal(_)));
    if !clean {
        return Err(StoreError::InvalidPath(relative.to_string()));
    }
    Ok(root.join(relative_path))
}

/// Metadata documents stored as JSON files
#[derive(Debug, Clone)]
pub struct FsMetadataStore {
    root: PathBuf,
}

impl FsMetadataStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsMetadataStore { root: root.into() }
    }

    /// Writes a document to `{root}/{_id}.json`
    pub async fn insert(&self, document: &ProcessingDocument) -> StoreResult<()> {
        let id = document.id()
            .ok_or_else(|| StoreError::Serialization("document has no _id".to_string()))?;
        let path = confined(&self.root, &format!("{}.json", id))?;
        fs::create_dir_all(&self.root).await?;
        let body = serde_json::to_vec_pretty(document.fields())?;
        fs::write(&path, body).await?;
        Ok(())
    }
}

#[async_trait]
impl MetadataStore for FsMetadataStore {
    async fn find_by_id(&self, id: &str) -> StoreResult<Option<ProcessingDocument>> {
        // An id that cannot name a file cannot name a document either
        let path = match confined(&self.root, &format!("{}.json", id)) {
            Ok(path) if !id.contains('/') => path,
            _ => return Ok(None),
        };

        let body = match fs::read(&path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        trace!("Read document {} from {}", id, path.display());

        let value: serde_json::Value = serde_json::from_slice(&body)?;
        ProcessingDocument::from_value(value)
            .map(Some)
            .ok_or_else(|| StoreError::Serialization(format!("{} is not a JSON object", path.display())))
    }
}

/// Objects stored as plain files, one directory per bucket
#[derive(Debug)]
pub struct FsObjectStore {
    root: PathBuf,
    sequence: AtomicU64,
}

impl FsObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsObjectStore { root: root.into(), sequence: AtomicU64::new(0) }
    }

    fn object_path(&self, bucket: &str, path: &str) -> StoreResult<PathBuf> {
        let bucket_root = confined(&self.root, bucket)?;
        confined(&bucket_root, path)
    }
}

#[async_trait]
impl ObjectStore for FsObjectStore {
    async fn get_object(&self, bucket: &str, path: &str) -> StoreResult<Vec<u8>> {
        let file = self.object_path(bucket, path)?;
        Ok(fs::read(&file).await?)
    }

    async fn put_object(&self, bucket: &str, path: &str, data: Vec<u8>, content_type: &str) -> StoreResult<()> {
        let target = self.object_path(bucket, path)?;
        let parent = target.parent()
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;
        fs::create_dir_all(parent).await?;

        // Readers never see a half-written object
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        let partial = parent.join(format!(".partial-{}-{}", std::process::id(), sequence));
        fs::write(&partial, &data).await?;
        if let Err(e) = fs::rename(&partial, &target).await {
            let _ = fs::remove_file(&partial).await;
            return Err(e.into());
        }

        debug!("Stored {}/{} ({} bytes, {})", bucket, path, data.len(), content_type);
        Ok(())
    }
}

/// Publisher appending messages to per-topic JSON-lines files
#[derive(Debug)]
pub struct FsPublisher {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FsPublisher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        FsPublisher { root: root.into(), write_lock: Mutex::new(()) }
    }

    /// File a topic is appended to
    pub fn topic_path(&self, topic: &str) -> StoreResult<PathBuf> {
        confined(&self.root, &format!("{}.jsonl", topic))
    }
}

#[async_trait]
impl MessagePublisher for FsPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> StoreResult<()> {
        let path = self.topic_path(topic)?;
        let mut line: Vec<u8> = payload.into_iter().filter(|b| *b != b'\n').collect();
        line.push(b'\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.root).await?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;
        file.write_all(&line).await?;
        file.flush().await?;

        trace!("Published to {} (key {:?})", topic, key);
        Ok(())
    }
}
