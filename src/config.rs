//! Application configuration
//!
//! Loaded from a TOML file whose sections all have defaults, then overridden
//! from the environment. Defaults match the photo-processing deployment the
//! service was built for.

use log::{debug, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::errors::{PipelineError, PipelineResult};
use crate::worker::ExtractorSettings;

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name reported in audit records
    pub name: String,
    /// Scratch directory for downloaded sources and band outputs
    pub work_dir: PathBuf,
    pub io_timeout_secs: u64,
    pub partitions: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            name: "image-converter".to_string(),
            work_dir: std::env::temp_dir(),
            io_timeout_secs: 300,
            partitions: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct TopicsConfig {
    pub notifications: String,
    pub results: String,
    pub audit: String,
    /// Broker address; informational for the file-backed transports
    pub bootstrap_servers: Option<String>,
    /// Directory receiving one `{topic}.jsonl` file per published topic
    pub outbox: PathBuf,
}

impl Default for TopicsConfig {
    fn default() -> Self {
        TopicsConfig {
            notifications: "agro.s3.notifications".to_string(),
            results: "agro.new.photos".to_string(),
            audit: "agro.audit.messages".to_string(),
            bootstrap_servers: None,
            outbox: PathBuf::from("data/topics"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObjectStoreConfig {
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub bucket: String,
    pub secure: bool,
    /// Local directory standing in for the object store
    pub root: PathBuf,
    pub source_prefix: String,
    pub output_prefix: String,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        ObjectStoreConfig {
            endpoint: None,
            access_key: None,
            secret_key: None,
            bucket: "agro-photos".to_string(),
            secure: false,
            root: PathBuf::from("data/objects"),
            source_prefix: "new".to_string(),
            output_prefix: "converted".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MetadataStoreConfig {
    pub url: Option<String>,
    pub database: String,
    pub collection: String,
    /// Local directory holding one JSON file per document
    pub root: PathBuf,
}

impl Default for MetadataStoreConfig {
    fn default() -> Self {
        MetadataStoreConfig {
            url: None,
            database: "file_link_hub".to_string(),
            collection: "photos".to_string(),
            root: PathBuf::from("data/documents"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub service: ServiceConfig,
    pub topics: TopicsConfig,
    pub object_store: ObjectStoreConfig,
    pub metadata_store: MetadataStoreConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Reads and parses a TOML file
    pub fn from_file(path: &Path) -> PipelineResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> PipelineResult<Self> {
        toml::from_str(content).map_err(|e| PipelineError::Config(e.to_string()))
    }

    /// Applies environment overrides from the process environment
    pub fn apply_env(&mut self) {
        self.apply_env_overrides(|name| std::env::var(name).ok());
    }

    /// Applies overrides, looking variables up through `lookup`
    ///
    /// # Arguments
    /// * `lookup` - Returns a variable's value, `None` when unset
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|value| !value.is_empty());

        if let Some(value) = var("MINIO_URL") {
            self.object_store.endpoint = Some(value);
        }
        if let Some(value) = var("MINIO_BUCKET") {
            self.object_store.bucket = value;
        }
        if let Some(value) = var("MINIO_ROOT_USER") {
            self.object_store.access_key = Some(value);
        }
        if let Some(value) = var("MINIO_ROOT_PASSWORD") {
            self.object_store.secret_key = Some(value);
        }
        if let Some(value) = var("MONGO_CONNECTION_URL") {
            self.metadata_store.url = Some(value);
        }
        if let Some(value) = var("KAFKA_BOOTSTRAP_SERVERS") {
            self.topics.bootstrap_servers = Some(value);
        }
        if let Some(value) = var("BANDSPLIT_LOG_LEVEL") {
            self.logging.level = value;
        }
        if let Some(value) = var("BANDSPLIT_WORK_DIR") {
            self.service.work_dir = PathBuf::from(value);
        }
    }

    /// Rejects configurations the service cannot run with
    pub fn validate(&self) -> PipelineResult<()> {
        let names = [
            ("topics.notifications", &self.topics.notifications),
            ("topics.results", &self.topics.results),
            ("topics.audit", &self.topics.audit),
            ("object_store.bucket", &self.object_store.bucket),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{} must not be empty", field)));
            }
        }
        if self.service.partitions == 0 {
            return Err(PipelineError::Config("service.partitions must be at least 1".to_string()));
        }
        if self.service.io_timeout_secs == 0 {
            return Err(PipelineError::Config("service.io_timeout_secs must be at least 1".to_string()));
        }
        if self.logging.level.parse::<log::LevelFilter>().is_err() {
            return Err(PipelineError::Config(format!("unknown log level '{}'", self.logging.level)));
        }
        for setting in self.unused_remote_settings() {
            warn!("{} is set but only the filesystem transports are available; using {}",
                  setting, self.local_root_for(setting).display());
        }
        Ok(())
    }

    /// Remote connection settings that are configured but have no transport
    ///
    /// Objects, documents and topics are always served from the local roots.
    pub fn unused_remote_settings(&self) -> Vec<&'static str> {
        let mut unused = Vec::new();
        if self.object_store.endpoint.is_some() {
            unused.push("object_store.endpoint");
        }
        if self.object_store.access_key.is_some() || self.object_store.secret_key.is_some() {
            unused.push("object_store credentials");
        }
        if self.metadata_store.url.is_some() {
            unused.push("metadata_store.url");
        }
        if self.topics.bootstrap_servers.is_some() {
            unused.push("topics.bootstrap_servers");
        }
        unused
    }

    fn local_root_for(&self, setting: &str) -> &Path {
        if setting.starts_with("object_store") {
            &self.object_store.root
        } else if setting.starts_with("metadata_store") {
            &self.metadata_store.root
        } else {
            &self.topics.outbox
        }
    }

    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.service.io_timeout_secs)
    }

    /// Settings for the band extractor
    pub fn extractor_settings(&self) -> ExtractorSettings {
        ExtractorSettings {
            bucket: self.object_store.bucket.clone(),
            source_prefix: self.object_store.source_prefix.clone(),
            output_prefix: self.object_store.output_prefix.clone(),
            work_dir: self.service.work_dir.clone(),
            io_timeout: self.io_timeout(),
        }
    }
}
