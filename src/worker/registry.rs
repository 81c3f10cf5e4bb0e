//! Type tag to worker mapping, built once at startup

use log::{debug, info};
use std::collections::HashMap;
use std::sync::Arc;

use super::Worker;
use crate::errors::{PipelineError, PipelineResult};

/// Immutable once handed to the dispatcher
#[derive(Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Arc<dyn Worker>>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from every available worker
    ///
    /// # Returns
    /// The registry, or `DuplicateWorker` if two workers share a key
    pub fn from_workers(workers: Vec<Arc<dyn Worker>>) -> PipelineResult<Self> {
        let mut registry = Self::new();
        for worker in workers {
            registry.register(worker)?;
        }
        info!("Worker registry ready with {} workers: {:?}", registry.len(), registry.keys());
        Ok(registry)
    }

    /// Adds a worker under its key
    pub fn register(&mut self, worker: Arc<dyn Worker>) -> PipelineResult<()> {
        let key = worker.key().to_string();
        if self.workers.contains_key(&key) {
            return Err(PipelineError::DuplicateWorker(key));
        }
        debug!("Registering worker '{}'", key);
        self.workers.insert(key, worker);
        Ok(())
    }

    /// Looks a worker up; there is no fallback
    pub fn resolve(&self, key: &str) -> Option<Arc<dyn Worker>> {
        self.workers.get(key).cloned()
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.workers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::model::ProcessingDocument;
    use crate::worker::ProcessingReport;

    struct Named(&'static str);

    #[async_trait]
    impl Worker for Named {
        fn key(&self) -> &str {
            self.0
        }

        async fn process(&self, id: &str, _document: ProcessingDocument) -> PipelineResult<ProcessingReport> {
            Ok(ProcessingReport::empty(id))
        }
    }

    #[test]
    fn resolves_registered_keys_only() {
        let registry = WorkerRegistry::from_workers(vec![Arc::new(Named("A")), Arc::new(Named("B"))]).unwrap();
        assert_eq!(registry.keys(), vec!["A", "B"]);
        assert_eq!(registry.resolve("A").map(|w| w.key().to_string()), Some("A".to_string()));
        assert!(registry.resolve("a").is_none());
        assert!(registry.resolve("unknown").is_none());
    }

    #[test]
    fn duplicate_keys_fail_construction() {
        let result = WorkerRegistry::from_workers(vec![Arc::new(Named("A")), Arc::new(Named("A"))]);
        assert!(matches!(result, Err(PipelineError::DuplicateWorker(key)) if key == "A"));
    }
}
