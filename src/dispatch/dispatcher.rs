//! Notification to worker routing

use log::{debug, error, info, warn};
use std::sync::Arc;

use super::interceptor::{DispatchContext, Interceptor};
use crate::errors::{PipelineError, PipelineResult};
use crate::model::NotificationEvent;
use crate::store::{MessagePublisher, MetadataStore};
use crate::worker::{ProcessingReport, WorkerRegistry};

/// Routes each notification to the worker named by its document's type
///
/// Holds no per-message state, so one dispatcher serves all partitions.
pub struct Dispatcher {
    metadata: Arc<dyn MetadataStore>,
    registry: Arc<WorkerRegistry>,
    interceptors: Vec<Arc<dyn Interceptor>>,
    publisher: Option<Arc<dyn MessagePublisher>>,
    results_topic: String,
}

impl Dispatcher {
    pub fn new(metadata: Arc<dyn MetadataStore>, registry: Arc<WorkerRegistry>) -> Self {
        Dispatcher {
            metadata,
            registry,
            interceptors: Vec::new(),
            publisher: None,
            results_topic: String::new(),
        }
    }

    /// Adds an interceptor after the ones already registered
    pub fn with_interceptor(mut self, interceptor: Arc<dyn Interceptor>) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    /// Publishes completion events of successful documents to `topic`
    pub fn with_completion_publisher(mut self, publisher: Arc<dyn MessagePublisher>, topic: &str) -> Self {
        self.publisher = Some(publisher);
        self.results_topic = topic.to_string();
        self
    }

    pub fn registry(&self) -> &WorkerRegistry {
        &self.registry
    }

    /// Handles one raw queue payload
    ///
    /// # Arguments
    /// * `payload` - Notification JSON as received from the queue
    ///
    /// # Returns
    /// The worker's report, or the reason nothing was processed
    pub async fn dispatch(&self, payload: &[u8]) -> PipelineResult<ProcessingReport> {
        let event = match NotificationEvent::parse(payload) {
            Ok(event) => event,
            Err(e) => {
                warn!("Dropping malformed notification: {}", e);
                return Err(e);
            }
        };

        let id = event.identifier();
        let mut context = DispatchContext::new(&id, event.event_name());

        for interceptor in &self.interceptors {
            interceptor.before(&context).await;
        }

        let outcome = self.route(&mut context).await;

        if let Ok(report) = &outcome {
            self.publish_completion(report).await;
        }

        for interceptor in self.interceptors.iter().rev() {
            interceptor.after(&context, &outcome).await;
        }

        outcome
    }

    async fn route(&self, context: &mut DispatchContext) -> PipelineResult<ProcessingReport> {
        let mut document = self
            .metadata
            .find_by_id(&context.id)
            .await?
            .ok_or_else(|| PipelineError::DocumentNotFound(context.id.clone()))?;

        context.kind = document.take_type();
        debug!("Document {} has type '{}'", context.id, context.kind);

        let worker = match self.registry.resolve(&context.kind) {
            Some(worker) => worker,
            None => {
                error!("Worker not found for type '{}' (document {})", context.kind, context.id);
                return Err(PipelineError::WorkerNotFound(context.kind.clone()));
            }
        };

        worker.process(&context.id, document).await
    }

    async fn publish_completion(&self, report: &ProcessingReport) {
        let (publisher, event) = match (&self.publisher, &report.completion) {
            (Some(publisher), Some(event)) => (publisher, event),
            _ => return,
        };

        let payload = match event.to_payload() {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot encode completion event for {}: {}", report.id, e);
                return;
            }
        };

        match publisher.publish(&self.results_topic, Some(&event.photo_id), payload).await {
            Ok(()) => info!("Published completion of {} to {}", event.photo_id, self.results_topic),
            Err(e) => error!("Completion publish for {} failed: {}", event.photo_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    use crate::dispatch::interceptor::AuditInterceptor;
    use crate::dispatch::queue::InMemoryBroker;
    use crate::model::{CompletionEvent, ProcessingDocument};
    use crate::store::InMemoryMetadataStore;
    use crate::worker::Worker;

    #[derive(Default)]
    struct CountingWorker {
        calls: AtomicUsize,
        seen: Mutex<Vec<ProcessingDocument>>,
    }

    #[async_trait]
    impl Worker for CountingWorker {
        fn key(&self) -> &str {
            "MultiLayerTiff"
        }

        async fn process(&self, id: &str, document: ProcessingDocument) -> PipelineResult<ProcessingReport> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let contour = document.get("contourId").and_then(|v| v.as_str()).map(str::to_string);
            self.seen.lock().await.push(document);

            let mut report = ProcessingReport::empty(id);
            report.completion = contour.map(|contour_id| CompletionEvent {
                photo_id: id.to_string(),
                contour_id,
                date: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
                extension: "tif".to_string(),
            });
            Ok(report)
        }
    }

    async fn setup(documents: Vec<serde_json::Value>) -> (Arc<CountingWorker>, Dispatcher) {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        for document in documents {
            metadata.insert(document).await.unwrap();
        }
        let worker = Arc::new(CountingWorker::default());
        let registered: Arc<dyn Worker> = worker.clone();
        let registry = WorkerRegistry::from_workers(vec![registered]).unwrap();
        (worker, Dispatcher::new(metadata, Arc::new(registry)))
    }

    #[tokio::test]
    async fn routes_by_type_without_the_type_field() {
        let (worker, dispatcher) = setup(vec![json!({"_id": "abc", "type": "MultiLayerTiff", "extension": "tif"})]).await;

        let report = dispatcher.dispatch(br#"{"EventName":"put","Key":"agro-photos/new/abc.tif"}"#).await.unwrap();
        assert_eq!(report.id, "abc");
        assert_eq!(worker.calls.load(Ordering::SeqCst), 1);

        let seen = worker.seen.lock().await;
        assert!(seen[0].get("type").is_none());
        assert_eq!(seen[0].get("extension"), Some(&json!("tif")));
    }

    #[tokio::test]
    async fn unknown_type_invokes_no_worker() {
        let (worker, dispatcher) = setup(vec![
            json!({"_id": "a", "type": "Panorama"}),
            json!({"_id": "b"}),
        ]).await;

        let result = dispatcher.dispatch(br#"{"Key":"new/a.tif"}"#).await;
        assert!(matches!(result, Err(PipelineError::WorkerNotFound(kind)) if kind == "Panorama"));
        let result = dispatcher.dispatch(br#"{"Key":"new/b.tif"}"#).await;
        assert!(matches!(result, Err(PipelineError::WorkerNotFound(kind)) if kind == "unknown"));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_and_missing_documents_fail_early() {
        let (worker, dispatcher) = setup(vec![]).await;

        assert!(matches!(dispatcher.dispatch(b"{oops").await, Err(PipelineError::MalformedMessage(_))));
        let result = dispatcher.dispatch(br#"{"Key":"new/ghost.tif"}"#).await;
        assert!(matches!(result, Err(PipelineError::DocumentNotFound(id)) if id == "ghost"));
        let result = dispatcher.dispatch(br#"{"EventName":"put"}"#).await;
        assert!(matches!(result, Err(PipelineError::DocumentNotFound(id)) if id == "Unknown"));
        assert_eq!(worker.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn publishes_completion_and_audit() {
        let (_, dispatcher) = setup(vec![
            json!({"_id": "abc", "type": "MultiLayerTiff", "contourId": "c-1"}),
        ]).await;
        let broker = InMemoryBroker::new(2);
        let dispatcher = dispatcher
            .with_interceptor(Arc::new(AuditInterceptor::new(broker.clone(), "image-converter", "audit")))
            .with_completion_publisher(broker.clone(), "results");

        dispatcher.dispatch(br#"{"Key":"new/abc.tif"}"#).await.unwrap();
        dispatcher.dispatch(br#"{"Key":"new/ghost.tif"}"#).await.unwrap_err();

        let results = broker.messages("results").await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key.as_deref(), Some("abc"));
        let event: serde_json::Value = serde_json::from_slice(&results[0].payload).unwrap();
        assert_eq!(event["contourId"], "c-1");

        let audit: Vec<serde_json::Value> = broker.messages("audit").await
            .iter()
            .map(|m| serde_json::from_slice(&m.payload).unwrap())
            .collect();
        assert_eq!(audit.len(), 2);
        assert_eq!(audit[0]["status"], "success");
        assert_eq!(audit[0]["type"], "MultiLayerTiff");
        assert_eq!(audit[1]["status"], "failure");
        assert_eq!(audit[1]["id"], "ghost");
    }
}
