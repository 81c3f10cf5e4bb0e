//! Hooks run around every dispatched document

use async_trait::async_trait;
use chrono::Utc;
use log::{error, info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::errors::PipelineResult;
use crate::model::document::UNKNOWN_TYPE;
use crate::model::{AuditRecord, AuditStatus};
use crate::store::MessagePublisher;
use crate::worker::ProcessingReport;

/// What is known about the document being dispatched
#[derive(Debug, Clone)]
pub struct DispatchContext {
    pub id: String,
    pub event_name: String,
    /// Document type, `"unknown"` until the document has been read
    pub kind: String,
    pub started: Instant,
}

impl DispatchContext {
    pub fn new(id: &str, event_name: &str) -> Self {
        DispatchContext {
            id: id.to_string(),
            event_name: event_name.to_string(),
            kind: UNKNOWN_TYPE.to_string(),
            started: Instant::now(),
        }
    }
}

/// Cross-cutting behaviour composed around the dispatcher
///
/// `before` runs in registration order, `after` in reverse order.
#[async_trait]
pub trait Interceptor: Send + Sync {
    async fn before(&self, _context: &DispatchContext) {}

    async fn after(&self, context: &DispatchContext, outcome: &PipelineResult<ProcessingReport>);
}

/// Logs start, duration and outputs of every document
pub struct LoggingInterceptor;

#[async_trait]
impl Interceptor for LoggingInterceptor {
    async fn before(&self, context: &DispatchContext) {
        info!("Dispatching {} ({})", context.id, context.event_name);
    }

    async fn after(&self, context: &DispatchContext, outcome: &PipelineResult<ProcessingReport>) {
        let elapsed = context.started.elapsed();
        match outcome {
            Ok(report) => {
                for output in &report.outputs {
                    match &output.result {
                        Ok(size) => info!("  {} -> {} ({} bytes)", output.layer, output.object_path, size),
                        Err(e) => warn!("  {} -> {} failed: {}", output.layer, output.object_path, e),
                    }
                }
                info!("{} [{}] finished in {:?}: {}/{} outputs", context.id, context.kind, elapsed,
                      report.materialized().len(), report.outputs.len());
            }
            Err(e) => error!("{} [{}] failed after {:?}: {}", context.id, context.kind, elapsed, e),
        }
    }
}

/// Publishes an [`AuditRecord`] per document
pub struct AuditInterceptor {
    publisher: Arc<dyn MessagePublisher>,
    service: String,
    topic: String,
}

impl AuditInterceptor {
    pub fn new(publisher: Arc<dyn MessagePublisher>, service: &str, topic: &str) -> Self {
        AuditInterceptor {
            publisher,
            service: service.to_string(),
            topic: topic.to_string(),
        }
    }

    /// Audit entry for an outcome
    pub fn record(&self, context: &DispatchContext, outcome: &PipelineResult<ProcessingReport>) -> AuditRecord {
        let (status, error, outputs) = match outcome {
            Ok(report) => {
                let failures: Vec<String> = report.failures()
                    .iter()
                    .filter_map(|output| output.error().map(|e| e.to_string()))
                    .collect();
                let status = if failures.is_empty() { AuditStatus::Success } else { AuditStatus::Partial };
                let error = if failures.is_empty() { None } else { Some(failures.join("; ")) };
                let outputs = report.materialized().into_iter().map(str::to_string).collect();
                (status, error, outputs)
            }
            Err(e) => (AuditStatus::Failure, Some(e.to_string()), Vec::new()),
        };

        AuditRecord {
            service: self.service.clone(),
            id: context.id.clone(),
            kind: context.kind.clone(),
            status,
            error,
            outputs,
            timestamp: Utc::now(),
        }
    }
}

#[async_trait]
impl Interceptor for AuditInterceptor {
    async fn after(&self, context: &DispatchContext, outcome: &PipelineResult<ProcessingReport>) {
        let record = self.record(context, outcome);
        let payload = match serde_json::to_vec(&record) {
            Ok(payload) => payload,
            Err(e) => {
                error!("Cannot encode audit record for {}: {}", context.id, e);
                return;
            }
        };

        // Auditing never fails the message
        if let Err(e) = self.publisher.publish(&self.topic, Some(&context.id), payload).await {
            error!("Audit publish to {} failed for {}: {}", self.topic, context.id, e);
        }
    }
}
