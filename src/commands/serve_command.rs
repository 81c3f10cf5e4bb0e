//! Notification consumer command
//!
//! Reads newline-delimited notifications from stdin or a file, spreads them
//! over the configured number of partitions by object key, and dispatches
//! them with filesystem-backed stores and publisher.

use clap::ArgMatches;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;

use crate::commands::command_traits::{runtime, Command};
use crate::config::{AppConfig, LoggingConfig};
use crate::dispatch::{
    AuditInterceptor, Consumer, ConsumerStats, Dispatcher, InMemoryBroker, LineQueue, LoggingInterceptor,
    MessageQueue,
};
use crate::errors::{PipelineError, PipelineResult};
use crate::model::NotificationEvent;
use crate::store::{FsMetadataStore, FsObjectStore, FsPublisher, MessagePublisher};
use crate::worker::{MultiLayerTiffWorker, Worker, WorkerRegistry};

/// Command running the consumer until its input ends
pub struct ServeCommand {
    config: AppConfig,
    input_file: Option<PathBuf>,
}

impl ServeCommand {
    /// Create a new serve command
    ///
    /// Loads the configuration file when given, applies environment
    /// overrides and validates the result.
    pub fn new(args: &ArgMatches) -> PipelineResult<Self> {
        let mut config = match args.get_one::<String>("config") {
            Some(path) => AppConfig::from_file(&PathBuf::from(path))?,
            None => AppConfig::default(),
        };
        config.apply_env();
        config.validate()?;

        Ok(ServeCommand {
            config,
            input_file: args.get_one::<String>("input").map(PathBuf::from),
        })
    }

    fn dispatcher(&self) -> PipelineResult<Dispatcher> {
        let config = &self.config;
        let objects = Arc::new(FsObjectStore::new(&config.object_store.root));
        let metadata = Arc::new(FsMetadataStore::new(&config.metadata_store.root));
        let publisher: Arc<dyn MessagePublisher> = Arc::new(FsPublisher::new(&config.topics.outbox));

        let workers: Vec<Arc<dyn Worker>> = vec![
            Arc::new(MultiLayerTiffWorker::new(objects, config.extractor_settings())),
        ];
        let registry = WorkerRegistry::from_workers(workers)?;

        Ok(Dispatcher::new(metadata, Arc::new(registry))
            .with_interceptor(Arc::new(LoggingInterceptor))
            .with_interceptor(Arc::new(AuditInterceptor::new(
                Arc::clone(&publisher),
                &config.service.name,
                &config.topics.audit,
            )))
            .with_completion_publisher(publisher, &config.topics.results))
    }

    async fn serve(&self) -> PipelineResult<ConsumerStats> {
        let topic = self.config.topics.notifications.clone();
        let input: Arc<dyn MessageQueue> = match &self.input_file {
            Some(path) => {
                let file = tokio::fs::File::open(path).await.map_err(|e| {
                    PipelineError::Queue(format!("cannot open {}: {}", path.display(), e))
                })?;
                Arc::new(LineQueue::new(&topic, BufReader::new(file)))
            }
            None => Arc::new(LineQueue::new(&topic, BufReader::new(tokio::io::stdin()))),
        };

        let broker = InMemoryBroker::new(self.config.service.partitions);
        let subscription = broker.subscribe(&topic).await;
        let consumer = Consumer::new(Arc::new(subscription), Arc::new(self.dispatcher()?));
        let consuming = tokio::spawn(async move { consumer.run().await });

        // Same object key, same partition
        let pumped = pump(input.as_ref(), &broker, &topic).await;
        broker.close().await;

        let stats = consuming
            .await
            .map_err(|e| PipelineError::Queue(format!("consumer task failed: {}", e)))??;
        pumped?;
        Ok(stats)
    }
}

async fn pump(input: &dyn MessageQueue, broker: &InMemoryBroker, topic: &str) -> PipelineResult<()> {
    while let Some(message) = input.next_message().await? {
        let key = NotificationEvent::parse(&message.payload).ok().and_then(|event| event.key);
        let (partition, offset) = broker.send(topic, key.as_deref(), message.payload).await;
        debug!("Line {} queued on partition {} at {}", message.offset, partition, offset);
        input.commit(message.partition, message.offset).await?;
    }
    Ok(())
}

impl Command for ServeCommand {
    fn execute(&self) -> PipelineResult<()> {
        info!("Starting {} on topic {} with {} partitions",
              self.config.service.name, self.config.topics.notifications, self.config.service.partitions);

        let stats = runtime()?.block_on(self.serve())?;
        if stats.failed > 0 {
            warn!("{} of {} notifications failed", stats.failed, stats.received);
        }
        println!("Processed {} notifications: {} succeeded, {} failed",
                 stats.received, stats.succeeded, stats.failed);
        Ok(())
    }

    fn logging(&self) -> Option<&LoggingConfig> {
        Some(&self.config.logging)
    }
}
