//! Queue consumer loop

use log::{debug, error, info, warn};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use super::queue::{MessageQueue, QueueMessage};
use crate::errors::{PipelineError, PipelineResult};

/// Counters for one consumer run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub received: u64,
    pub succeeded: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    received: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> ConsumerStats {
        ConsumerStats {
            received: self.received.load(Ordering::SeqCst),
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Pulls messages and dispatches them, one sequential task per partition
///
/// Partitions progress independently. A message's offset is committed once
/// its dispatch has finished, whatever the outcome, so a failing document is
/// never redelivered forever.
pub struct Consumer {
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<Dispatcher>,
}

impl Consumer {
    pub fn new(queue: Arc<dyn MessageQueue>, dispatcher: Arc<Dispatcher>) -> Self {
        Consumer { queue, dispatcher }
    }

    /// Consumes until the queue closes
    ///
    /// # Returns
    /// Run statistics, or the queue error that stopped the loop. Per-message
    /// failures are logged and counted, never returned.
    pub async fn run(&self) -> PipelineResult<ConsumerStats> {
        let counters = Arc::new(Counters::default());
        let mut partitions: HashMap<usize, mpsc::UnboundedSender<QueueMessage>> = HashMap::new();
        let mut tasks: Vec<JoinHandle<()>> = Vec::new();

        let stopped = loop {
            let message = match self.queue.next_message().await {
                Ok(Some(message)) => message,
                Ok(None) => break None,
                Err(e) => break Some(e),
            };
            counters.received.fetch_add(1, Ordering::SeqCst);

            let partition = message.partition;
            let sender = partitions.entry(partition).or_insert_with(|| {
                debug!("Starting worker task for partition {}", partition);
                let (sender, receiver) = mpsc::unbounded_channel();
                tasks.push(tokio::spawn(partition_loop(
                    receiver,
                    Arc::clone(&self.queue),
                    Arc::clone(&self.dispatcher),
                    Arc::clone(&counters),
                )));
                sender
            });

            if sender.send(message).is_err() {
                error!("Partition {} task is gone", partition);
                counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        };

        // Closing the channels lets each partition drain and finish
        partitions.clear();
        for task in tasks {
            if let Err(e) = task.await {
                error!("Partition task panicked: {}", e);
            }
        }

        let stats = counters.snapshot();
        match stopped {
            None => {
                info!("Queue closed after {} messages ({} ok, {} failed)",
                      stats.received, stats.succeeded, stats.failed);
                Ok(stats)
            }
            Some(e) => {
                error!("Consumer stopped: {}", e);
                Err(match e {
                    PipelineError::Queue(_) => e,
                    other => PipelineError::Queue(other.to_string()),
                })
            }
        }
    }
}

async fn partition_loop(
    mut receiver: mpsc::UnboundedReceiver<QueueMessage>,
    queue: Arc<dyn MessageQueue>,
    dispatcher: Arc<Dispatcher>,
    counters: Arc<Counters>,
) {
    while let Some(message) = receiver.recv().await {
        match dispatcher.dispatch(&message.payload).await {
            Ok(_) => {
                counters.succeeded.fetch_add(1, Ordering::SeqCst);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                if e.is_retryable() {
                    warn!("Message {}[{}]@{} failed and may succeed on redelivery: {}",
                          message.topic, message.partition, message.offset, e);
                } else {
                    warn!("Message {}[{}]@{} failed: {} ({})",
                          message.topic, message.partition, message.offset, e, e.kind());
                }
            }
        }

        if let Err(e) = queue.commit(message.partition, message.offset).await {
            error!("Commit of {}[{}]@{} failed: {}", message.topic, message.partition, message.offset, e);
        }
    }
}
