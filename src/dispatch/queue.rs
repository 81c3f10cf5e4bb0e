//! Message queue abstraction and local implementations

use async_trait::async_trait;
use log::{debug, trace};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::{mpsc, Mutex};

use crate::errors::{PipelineError, PipelineResult};
use crate::store::{MessagePublisher, StoreResult};

/// One delivered message
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    pub topic: String,
    pub partition: usize,
    pub offset: u64,
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// At-least-once message source
///
/// Ordering is guaranteed within a partition only.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Next message, or `None` once the queue is closed
    async fn next_message(&self) -> PipelineResult<Option<QueueMessage>>;

    /// Marks everything up to and including `offset` as processed
    async fn commit(&self, partition: usize, offset: u64) -> PipelineResult<()>;
}

#[derive(Default)]
struct TopicState {
    log: Vec<QueueMessage>,
    next_offsets: HashMap<usize, u64>,
    committed: HashMap<usize, u64>,
    subscribers: Vec<mpsc::UnboundedSender<QueueMessage>>,
}

/// Partitioned in-process broker
///
/// Messages with the same key land on the same partition. Subscribers
/// receive the topic's uncommitted backlog first, then live messages, until
/// [`InMemoryBroker::close`]. A message is retained until its offset is
/// committed, so a long-running feed only holds what is still in flight.
/// Messages published after closing are kept for inspection but delivered
/// to no one.
pub struct InMemoryBroker {
    partitions: usize,
    topics: Mutex<HashMap<String, TopicState>>,
    round_robin: AtomicUsize,
    closed: AtomicBool,
}

impl InMemoryBroker {
    pub fn new(partitions: usize) -> Arc<Self> {
        Arc::new(InMemoryBroker {
            partitions: partitions.max(1),
            topics: Mutex::new(HashMap::new()),
            round_robin: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    fn partition_for(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => {
                let mut hasher = DefaultHasher::new();
                key.hash(&mut hasher);
                (hasher.finish() % self.partitions as u64) as usize
            }
            None => self.round_robin.fetch_add(1, Ordering::Relaxed) % self.partitions,
        }
    }

    /// Appends a message to a topic
    ///
    /// # Returns
    /// The partition and offset it was stored at
    pub async fn send(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> (usize, u64) {
        let partition = self.partition_for(key);
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();

        let next = state.next_offsets.entry(partition).or_insert(0);
        let offset = *next;
        *next += 1;

        let message = QueueMessage {
            topic: topic.to_string(),
            partition,
            offset,
            key: key.map(str::to_string),
            payload,
        };
        state.subscribers.retain(|subscriber| subscriber.send(message.clone()).is_ok());
        state.log.push(message);
        trace!("Broker stored {}[{}]@{}", topic, partition, offset);
        (partition, offset)
    }

    /// Subscribes to a topic from its first uncommitted message
    pub async fn subscribe(self: &Arc<Self>, topic: &str) -> BrokerSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();

        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        for message in &state.log {
            // The receiver is alive, so this cannot fail
            let _ = sender.send(message.clone());
        }
        if !self.closed.load(Ordering::SeqCst) {
            state.subscribers.push(sender);
        }

        BrokerSubscription {
            broker: Arc::clone(self),
            topic: topic.to_string(),
            receiver: Mutex::new(receiver),
        }
    }

    /// Ends every subscription once its backlog is drained
    pub async fn close(&self) {
        let mut topics = self.topics.lock().await;
        self.closed.store(true, Ordering::SeqCst);
        for state in topics.values_mut() {
            state.subscribers.clear();
        }
    }

    /// Messages of `topic` not committed yet, in publication order
    pub async fn messages(&self, topic: &str) -> Vec<QueueMessage> {
        self.topics.lock().await.get(topic).map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Next offset to consume on a partition, if anything was committed
    pub async fn committed(&self, topic: &str, partition: usize) -> Option<u64> {
        self.topics.lock().await.get(topic).and_then(|state| state.committed.get(&partition).copied())
    }

    async fn commit(&self, topic: &str, partition: usize, offset: u64) {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        let committed = state.committed.entry(partition).or_insert(0);
        *committed = (*committed).max(offset + 1);

        let next = *committed;
        let before = state.log.len();
        state.log.retain(|message| message.partition != partition || message.offset >= next);
        trace!("Broker released {} messages of {}[{}]", before - state.log.len(), topic, partition);
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> StoreResult<()> {
        self.send(topic, key, payload).await;
        Ok(())
    }
}

/// A consumer's view of one broker topic
pub struct BrokerSubscription {
    broker: Arc<InMemoryBroker>,
    topic: String,
    receiver: Mutex<mpsc::UnboundedReceiver<QueueMessage>>,
}

#[async_trait]
impl MessageQueue for BrokerSubscription {
    async fn next_message(&self) -> PipelineResult<Option<QueueMessage>> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn commit(&self, partition: usize, offset: u64) -> PipelineResult<()> {
        self.broker.commit(&self.topic, partition, offset).await;
        Ok(())
    }
}

/// Newline-delimited notifications from a reader, as a single partition
///
/// Blank lines are skipped; end of input closes the queue.
pub struct LineQueue<R> {
    topic: String,
    lines: Mutex<Lines<R>>,
    next_offset: AtomicU64,
    committed: AtomicU64,
}

impl<R: AsyncBufRead + Unpin + Send> LineQueue<R> {
    pub fn new(topic: &str, reader: R) -> Self {
        LineQueue {
            topic: topic.to_string(),
            lines: Mutex::new(reader.lines()),
            next_offset: AtomicU64::new(0),
            committed: AtomicU64::new(0),
        }
    }

    /// Number of lines committed so far
    pub fn committed(&self) -> u64 {
        self.committed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageQueue for LineQueue<R> {
    async fn next_message(&self) -> PipelineResult<Option<QueueMessage>> {
        let mut lines = self.lines.lock().await;
        loop {
            let line = lines
                .next_line()
                .await
                .map_err(|e| PipelineError::Queue(format!("reading {}: {}", self.topic, e)))?;
            match line {
                Some(line) if line.trim().is_empty() => continue,
                Some(line) => {
                    let offset = self.next_offset.fetch_add(1, Ordering::SeqCst);
                    return Ok(Some(QueueMessage {
                        topic: self.topic.clone(),
                        partition: 0,
                        offset,
                        key: None,
                        payload: line.into_bytes(),
                    }));
                }
                None => {
                    debug!("End of input for {}", self.topic);
                    return Ok(None);
                }
            }
        }
    }

    async fn commit(&self, _partition: usize, offset: u64) -> PipelineResult<()> {
        self.committed.fetch_max(offset + 1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_key_keeps_partition_and_order() {
        let broker = InMemoryBroker::new(4);
        let mut partitions = Vec::new();
        for i in 0..5u8 {
            partitions.push(broker.send("t", Some("abc"), vec![i]).await);
        }
        assert!(partitions.iter().all(|(p, _)| *p == partitions[0].0));
        assert_eq!(partitions.iter().map(|(_, o)| *o).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn subscription_replays_backlog_then_live_messages() {
        let broker = InMemoryBroker::new(1);
        broker.send("t", None, b"one".to_vec()).await;
        let subscription = broker.subscribe("t").await;
        broker.send("t", None, b"two".to_vec()).await;
        broker.close().await;

        let first = subscription.next_message().await.unwrap().unwrap();
        let second = subscription.next_message().await.unwrap().unwrap();
        assert_eq!((first.payload, second.payload), (b"one".to_vec(), b"two".to_vec()));
        assert!(subscription.next_message().await.unwrap().is_none());

        subscription.commit(0, 1).await.unwrap();
        assert_eq!(broker.committed("t", 0).await, Some(2));
    }

    #[tokio::test]
    async fn committed_messages_are_released() {
        let broker = InMemoryBroker::new(2);
        let subscription = broker.subscribe("t").await;
        for i in 0..4u8 {
            broker.send("t", Some("abc"), vec![i]).await;
        }
        broker.send("t", Some("other"), vec![9]).await;

        let mut last = None;
        for _ in 0..5 {
            let message = subscription.next_message().await.unwrap().unwrap();
            if message.key.as_deref() == Some("abc") {
                last = Some((message.partition, message.offset));
            }
        }
        let (partition, offset) = last.unwrap();
        subscription.commit(partition, offset).await.unwrap();

        let retained: Vec<Vec<u8>> = broker.messages("t").await.into_iter().map(|m| m.payload).collect();
        assert_eq!(retained, vec![vec![9]]);

        // A late subscriber only sees what is still in flight
        broker.close().await;
        let late = broker.subscribe("t").await;
        assert_eq!(late.next_message().await.unwrap().map(|m| m.payload), Some(vec![9]));
        assert!(late.next_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn publishing_after_close_is_recorded_only() {
        let broker = InMemoryBroker::new(1);
        let subscription = broker.subscribe("t").await;
        broker.close().await;
        broker.publish("t", None, vec![1]).await.unwrap();

        assert!(subscription.next_message().await.unwrap().is_none());
        assert_eq!(broker.messages("t").await.len(), 1);
    }

    #[tokio::test]
    async fn line_queue_skips_blank_lines() {
        let input: &[u8] = b"{\"Key\":\"new/a.tif\"}\n\n{\"Key\":\"new/b.tif\"}\n";
        let queue = LineQueue::new("agro.s3.notifications", input);

        let first = queue.next_message().await.unwrap().unwrap();
        let second = queue.next_message().await.unwrap().unwrap();
        assert_eq!((first.offset, second.offset), (0, 1));
        assert_eq!(second.payload, b"{\"Key\":\"new/b.tif\"}".to_vec());
        assert!(queue.next_message().await.unwrap().is_none());

        queue.commit(0, 1).await.unwrap();
        assert_eq!(queue.committed(), 2);
    }
}
