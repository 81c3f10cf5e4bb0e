//! Notification dispatch
//!
//! Queue messages are turned into worker invocations by the [`Dispatcher`];
//! the [`Consumer`] feeds it from a [`MessageQueue`], one task per partition.

pub mod dispatcher;
pub mod interceptor;
pub mod queue;
pub mod consumer;

pub use dispatcher::Dispatcher;
pub use interceptor::{AuditInterceptor, DispatchContext, Interceptor, LoggingInterceptor};
pub use queue::{BrokerSubscription, InMemoryBroker, LineQueue, MessageQueue, QueueMessage};
pub use consumer::{Consumer, ConsumerStats};
