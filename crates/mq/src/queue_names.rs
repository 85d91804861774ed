use std::fmt::Debug;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed message body that can travel inside a [`crate::Message`].
///
/// `TYPE_NAME` is the stable name used to derive queue names, so it must be
/// identical on publishers and consumers.
pub trait MessageBody
where
    Self: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// The type tag of the body.
    const TYPE_NAME: &'static str;
}

/// The base queue names of one message type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct QueueNames {
    /// Normal inbound queue.
    pub in_queue: String,
    /// Inbound queue drained before `in_queue`.
    pub priority: String,
    /// Dead-letter queue for messages that failed every attempt.
    pub dlq: String,
}

impl QueueNames {
    /// Builds the queue names for an arbitrary type name.
    #[must_use]
    pub fn new(type_name: &str) -> Self {
        Self {
            in_queue: format!("mq:{type_name}.inq"),
            priority: format!("mq:{type_name}.priorityq"),
            dlq: format!("mq:{type_name}.dlq"),
        }
    }

    /// Builds the queue names for a message body type.
    #[must_use]
    pub fn of<T: MessageBody>() -> Self {
        Self::new(T::TYPE_NAME)
    }

    /// Queues a handler listens on, in draining order.
    #[must_use]
    pub fn process_queue_names(&self) -> Vec<String> {
        vec![self.priority.clone(), self.in_queue.clone()]
    }
}
