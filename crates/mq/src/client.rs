use std::error::Error;
use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

/// Marker trait for queue client errors
pub trait QueueClientError: Error + Send + Sync + 'static {}

/// A connection to a queue transport keyed only by queue name.
///
/// Dropping a client releases whatever connection it holds.
#[async_trait]
pub trait QueueClient
where
    Self: Debug + Send + Sync + 'static,
{
    /// The error type for the client.
    type Error: QueueClientError;

    /// Appends bytes to the named queue.
    async fn publish(&self, queue_name: &str, bytes: Bytes) -> Result<(), Self::Error>;

    /// Signals watchers of the named queue without enqueuing anything.
    async fn notify(&self, queue_name: &str, bytes: Bytes) -> Result<(), Self::Error>;

    /// Pops the next entry of the named queue, waiting up to `timeout`.
    ///
    /// `None` as timeout waits until an entry arrives. Returns `Ok(None)` when
    /// the timeout elapses first.
    async fn blocking_get(
        &self,
        queue_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, Self::Error>;

    /// Pops the next entry of the named queue if one is already there.
    async fn try_get(&self, queue_name: &str) -> Result<Option<Bytes>, Self::Error>;

    /// Waits for a notification on any of the given queues and returns the
    /// name of the queue that was notified.
    async fn wait_for_notify_on_any(&self, queue_names: &[String]) -> Result<String, Self::Error>;
}
