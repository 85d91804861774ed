mod error;

pub use error::Error;

use crate::MemoryBroker;

use std::sync::atomic::Ordering;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use courier_mq::QueueClient;
use tokio::sync::broadcast;
use tokio::time::{Instant, timeout_at};
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// A client of a [`MemoryBroker`].
///
/// Holds one connection slot on the broker, released on drop.
#[derive(Debug)]
pub struct MemoryClient {
    broker: MemoryBroker,
    id: Uuid,
}

impl MemoryClient {
    pub(crate) fn new(broker: MemoryBroker) -> Self {
        let id = Uuid::new_v4();
        debug!("opened in-memory client {}", id);

        Self { broker, id }
    }

    /// Identifier of this client, for logging.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    fn ensure_open(&self) -> Result<(), Error> {
        if self.broker.state.shutdown.is_cancelled() {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl Drop for MemoryClient {
    fn drop(&mut self) {
        self.broker.state.open_clients.fetch_sub(1, Ordering::SeqCst);
        debug!("released in-memory client {}", self.id);
    }
}

#[async_trait]
impl QueueClient for MemoryClient {
    type Error = Error;

    async fn publish(&self, queue_name: &str, bytes: Bytes) -> Result<(), Error> {
        self.ensure_open()?;

        trace!("client {} publishing {} bytes to {}", self.id, bytes.len(), queue_name);
        self.broker.push(queue_name, bytes).await;

        Ok(())
    }

    async fn notify(&self, queue_name: &str, bytes: Bytes) -> Result<(), Error> {
        self.ensure_open()?;

        // No watchers is not an error.
        let _ = self
            .broker
            .state
            .notifications
            .send((queue_name.to_string(), bytes));

        Ok(())
    }

    async fn blocking_get(
        &self,
        queue_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, Error> {
        let deadline = timeout.map(|timeout| Instant::now() + timeout);
        let shutdown = self.broker.state.shutdown.clone();

        loop {
            self.ensure_open()?;

            let ready = match self.broker.pop_or_watch(queue_name).await {
                Ok(bytes) => return Ok(Some(bytes)),
                Err(ready) => ready,
            };

            match deadline {
                Some(deadline) => {
                    let timed_out = tokio::select! {
                        () = shutdown.cancelled() => return Err(Error::Closed),
                        result = timeout_at(deadline, ready.notified()) => result.is_err(),
                    };

                    if timed_out {
                        drop(ready);
                        self.broker.release(queue_name).await;
                        return Ok(None);
                    }
                }
                None => {
                    tokio::select! {
                        () = shutdown.cancelled() => return Err(Error::Closed),
                        () = ready.notified() => {}
                    }
                }
            }
        }
    }

    async fn try_get(&self, queue_name: &str) -> Result<Option<Bytes>, Error> {
        self.ensure_open()?;

        Ok(self.broker.pop(queue_name).await)
    }

    async fn wait_for_notify_on_any(&self, queue_names: &[String]) -> Result<String, Error> {
        self.ensure_open()?;

        let mut notifications = self.broker.state.notifications.subscribe();
        let shutdown = self.broker.state.shutdown.clone();

        loop {
            tokio::select! {
                () = shutdown.cancelled() => return Err(Error::Closed),
                received = notifications.recv() => match received {
                    Ok((name, _)) if queue_names.contains(&name) => return Ok(name),
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("client {} missed {} notifications", self.id, n);
                    }
                    Err(broadcast::error::RecvError::Closed) => return Err(Error::Closed),
                },
            }
        }
    }
}
