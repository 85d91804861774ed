//! In-memory (single process) implementation of the queue transport for
//! tests and local development.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Clients of the in-memory broker.
pub mod client;

pub use client::{Error, MemoryClient};

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::Bytes;
use courier_mq::MessageService;
use tokio::sync::{Mutex, Notify, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::debug;

const NOTIFY_CAPACITY: usize = 256;

#[derive(Debug, Default)]
struct Queue {
    entries: VecDeque<Bytes>,
    ready: Arc<Notify>,
}

impl Queue {
    fn is_idle(&self) -> bool {
        self.entries.is_empty() && Arc::strong_count(&self.ready) == 1
    }
}

#[derive(Debug)]
struct BrokerState {
    notifications: broadcast::Sender<(String, Bytes)>,
    open_clients: AtomicUsize,
    queues: Mutex<HashMap<String, Queue>>,
    shutdown: CancellationToken,
}

/// In-memory broker holding named FIFO queues.
///
/// State is owned by the broker instance; clones share it.
#[derive(Clone, Debug)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates a new empty broker.
    #[must_use]
    pub fn new() -> Self {
        let (notifications, _) = broadcast::channel(NOTIFY_CAPACITY);

        Self {
            state: Arc::new(BrokerState {
                notifications,
                open_clients: AtomicUsize::new(0),
                queues: Mutex::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Closes the broker. Blocked waits return and later operations fail.
    pub fn close(&self) {
        debug!("closing in-memory broker");
        self.state.shutdown.cancel();
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.shutdown.is_cancelled()
    }

    /// Number of clients that have been created and not yet dropped.
    #[must_use]
    pub fn open_clients(&self) -> usize {
        self.state.open_clients.load(Ordering::SeqCst)
    }

    /// Number of entries waiting on the named queue.
    pub async fn queue_len(&self, queue_name: &str) -> usize {
        self.state
            .queues
            .lock()
            .await
            .get(queue_name)
            .map_or(0, |queue| queue.entries.len())
    }

    /// Number of queues the broker currently tracks, empty ones included.
    ///
    /// An empty queue is forgotten once nobody waits on it.
    pub async fn queue_count(&self) -> usize {
        self.state.queues.lock().await.len()
    }

    /// Names of all queues that currently hold entries, sorted.
    pub async fn queue_names(&self) -> Vec<String> {
        let queues = self.state.queues.lock().await;
        let mut names: Vec<String> = queues
            .iter()
            .filter(|(_, queue)| !queue.entries.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        drop(queues);

        names.sort();
        names
    }

    async fn push(&self, queue_name: &str, bytes: Bytes) {
        let mut queues = self.state.queues.lock().await;
        let queue = queues.entry(queue_name.to_string()).or_default();
        queue.entries.push_back(bytes);
        queue.ready.notify_one();
    }

    // Pops the head of the queue without creating it.
    async fn pop(&self, queue_name: &str) -> Option<Bytes> {
        let mut queues = self.state.queues.lock().await;
        let queue = queues.get_mut(queue_name)?;
        let bytes = Self::take(queue);

        if queue.is_idle() {
            queues.remove(queue_name);
        }

        bytes
    }

    // Pops the head of the queue, or hands back the queue's wake-up handle if
    // it is empty. Holding the handle keeps the queue tracked.
    async fn pop_or_watch(&self, queue_name: &str) -> Result<Bytes, Arc<Notify>> {
        let mut queues = self.state.queues.lock().await;
        let queue = queues.entry(queue_name.to_string()).or_default();

        match Self::take(queue) {
            Some(bytes) => {
                if queue.is_idle() {
                    queues.remove(queue_name);
                }
                Ok(bytes)
            }
            None => Err(queue.ready.clone()),
        }
    }

    // Forgets the queue if it is empty and nobody else is waiting on it.
    async fn release(&self, queue_name: &str) {
        let mut queues = self.state.queues.lock().await;

        if queues.get(queue_name).is_some_and(Queue::is_idle) {
            queues.remove(queue_name);
        }
    }

    fn take(queue: &mut Queue) -> Option<Bytes> {
        let bytes = queue.entries.pop_front()?;

        // Pass the wake-up on so a second waiter sees what is left.
        if !queue.entries.is_empty() {
            queue.ready.notify_one();
        }

        Some(bytes)
    }
}

impl MessageService for MemoryBroker {
    type Client = MemoryClient;

    fn create_client(&self) -> MemoryClient {
        self.state.open_clients.fetch_add(1, Ordering::SeqCst);
        MemoryClient::new(self.clone())
    }
}
