use crate::client::QueueClient;

/// A trait representing a message transport that hands out clients.
pub trait MessageService
where
    Self: Clone + Send + Sync + 'static,
{
    /// The client type produced by the service.
    type Client: QueueClient;

    /// Opens a new client. Each call yields an independent connection.
    fn create_client(&self) -> Self::Client;
}
