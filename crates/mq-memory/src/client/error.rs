use courier_mq::QueueClientError;
use thiserror::Error;

/// Errors that can occur in an in-memory client.
#[derive(Clone, Debug, Error)]
pub enum Error {
    /// The broker was closed.
    #[error("broker closed")]
    Closed,
}

impl QueueClientError for Error {}
