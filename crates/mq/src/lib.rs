//! Abstract interface for blocking-queue message transports.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Queue clients move raw bytes between named queues.
pub mod client;

/// Envelope encoding and decoding.
pub mod codec;

/// The message envelope exchanged over a transport.
pub mod message;

/// Per-type base queue names.
pub mod queue_names;

/// Services hand out queue clients.
pub mod service;

pub use client::{QueueClient, QueueClientError};
pub use codec::CodecError;
pub use message::{Headers, Message, MessageError, Outbound, ReplyMessage};
pub use queue_names::{MessageBody, QueueNames};
pub use service::MessageService;
