//! Channel-scoped message routing over blocking-queue transports.
//!
//! Handlers are registered per message type on a named channel. Publishers
//! address a channel, and the layer derives the queue names both sides agree
//! on. A correlation client turns publish-then-wait into a typed
//! request/response call.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Queue name resolution for channels.
pub mod channel;

mod client;
mod error;

/// Handler factories and the retry wrapper.
pub mod factory;

mod filter;
mod host;

/// Registrations and their options.
pub mod registration;

mod registry;
mod stats;

pub use client::{ChannelClient, ResponseInspector, WaitOptions};
pub use error::Error;
pub use factory::{FailurePolicy, HandlerFactory, MessageHandler, ProcessOutcome};
pub use host::{HostOptions, MqHost};
pub use registration::{
    HandlerOptions, ProcessError, Registration, ReplyHeaderFilter, RequestHeaderFilter,
};
pub use registry::{HandlerRegistry, RegistrationHandle};
pub use stats::HandlerStats;
