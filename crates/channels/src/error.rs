use courier_mq::{CodecError, MessageError};
use thiserror::Error;

/// Errors that can occur in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The wait for a reply was cancelled by the caller.
    #[error("wait for reply was cancelled")]
    Cancelled,

    /// Envelope encoding or decoding failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A handler is already registered for the message type on this host.
    #[error("message handler has already been registered for type: {type_name}")]
    DuplicateHandler {
        /// Type tag of the message.
        type_name: &'static str,
    },

    /// The channel name was empty.
    #[error("channel name must not be empty")]
    EmptyChannel,

    /// The host has already started dispatching.
    #[error("host has already started dispatching")]
    HostStarted,

    /// A reply arrived with neither a body nor an error.
    #[error("reply carried neither a body nor an error")]
    MissingReplyBody,

    /// The remote handler replied with an error.
    #[error("remote handler failed: {0}")]
    Remote(MessageError),

    /// The underlying queue client failed.
    #[error("transport error: {0}")]
    Transport(String),
}

pub(crate) fn transport<E: std::error::Error>(error: E) -> Error {
    Error::Transport(error.to_string())
}
