use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Free-form message headers.
pub type Headers = HashMap<String, String>;

/// Reply envelope. The body is absent when the reply carries an error.
pub type ReplyMessage<R> = Message<Option<R>>;

/// Structured error record carried by a failed reply.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
#[error("{error_code}: {message}")]
pub struct MessageError {
    /// Machine readable error code.
    pub error_code: String,
    /// Human readable description.
    pub message: String,
    /// Optional trace captured by the failing handler.
    pub stack_trace: Option<String>,
}

impl MessageError {
    /// Creates a new error record without a stack trace.
    pub fn new<C, M>(error_code: C, message: M) -> Self
    where
        C: Into<String>,
        M: Into<String>,
    {
        Self {
            error_code: error_code.into(),
            message: message.into(),
            stack_trace: None,
        }
    }

    /// Attaches a stack trace.
    #[must_use]
    pub fn with_stack_trace<S: Into<String>>(mut self, stack_trace: S) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

/// The unit exchanged over a transport.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Message<T> {
    /// Unique identifier assigned at creation.
    pub id: Uuid,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Messages with a positive priority are routed to the priority queue.
    pub priority: i64,
    /// Queue the receiver should reply to.
    pub reply_to: Option<String>,
    /// Id of the request this message answers.
    pub reply_id: Option<Uuid>,
    /// Populated by a handler that failed every attempt.
    pub error: Option<MessageError>,
    /// Free-form headers.
    pub headers: Headers,
    /// The typed payload.
    pub body: T,
}

impl<T> Message<T> {
    /// Wraps a body in a fresh envelope.
    pub fn new(body: T) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            priority: 0,
            reply_to: None,
            reply_id: None,
            error: None,
            headers: Headers::new(),
            body,
        }
    }

    /// Sets the priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the reply address.
    #[must_use]
    pub fn with_reply_to<S: Into<String>>(mut self, reply_to: S) -> Self {
        self.reply_to = Some(reply_to.into());
        self
    }

    /// Sets the error record.
    #[must_use]
    pub fn with_error(mut self, error: MessageError) -> Self {
        self.error = Some(error);
        self
    }

    /// Adds a header, replacing any previous value.
    #[must_use]
    pub fn with_header<K, V>(mut self, key: K, value: V) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Consumes the envelope and returns the body.
    pub fn into_body(self) -> T {
        self.body
    }
}

impl<R> Message<Option<R>> {
    /// Builds a successful reply to the request `reply_id`.
    pub fn success(reply_id: Uuid, body: R) -> Self {
        let mut message = Self::new(Some(body));
        message.reply_id = Some(reply_id);
        message
    }

    /// Builds an error reply to the request `reply_id`.
    pub fn failure(reply_id: Uuid, error: MessageError) -> Self {
        let mut message = Self::new(None).with_error(error);
        message.reply_id = Some(reply_id);
        message
    }
}

/// What a publisher hands over: either a ready envelope or a bare body.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound<T> {
    /// Already an envelope; published as is.
    Envelope(Message<T>),
    /// A raw payload to be wrapped in a fresh envelope.
    Body(T),
}

impl<T> Outbound<T> {
    /// Resolves to the envelope that will be published.
    pub fn into_message(self) -> Message<T> {
        match self {
            Self::Envelope(message) => message,
            Self::Body(body) => Message::new(body),
        }
    }
}

impl<T> From<Message<T>> for Outbound<T> {
    fn from(message: Message<T>) -> Self {
        Self::Envelope(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_body_is_wrapped_in_fresh_envelope() {
        let first = Outbound::Body("hello").into_message();
        let second = Outbound::Body("hello").into_message();

        assert_eq!(first.body, "hello");
        assert!(first.reply_to.is_none());
        assert!(first.error.is_none());
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn test_envelope_passes_through() {
        let message = Message::new(7).with_priority(3).with_header("k", "v");
        let id = message.id;

        let resolved = Outbound::from(message).into_message();

        assert_eq!(resolved.id, id);
        assert_eq!(resolved.priority, 3);
        assert_eq!(resolved.headers.get("k").map(String::as_str), Some("v"));
    }

    #[test]
    fn test_failure_reply() {
        let request = Message::new("ping");
        let error = MessageError::new("Timeout", "upstream timed out");

        let reply = ReplyMessage::<String>::failure(request.id, error.clone());

        assert_eq!(reply.reply_id, Some(request.id));
        assert_eq!(reply.error, Some(error));
        assert!(reply.body.is_none());
    }
}
