use crate::channel::resolve_queue_name;
use crate::filter::apply_filters;
use crate::registration::{ProcessError, ProcessFn, Registration};
use crate::stats::{HandlerCounters, HandlerStats};

use std::any::Any;
use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use courier_mq::{Message, MessageBody, MessageError, QueueClient, QueueNames, ReplyMessage};
use futures::FutureExt;
use parking_lot::RwLock;
use tracing::{debug, error, warn};

/// Error code used for failures that are not a [`MessageError`].
pub const EXCEPTION_ERROR_CODE: &str = "Exception";

/// What a handler does with a request after its final failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct FailurePolicy {
    /// Send an error reply when the request carries a reply address.
    pub reply_with_error: bool,
    /// Move the failed request to the dead-letter queue.
    pub dead_letter_failures: bool,
}

impl Default for FailurePolicy {
    fn default() -> Self {
        Self {
            reply_with_error: true,
            dead_letter_failures: true,
        }
    }
}

/// How a single inbound message was handled.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ProcessOutcome {
    /// Processed successfully after `attempts` invocations.
    Processed {
        /// Total invocations of the callback.
        attempts: usize,
    },
    /// Every attempt failed.
    Failed {
        /// Total invocations of the callback.
        attempts: usize,
    },
    /// The bytes were not an envelope of the handled type.
    Undecodable,
}

/// Processes raw messages taken off a handler's queues.
#[async_trait]
pub trait MessageHandler<C>: Send + Sync
where
    C: QueueClient,
{
    /// Type tag of the handled message.
    fn message_type(&self) -> &'static str;

    /// Channel the handler listens on.
    fn channel(&self) -> &str;

    /// Channel-scoped queues to consume, in drain order.
    fn process_queue_names(&self) -> &[String];

    /// Decodes, processes and answers one message.
    ///
    /// Failures are contained here. Replies and dead letters are published
    /// through `client`.
    async fn process_message(&self, client: &C, bytes: Bytes) -> ProcessOutcome;
}

/// Builds message handlers for one registration.
pub trait HandlerFactory<C>: Send + Sync
where
    C: QueueClient,
{
    /// Type tag of the handled message.
    fn message_type(&self) -> &'static str;

    /// Channel of the registration.
    fn channel(&self) -> String;

    /// Creates a handler from the current registration.
    fn create_message_handler(&self, policy: FailurePolicy) -> Box<dyn MessageHandler<C>>;

    /// Counters shared by every handler created by this factory.
    fn stats(&self) -> HandlerStats;
}

/// Factory for handlers of requests `T` answered with `R`.
pub struct ChannelHandlerFactory<T, R> {
    registration: RwLock<Arc<Registration<T, R>>>,
    counters: Arc<HandlerCounters>,
}

impl<T, R> ChannelHandlerFactory<T, R> {
    pub(crate) fn new(registration: Registration<T, R>) -> Self {
        Self {
            registration: RwLock::new(Arc::new(registration)),
            counters: Arc::new(HandlerCounters::default()),
        }
    }

    /// The current registration.
    pub fn registration(&self) -> Arc<Registration<T, R>> {
        self.registration.read().clone()
    }

    pub(crate) fn replace_registration(&self, registration: Registration<T, R>) {
        *self.registration.write() = Arc::new(registration);
    }
}

impl<C, T, R> HandlerFactory<C> for ChannelHandlerFactory<T, R>
where
    C: QueueClient,
    T: MessageBody,
    R: MessageBody,
{
    fn message_type(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn channel(&self) -> String {
        self.registration.read().channel.clone()
    }

    fn create_message_handler(&self, policy: FailurePolicy) -> Box<dyn MessageHandler<C>> {
        Box::new(ChannelMessageHandler::new(
            self.registration(),
            self.counters.clone(),
            policy,
        ))
    }

    fn stats(&self) -> HandlerStats {
        self.counters
            .snapshot(T::TYPE_NAME, &self.registration.read().channel)
    }
}

/// Runs the retry loop and failure policy for one registration snapshot.
pub struct ChannelMessageHandler<C, T, R> {
    registration: Arc<Registration<T, R>>,
    process_fn: ProcessFn<T, R>,
    process_queue_names: Vec<String>,
    dead_letter_queue: String,
    counters: Arc<HandlerCounters>,
    policy: FailurePolicy,
    _client: PhantomData<fn(&C)>,
}

impl<C, T, R> ChannelMessageHandler<C, T, R>
where
    C: QueueClient,
    T: MessageBody,
    R: MessageBody,
{
    fn new(
        registration: Arc<Registration<T, R>>,
        counters: Arc<HandlerCounters>,
        policy: FailurePolicy,
    ) -> Self {
        let names = QueueNames::of::<T>();
        let process_queue_names = names
            .process_queue_names()
            .iter()
            .map(|name| resolve_queue_name(&registration.channel, name))
            .collect();
        let dead_letter_queue = resolve_queue_name(&registration.channel, &names.dlq);
        let process_fn = apply_filters(&registration.process_fn, &registration.options);

        Self {
            registration,
            process_fn,
            process_queue_names,
            dead_letter_queue,
            counters,
            policy,
            _client: PhantomData,
        }
    }

    async fn reply_success(&self, client: &C, request: &Message<T>, response: R) {
        let Some(reply_to) = &request.reply_to else {
            return;
        };

        let reply: ReplyMessage<R> = Message::success(request.id, response);
        self.publish_reply(client, reply_to, reply).await;
    }

    async fn handle_failure(&self, client: &C, request: Message<T>, error: &ProcessError) {
        self.counters.record_failed();
        error!(
            "{} on channel {} failed every attempt: {}",
            T::TYPE_NAME,
            self.registration.channel,
            error
        );

        if let Some(exception_fn) = &self.registration.options.exception_fn {
            let called = panic::catch_unwind(AssertUnwindSafe(|| exception_fn(&request, error)));
            if called.is_err() {
                error!("exception callback for {} panicked", T::TYPE_NAME);
            }
        }

        let message_error = to_message_error(error);

        if self.policy.reply_with_error {
            if let Some(reply_to) = &request.reply_to {
                let reply: ReplyMessage<R> = Message::failure(request.id, message_error.clone());
                self.publish_reply(client, reply_to, reply).await;
            }
        }

        if self.policy.dead_letter_failures {
            match request.with_error(message_error).to_bytes() {
                Ok(bytes) => self.dead_letter(client, bytes).await,
                Err(e) => error!("failed to encode dead letter for {}: {}", T::TYPE_NAME, e),
            }
        }
    }

    // A panicking callback counts as a failed attempt.
    async fn attempt(&self, request: Message<T>) -> Result<R, ProcessError> {
        AssertUnwindSafe(async { (self.process_fn)(request).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(panic_error(panic.as_ref())))
    }

    async fn publish_reply(&self, client: &C, reply_to: &str, mut reply: ReplyMessage<R>) {
        if let Some(filter) = &self.registration.options.reply_header_filter {
            filter(&mut reply.headers);
        }

        let bytes = match reply.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("failed to encode reply to {}: {}", reply_to, e);
                return;
            }
        };

        if let Err(e) = client.publish(reply_to, bytes).await {
            error!("failed to publish reply to {}: {}", reply_to, e);
        }
    }

    async fn dead_letter(&self, client: &C, bytes: Bytes) {
        if let Err(e) = client.publish(&self.dead_letter_queue, bytes).await {
            error!(
                "failed to publish dead letter to {}: {}",
                self.dead_letter_queue, e
            );
        }
    }
}

#[async_trait]
impl<C, T, R> MessageHandler<C> for ChannelMessageHandler<C, T, R>
where
    C: QueueClient,
    T: MessageBody,
    R: MessageBody,
{
    fn message_type(&self) -> &'static str {
        T::TYPE_NAME
    }

    fn channel(&self) -> &str {
        &self.registration.channel
    }

    fn process_queue_names(&self) -> &[String] {
        &self.process_queue_names
    }

    async fn process_message(&self, client: &C, bytes: Bytes) -> ProcessOutcome {
        self.counters.record_received();

        let request = match Message::<T>::from_bytes(&bytes) {
            Ok(request) => request,
            Err(e) => {
                self.counters.record_failed();
                error!(
                    "failed to decode {} on channel {}: {}",
                    T::TYPE_NAME,
                    self.registration.channel,
                    e
                );
                if self.policy.dead_letter_failures {
                    self.dead_letter(client, bytes).await;
                }
                return ProcessOutcome::Undecodable;
            }
        };

        debug!(
            "processing {} {} on channel {}",
            T::TYPE_NAME,
            request.id,
            self.registration.channel
        );

        let retry_count = self.registration.options.retry_count;
        let mut attempts = 1;

        let last_error = loop {
            match self.attempt(request.clone()).await {
                Ok(response) => {
                    self.counters.record_processed();
                    self.reply_success(client, &request, response).await;
                    return ProcessOutcome::Processed { attempts };
                }
                Err(error) if attempts > retry_count => break error,
                Err(error) => {
                    warn!(
                        "attempt {} of {} for {} {} failed: {}",
                        attempts,
                        retry_count.saturating_add(1),
                        T::TYPE_NAME,
                        request.id,
                        error
                    );
                    self.counters.record_retry();
                    attempts += 1;
                }
            }
        };

        self.handle_failure(client, request, &last_error).await;

        ProcessOutcome::Failed { attempts }
    }
}

fn panic_error(panic: &(dyn Any + Send)) -> ProcessError {
    let message = panic
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());

    format!("handler panicked: {message}").into()
}

/// Converts a processing failure into the record carried by error replies.
///
/// A returned [`MessageError`] is forwarded as is.
#[must_use]
pub fn to_message_error(error: &ProcessError) -> MessageError {
    error.downcast_ref::<MessageError>().map_or_else(
        || MessageError::new(EXCEPTION_ERROR_CODE, error.to_string()),
        Clone::clone,
    )
}
