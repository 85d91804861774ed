use std::error::Error as StdError;
use std::fmt::{self, Debug};
use std::sync::Arc;

use courier_mq::{Headers, Message};
use futures::future::BoxFuture;

/// Additional attempts after the first failure, for a total of three.
pub const DEFAULT_RETRY_COUNT: usize = 2;

/// Error raised by a processing callback or a request filter.
pub type ProcessError = Box<dyn StdError + Send + Sync>;

/// The user callback processing a request into a response.
pub type ProcessFn<T, R> =
    Arc<dyn Fn(Message<T>) -> BoxFuture<'static, Result<R, ProcessError>> + Send + Sync>;

/// Rewrites or validates a request before each processing attempt.
pub type RequestFilter<T> =
    Arc<dyn Fn(Message<T>) -> Result<Message<T>, ProcessError> + Send + Sync>;

/// Transforms a successful response before it is sent back.
pub type ResponseFilter<R> = Arc<dyn Fn(R) -> R + Send + Sync>;

/// Rewrites or validates request headers. Not tied to a message type, so a
/// host can apply one to every handler it registers.
pub type RequestHeaderFilter =
    Arc<dyn Fn(&mut Headers) -> Result<(), ProcessError> + Send + Sync>;

/// Rewrites the headers of every reply a handler sends.
pub type ReplyHeaderFilter = Arc<dyn Fn(&mut Headers) + Send + Sync>;

/// Called once with the request and the last error after every attempt failed.
pub type ExceptionFn<T> = Arc<dyn Fn(&Message<T>, &ProcessError) + Send + Sync>;

/// Per-registration options. Everything except `retry_count` is absent by
/// default.
pub struct HandlerOptions<T, R> {
    /// Attempts made after the first one fails.
    pub retry_count: usize,
    /// Runs before every attempt, always on the original request.
    pub request_filter: Option<RequestFilter<T>>,
    /// Runs once after a successful attempt.
    pub response_filter: Option<ResponseFilter<R>>,
    /// Runs once after the final failed attempt.
    pub exception_fn: Option<ExceptionFn<T>>,
    /// Runs on every reply before it is published, error replies included.
    pub reply_header_filter: Option<ReplyHeaderFilter>,
}

impl<T, R> HandlerOptions<T, R> {
    /// Sets the number of additional attempts.
    #[must_use]
    pub const fn with_retry_count(mut self, retry_count: usize) -> Self {
        self.retry_count = retry_count;
        self
    }

    /// Sets the request filter.
    #[must_use]
    pub fn with_request_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(Message<T>) -> Result<Message<T>, ProcessError> + Send + Sync + 'static,
    {
        self.request_filter = Some(Arc::new(filter));
        self
    }

    /// Sets the response filter.
    #[must_use]
    pub fn with_response_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(R) -> R + Send + Sync + 'static,
    {
        self.response_filter = Some(Arc::new(filter));
        self
    }

    /// Sets the exception callback.
    #[must_use]
    pub fn with_exception_fn<F>(mut self, exception_fn: F) -> Self
    where
        F: Fn(&Message<T>, &ProcessError) + Send + Sync + 'static,
    {
        self.exception_fn = Some(Arc::new(exception_fn));
        self
    }

    /// Sets the reply header filter.
    #[must_use]
    pub fn with_reply_header_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut Headers) + Send + Sync + 'static,
    {
        self.reply_header_filter = Some(Arc::new(filter));
        self
    }
}

impl<T: 'static, R> HandlerOptions<T, R> {
    /// Fills the request filter and reply header filter from host-wide header
    /// filters when they are not already set.
    pub(crate) fn or_header_filters(
        mut self,
        request: Option<&RequestHeaderFilter>,
        reply: Option<&ReplyHeaderFilter>,
    ) -> Self {
        if self.request_filter.is_none() {
            self.request_filter = request.map(|filter| {
                let filter = filter.clone();
                let request_filter: RequestFilter<T> =
                    Arc::new(move |mut message: Message<T>| {
                        filter(&mut message.headers)?;
                        Ok(message)
                    });
                request_filter
            });
        }
        if self.reply_header_filter.is_none() {
            self.reply_header_filter = reply.cloned();
        }
        self
    }
}

impl<T, R> Default for HandlerOptions<T, R> {
    fn default() -> Self {
        Self {
            retry_count: DEFAULT_RETRY_COUNT,
            request_filter: None,
            response_filter: None,
            exception_fn: None,
            reply_header_filter: None,
        }
    }
}

impl<T, R> Clone for HandlerOptions<T, R> {
    fn clone(&self) -> Self {
        Self {
            retry_count: self.retry_count,
            request_filter: self.request_filter.clone(),
            response_filter: self.response_filter.clone(),
            exception_fn: self.exception_fn.clone(),
            reply_header_filter: self.reply_header_filter.clone(),
        }
    }
}

impl<T, R> Debug for HandlerOptions<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerOptions")
            .field("retry_count", &self.retry_count)
            .field("request_filter", &self.request_filter.is_some())
            .field("response_filter", &self.response_filter.is_some())
            .field("exception_fn", &self.exception_fn.is_some())
            .field("reply_header_filter", &self.reply_header_filter.is_some())
            .finish()
    }
}

/// The binding of a message type to a channel, a callback and its options.
///
/// Never mutated; reconfiguring builds a replacement.
pub struct Registration<T, R> {
    pub(crate) channel: String,
    pub(crate) process_fn: ProcessFn<T, R>,
    pub(crate) options: HandlerOptions<T, R>,
}

impl<T, R> Registration<T, R> {
    pub(crate) fn new(
        channel: String,
        process_fn: ProcessFn<T, R>,
        options: HandlerOptions<T, R>,
    ) -> Self {
        Self {
            channel,
            process_fn,
            options,
        }
    }

    /// Channel the handler listens on.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Options of the registration.
    #[must_use]
    pub const fn options(&self) -> &HandlerOptions<T, R> {
        &self.options
    }

    pub(crate) fn with_options<F>(&self, change: F) -> Self
    where
        F: FnOnce(&mut HandlerOptions<T, R>),
    {
        let mut options = self.options.clone();
        change(&mut options);

        Self {
            channel: self.channel.clone(),
            process_fn: self.process_fn.clone(),
            options,
        }
    }
}

impl<T, R> Debug for Registration<T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("channel", &self.channel)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
