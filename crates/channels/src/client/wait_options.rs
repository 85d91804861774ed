use std::fmt::{self, Debug};
use std::time::Duration;

use courier_mq::ReplyMessage;
use tokio_util::sync::CancellationToken;

/// Observes the full reply envelope before its body is returned.
pub type ResponseInspector<R> = Box<dyn FnOnce(&ReplyMessage<R>) + Send>;

/// Options for [`ChannelClient::publish_and_wait`](super::ChannelClient::publish_and_wait).
pub struct WaitOptions<R> {
    /// How long to wait for the reply. `None` waits until one arrives.
    pub timeout: Option<Duration>,
    /// Abandons the wait when cancelled.
    pub cancellation: Option<CancellationToken>,
    /// Called once with a successful reply envelope. Error replies skip it.
    pub inspect: Option<ResponseInspector<R>>,
}

impl<R> WaitOptions<R> {
    /// Options with only a timeout.
    #[must_use]
    pub fn timeout(timeout: Duration) -> Self {
        Self::default().with_timeout(timeout)
    }

    /// Sets the timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancellation: CancellationToken) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    /// Sets the reply inspector.
    #[must_use]
    pub fn with_inspect<F>(mut self, inspect: F) -> Self
    where
        F: FnOnce(&ReplyMessage<R>) + Send + 'static,
    {
        self.inspect = Some(Box::new(inspect));
        self
    }
}

impl<R> Default for WaitOptions<R> {
    fn default() -> Self {
        Self {
            timeout: None,
            cancellation: None,
            inspect: None,
        }
    }
}

impl<R> Debug for WaitOptions<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitOptions")
            .field("timeout", &self.timeout)
            .field("cancellation", &self.cancellation)
            .field("inspect", &self.inspect.is_some())
            .finish()
    }
}
