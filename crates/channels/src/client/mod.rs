mod wait_options;

pub use wait_options::{ResponseInspector, WaitOptions};

use crate::channel::{new_reply_queue_name, publish_queue_name};
use crate::error::{Error, transport};

use std::time::Duration;

use bytes::Bytes;
use courier_mq::{MessageBody, MessageService, Outbound, QueueClient, ReplyMessage};
use tracing::{debug, trace};

/// Publishes to channels and correlates replies with their requests.
///
/// Owns exactly one connection of the underlying service, released when the
/// client is dropped.
#[derive(Debug)]
pub struct ChannelClient<C: QueueClient> {
    client: C,
}

impl<C: QueueClient> ChannelClient<C> {
    /// Opens a connection on `service`.
    pub fn new<S>(service: &S) -> Self
    where
        S: MessageService<Client = C>,
    {
        Self::from_client(service.create_client())
    }

    /// Wraps an already open connection.
    pub const fn from_client(client: C) -> Self {
        Self { client }
    }

    /// The underlying connection.
    pub const fn inner(&self) -> &C {
        &self.client
    }

    /// Publishes a message to `channel` without waiting for an answer.
    ///
    /// # Errors
    ///
    /// Fails if `channel` is empty, if encoding fails or if the transport
    /// rejects the publish.
    pub async fn publish_to_channel<T: MessageBody>(
        &self,
        channel: &str,
        outbound: Outbound<T>,
    ) -> Result<(), Error> {
        if channel.is_empty() {
            return Err(Error::EmptyChannel);
        }

        let message = outbound.into_message();
        let queue_name = publish_queue_name::<T>(channel, message.priority);

        trace!("publishing {} {} to {}", T::TYPE_NAME, message.id, queue_name);

        self.client
            .publish(&queue_name, message.to_bytes()?)
            .await
            .map_err(transport)
    }

    /// Publishes a request to `channel` and waits for its reply.
    ///
    /// Returns `Ok(None)` when the timeout elapses without a reply.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] when the handler replied with an error,
    /// [`Error::Cancelled`] when the wait was cancelled, and
    /// [`Error::EmptyChannel`] before publishing anything to an empty channel.
    pub async fn publish_and_wait<Req, Resp>(
        &self,
        channel: &str,
        outbound: Outbound<Req>,
        options: WaitOptions<Resp>,
    ) -> Result<Option<Resp>, Error>
    where
        Req: MessageBody,
        Resp: MessageBody,
    {
        if channel.is_empty() {
            return Err(Error::EmptyChannel);
        }

        let WaitOptions {
            timeout,
            cancellation,
            inspect,
        } = options;

        if cancellation.as_ref().is_some_and(|token| token.is_cancelled()) {
            return Err(Error::Cancelled);
        }

        let reply_to = new_reply_queue_name();
        let message = outbound.into_message().with_reply_to(reply_to.as_str());
        let request_id = message.id;
        let queue_name = publish_queue_name::<Req>(channel, message.priority);

        self.client
            .publish(&queue_name, message.to_bytes()?)
            .await
            .map_err(transport)?;

        debug!(
            "sent {} {} to {}, waiting on {}",
            Req::TYPE_NAME,
            request_id,
            queue_name,
            reply_to
        );

        let received = match cancellation {
            Some(token) => {
                tokio::select! {
                    biased;
                    () = token.cancelled() => None,
                    result = self.client.blocking_get(&reply_to, timeout) => Some(result),
                }
            }
            None => Some(self.client.blocking_get(&reply_to, timeout).await),
        };

        // Cancelled: drain the reply queue so the transport can forget it.
        let Some(received) = received else {
            let _ = self.client.try_get(&reply_to).await;
            return Err(Error::Cancelled);
        };
        let received = received.map_err(transport)?;

        let Some(bytes) = received else {
            debug!("no reply to {} {} within {:?}", Req::TYPE_NAME, request_id, timeout);
            return Ok(None);
        };

        let reply = ReplyMessage::<Resp>::from_bytes(&bytes)?;

        if let Some(error) = reply.error {
            return Err(Error::Remote(error));
        }

        if let Some(inspect) = inspect {
            inspect(&reply);
        }

        reply.body.map(Some).ok_or(Error::MissingReplyBody)
    }

    /// Publishes raw bytes to a queue.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects the publish.
    pub async fn publish(&self, queue_name: &str, bytes: Bytes) -> Result<(), Error> {
        self.client.publish(queue_name, bytes).await.map_err(transport)
    }

    /// Notifies watchers of a queue.
    ///
    /// # Errors
    ///
    /// Fails if the transport rejects the notification.
    pub async fn notify(&self, queue_name: &str, bytes: Bytes) -> Result<(), Error> {
        self.client.notify(queue_name, bytes).await.map_err(transport)
    }

    /// Waits for an entry on a queue.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails.
    pub async fn get(
        &self,
        queue_name: &str,
        timeout: Option<Duration>,
    ) -> Result<Option<Bytes>, Error> {
        self.client
            .blocking_get(queue_name, timeout)
            .await
            .map_err(transport)
    }

    /// Takes an entry from a queue if one is available.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails.
    pub async fn try_get(&self, queue_name: &str) -> Result<Option<Bytes>, Error> {
        self.client.try_get(queue_name).await.map_err(transport)
    }

    /// Waits until any of `queue_names` is notified and returns its name.
    ///
    /// # Errors
    ///
    /// Fails if the transport fails.
    pub async fn wait_for_notify_on_any(&self, queue_names: &[String]) -> Result<String, Error> {
        self.client
            .wait_for_notify_on_any(queue_names)
            .await
            .map_err(transport)
    }
}
