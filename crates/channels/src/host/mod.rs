mod options;

pub use options::HostOptions;

use crate::client::ChannelClient;
use crate::error::Error;
use crate::factory::MessageHandler;
use crate::registration::{
    HandlerOptions, ProcessError, ReplyHeaderFilter, RequestHeaderFilter,
};
use crate::registry::{HandlerRegistry, RegistrationHandle};
use crate::stats::HandlerStats;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use courier_mq::{Headers, Message, MessageBody, MessageService, QueueClient};
use futures::future::select_all;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Reference dispatch host.
///
/// Owns a handler registry and, once started, runs worker tasks that take
/// messages off every handler's channel-scoped queues and process them.
pub struct MqHost<S: MessageService> {
    options: HostOptions,
    registry: HandlerRegistry<S::Client>,
    reply_header_filter: Option<ReplyHeaderFilter>,
    request_header_filter: Option<RequestHeaderFilter>,
    service: S,
    shutdown_token: CancellationToken,
    task_tracker: TaskTracker,
}

impl<S: MessageService> MqHost<S> {
    /// Creates a host dispatching over `service`.
    pub fn new(service: S, options: HostOptions) -> Self {
        Self {
            options,
            registry: HandlerRegistry::new(),
            reply_header_filter: None,
            request_header_filter: None,
            service,
            shutdown_token: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Runs `filter` on the headers of every request, before each attempt,
    /// for handlers registered afterwards without their own request filter.
    /// An error fails the attempt.
    #[must_use]
    pub fn with_request_header_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut Headers) -> Result<(), ProcessError> + Send + Sync + 'static,
    {
        self.request_header_filter = Some(Arc::new(filter));
        self
    }

    /// Runs `filter` on the headers of every reply sent by handlers
    /// registered afterwards without their own reply header filter.
    #[must_use]
    pub fn with_reply_header_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&mut Headers) + Send + Sync + 'static,
    {
        self.reply_header_filter = Some(Arc::new(filter));
        self
    }

    /// The host's registry.
    pub const fn registry(&self) -> &HandlerRegistry<S::Client> {
        &self.registry
    }

    /// The host's options.
    pub const fn options(&self) -> &HostOptions {
        &self.options
    }

    /// Registers a handler of `T` on `channel` with the host's default
    /// retry count and header filters.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub fn register_handler_to_channel<T, R, F, Fut, E>(
        &self,
        channel: &str,
        process_fn: F,
    ) -> Result<RegistrationHandle<S::Client, T, R>, Error>
    where
        T: MessageBody,
        R: MessageBody,
        F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<ProcessError> + 'static,
    {
        let options = HandlerOptions::default().with_retry_count(self.options.retry_count);
        self.registry
            .register(channel, process_fn, self.with_header_filters(options))
    }

    /// Registers a handler of `T` on `channel` with explicit options.
    ///
    /// The host's header filters fill in only the filters `options` leaves
    /// unset.
    ///
    /// # Errors
    ///
    /// See [`HandlerRegistry::register`].
    pub fn register_handler_to_channel_with_options<T, R, F, Fut, E>(
        &self,
        channel: &str,
        process_fn: F,
        options: HandlerOptions<T, R>,
    ) -> Result<RegistrationHandle<S::Client, T, R>, Error>
    where
        T: MessageBody,
        R: MessageBody,
        F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<ProcessError> + 'static,
    {
        self.registry
            .register(channel, process_fn, self.with_header_filters(options))
    }

    fn with_header_filters<T: 'static, R>(
        &self,
        options: HandlerOptions<T, R>,
    ) -> HandlerOptions<T, R> {
        options.or_header_filters(
            self.request_header_filter.as_ref(),
            self.reply_header_filter.as_ref(),
        )
    }

    /// A correlation client over a fresh connection of this host's service.
    pub fn create_message_queue_client(&self) -> ChannelClient<S::Client> {
        ChannelClient::new(&self.service)
    }

    /// Seals the registry and spawns the workers.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::HostStarted`] if the host was already started.
    pub fn start(&self) -> Result<(), Error> {
        if self.task_tracker.is_closed() || !self.registry.seal() {
            return Err(Error::HostStarted);
        }

        let policy = self.options.failure_policy();
        let poll_interval = self.options.poll_interval();
        let workers = self.options.workers_per_handler.max(1);

        for factory in self.registry.handler_factories() {
            info!(
                "starting {} worker(s) for {} on channel {}",
                workers,
                factory.message_type(),
                factory.channel()
            );

            for _ in 0..workers {
                let handler = factory.create_message_handler(policy);
                let client = self.service.create_client();
                let shutdown_token = self.shutdown_token.clone();

                self.task_tracker.spawn(run_worker(
                    handler,
                    client,
                    poll_interval,
                    shutdown_token,
                ));
            }
        }

        self.task_tracker.close();

        Ok(())
    }

    /// Stops the workers and waits for them to finish.
    ///
    /// A message being processed is finished before its worker exits.
    pub async fn shutdown(&self) {
        info!("host shutting down");

        self.shutdown_token.cancel();
        self.task_tracker.close();
        self.task_tracker.wait().await;

        info!("host shutdown");
    }

    /// Waits until every worker has exited.
    ///
    /// Does not return before `start` or `shutdown` has been called.
    pub async fn wait(&self) {
        self.task_tracker.wait().await;
    }

    /// Whether `start` has been called.
    pub fn is_started(&self) -> bool {
        self.registry.is_sealed()
    }

    /// A snapshot of every handler's counters.
    pub fn stats(&self) -> Vec<HandlerStats> {
        self.registry
            .handler_factories()
            .iter()
            .map(|factory| factory.stats())
            .collect()
    }
}

impl<S: MessageService> std::fmt::Debug for MqHost<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqHost")
            .field("options", &self.options)
            .field("registry", &self.registry)
            .field("reply_header_filter", &self.reply_header_filter.is_some())
            .field("request_header_filter", &self.request_header_filter.is_some())
            .field("shutdown_token", &self.shutdown_token)
            .field("task_tracker", &self.task_tracker)
            .finish_non_exhaustive()
    }
}

async fn run_worker<C: QueueClient>(
    handler: Box<dyn MessageHandler<C>>,
    client: C,
    poll_interval: Duration,
    shutdown_token: CancellationToken,
) {
    let queue_names = handler.process_queue_names().to_vec();
    if queue_names.is_empty() {
        return;
    }

    debug!("worker listening on {:?}", queue_names);

    while !shutdown_token.is_cancelled() {
        match next_message(&client, &queue_names, poll_interval, &shutdown_token).await {
            Ok(Some(bytes)) => {
                handler.process_message(&client, bytes).await;
            }
            Ok(None) => {}
            Err(e) => {
                error!(
                    "worker for {} on channel {} failed to receive: {}",
                    handler.message_type(),
                    handler.channel(),
                    e
                );

                tokio::select! {
                    biased;
                    () = shutdown_token.cancelled() => break,
                    () = tokio::time::sleep(poll_interval) => {}
                }
            }
        }
    }

    debug!("worker for {} exited", handler.message_type());
}

/// Drains the queues in order, then blocks on all of them at once.
async fn next_message<C: QueueClient>(
    client: &C,
    queue_names: &[String],
    poll_interval: Duration,
    shutdown_token: &CancellationToken,
) -> Result<Option<Bytes>, C::Error> {
    for queue_name in queue_names {
        if let Some(bytes) = client.try_get(queue_name).await? {
            return Ok(Some(bytes));
        }
    }

    let waits = queue_names
        .iter()
        .map(|queue_name| client.blocking_get(queue_name, Some(poll_interval)));

    tokio::select! {
        biased;
        () = shutdown_token.cancelled() => Ok(None),
        (result, _, _) = select_all(waits) => result,
    }
}
