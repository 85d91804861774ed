use crate::error::Error;
use crate::factory::{ChannelHandlerFactory, HandlerFactory};
use crate::registration::{HandlerOptions, ProcessError, ProcessFn, Registration};

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::future::Future;
use std::sync::Arc;

use courier_mq::{Message, MessageBody, QueueClient};
use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tracing::info;

struct RegistryState<C: QueueClient> {
    handlers: HashMap<TypeId, Arc<dyn HandlerFactory<C>>>,
    order: Vec<TypeId>,
    sealed: bool,
}

/// The set of message handlers owned by one host, keyed by message type.
///
/// At most one registration exists per message type. The registry is
/// sealed when its host starts dispatching; later mutation fails with
/// [`Error::HostStarted`].
pub struct HandlerRegistry<C: QueueClient> {
    state: Arc<Mutex<RegistryState<C>>>,
}

impl<C: QueueClient> HandlerRegistry<C> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState {
                handlers: HashMap::new(),
                order: Vec::new(),
                sealed: false,
            })),
        }
    }

    /// Registers `process_fn` as the handler of `T` on `channel`.
    ///
    /// # Errors
    ///
    /// Fails if `channel` is empty, if `T` already has a handler, or if the
    /// registry has been sealed.
    pub fn register<T, R, F, Fut, E>(
        &self,
        channel: &str,
        process_fn: F,
        options: HandlerOptions<T, R>,
    ) -> Result<RegistrationHandle<C, T, R>, Error>
    where
        T: MessageBody,
        R: MessageBody,
        F: Fn(Message<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
        E: Into<ProcessError> + 'static,
    {
        if channel.is_empty() {
            return Err(Error::EmptyChannel);
        }

        let process_fn: ProcessFn<T, R> = Arc::new(
            move |message: Message<T>| -> BoxFuture<'static, Result<R, ProcessError>> {
                process_fn(message)
                    .map(|result| result.map_err(Into::into))
                    .boxed()
            },
        );

        let mut state = self.state.lock();

        if state.sealed {
            return Err(Error::HostStarted);
        }

        let type_id = TypeId::of::<T>();
        if state.handlers.contains_key(&type_id) {
            return Err(Error::DuplicateHandler {
                type_name: T::TYPE_NAME,
            });
        }

        let factory = Arc::new(ChannelHandlerFactory::new(Registration::new(
            channel.to_string(),
            process_fn,
            options,
        )));
        state.handlers.insert(type_id, factory.clone());
        state.order.push(type_id);

        info!("registered handler for {} on channel {}", T::TYPE_NAME, channel);

        Ok(RegistrationHandle {
            state: self.state.clone(),
            factory,
        })
    }

    /// Whether `T` has a handler.
    #[must_use]
    pub fn contains<T: MessageBody>(&self) -> bool {
        self.state.lock().handlers.contains_key(&TypeId::of::<T>())
    }

    /// Number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state.lock().handlers.len()
    }

    /// Whether no handler has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.lock().handlers.is_empty()
    }

    /// One factory per registration, in registration order.
    #[must_use]
    pub fn handler_factories(&self) -> Vec<Arc<dyn HandlerFactory<C>>> {
        let state = self.state.lock();
        state
            .order
            .iter()
            .filter_map(|type_id| state.handlers.get(type_id).cloned())
            .collect()
    }

    /// Whether the registry has been sealed.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }

    /// Seals the registry. Returns `false` if it was already sealed.
    pub(crate) fn seal(&self) -> bool {
        let mut state = self.state.lock();
        !std::mem::replace(&mut state.sealed, true)
    }
}

impl<C: QueueClient> Default for HandlerRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: QueueClient> Clone for HandlerRegistry<C> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
        }
    }
}

impl<C: QueueClient> Debug for HandlerRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("HandlerRegistry")
            .field("handlers", &state.handlers.len())
            .field("sealed", &state.sealed)
            .finish()
    }
}

/// Reconfigures one registration until its host starts.
///
/// Every change swaps in a new registration; handlers already created keep
/// the one they were built from.
pub struct RegistrationHandle<C: QueueClient, T, R> {
    state: Arc<Mutex<RegistryState<C>>>,
    factory: Arc<ChannelHandlerFactory<T, R>>,
}

impl<C, T, R> RegistrationHandle<C, T, R>
where
    C: QueueClient,
    T: MessageBody,
    R: MessageBody,
{
    /// The current registration.
    #[must_use]
    pub fn registration(&self) -> Arc<Registration<T, R>> {
        self.factory.registration()
    }

    /// Sets the number of additional attempts.
    ///
    /// # Errors
    ///
    /// Fails once the host has started.
    pub fn set_retry_count(&self, retry_count: usize) -> Result<&Self, Error> {
        self.update(|options| options.retry_count = retry_count)
    }

    /// Sets the request filter.
    ///
    /// # Errors
    ///
    /// Fails once the host has started.
    pub fn set_request_filter<F>(&self, filter: F) -> Result<&Self, Error>
    where
        F: Fn(Message<T>) -> Result<Message<T>, ProcessError> + Send + Sync + 'static,
    {
        let filter = Arc::new(filter);
        self.update(|options| options.request_filter = Some(filter))
    }

    /// Sets the response filter.
    ///
    /// # Errors
    ///
    /// Fails once the host has started.
    pub fn set_response_filter<F>(&self, filter: F) -> Result<&Self, Error>
    where
        F: Fn(R) -> R + Send + Sync + 'static,
    {
        let filter = Arc::new(filter);
        self.update(|options| options.response_filter = Some(filter))
    }

    /// Sets the exception callback.
    ///
    /// # Errors
    ///
    /// Fails once the host has started.
    pub fn set_exception_fn<F>(&self, exception_fn: F) -> Result<&Self, Error>
    where
        F: Fn(&Message<T>, &ProcessError) + Send + Sync + 'static,
    {
        let exception_fn = Arc::new(exception_fn);
        self.update(|options| options.exception_fn = Some(exception_fn))
    }

    fn update<F>(&self, change: F) -> Result<&Self, Error>
    where
        F: FnOnce(&mut HandlerOptions<T, R>),
    {
        let state = self.state.lock();
        if state.sealed {
            return Err(Error::HostStarted);
        }

        let replacement = self.factory.registration().with_options(change);
        self.factory.replace_registration(replacement);

        Ok(self)
    }
}

impl<C: QueueClient, T, R> Debug for RegistrationHandle<C, T, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationHandle")
            .field("registration", &self.factory.registration())
            .finish()
    }
}
