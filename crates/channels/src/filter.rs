use crate::registration::{HandlerOptions, ProcessError, ProcessFn};

use std::sync::Arc;

use courier_mq::Message;
use futures::future::BoxFuture;

/// Composes the request and response filters of `options` around
/// `process_fn`.
///
/// The request filter runs on every attempt before processing and may reject
/// the message by returning an error. The response filter runs once on a
/// successful result. Without filters `process_fn` is returned unchanged.
pub(crate) fn apply_filters<T, R>(
    process_fn: &ProcessFn<T, R>,
    options: &HandlerOptions<T, R>,
) -> ProcessFn<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    if options.request_filter.is_none() && options.response_filter.is_none() {
        return process_fn.clone();
    }

    let process_fn = process_fn.clone();
    let request_filter = options.request_filter.clone();
    let response_filter = options.response_filter.clone();

    Arc::new(move |message: Message<T>| -> BoxFuture<'static, Result<R, ProcessError>> {
        let process_fn = process_fn.clone();
        let request_filter = request_filter.clone();
        let response_filter = response_filter.clone();

        Box::pin(async move {
            let message = match &request_filter {
                Some(filter) => filter(message)?,
                None => message,
            };

            let response = process_fn(message).await?;

            Ok::<R, ProcessError>(match &response_filter {
                Some(filter) => filter(response),
                None => response,
            })
        })
    })
}
