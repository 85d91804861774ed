//! Derivation of transport queue names from a channel and a message type.
//!
//! A channel is not a transport object. It exists only as the prefix of
//! `<channel>_<base queue name>`, and publishers and consumers agree on a
//! queue purely by computing the same string. Channel names containing `_`
//! can collide with other (channel, type) pairs; keeping them apart is up to
//! the caller.

use courier_mq::{MessageBody, QueueNames};
use uuid::Uuid;

/// Separator between the channel and the base queue name.
pub const CHANNEL_SEPARATOR: char = '_';

/// Namespace of generated reply queues.
pub const REPLY_QUEUE_PREFIX: &str = "mq:tmp:";

/// Scopes a base queue name to a channel.
#[must_use]
pub fn resolve_queue_name(channel: &str, base_queue_name: &str) -> String {
    format!("{channel}{CHANNEL_SEPARATOR}{base_queue_name}")
}

/// The channel-scoped inbound queue of `T`.
#[must_use]
pub fn resolve<T: MessageBody>(channel: &str) -> String {
    resolve_queue_name(channel, &QueueNames::of::<T>().in_queue)
}

/// The channel-scoped queue a message of `T` with `priority` is published to.
#[must_use]
pub fn publish_queue_name<T: MessageBody>(channel: &str, priority: i64) -> String {
    let names = QueueNames::of::<T>();
    if priority > 0 {
        resolve_queue_name(channel, &names.priority)
    } else {
        resolve_queue_name(channel, &names.in_queue)
    }
}

/// A fresh reply address, unique per call.
#[must_use]
pub fn new_reply_queue_name() -> String {
    format!("{REPLY_QUEUE_PREFIX}{}", Uuid::new_v4().simple())
}
