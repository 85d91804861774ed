//! Three hosts across two channels sharing one in-memory broker.
//!
//! Run with `cargo run -p courier-channels --example two_channels`.

use std::time::Duration;

use courier_channels::{ChannelClient, HostOptions, MqHost, ProcessError, WaitOptions};
use courier_mq::{Message, MessageBody, Outbound};
use courier_mq_memory::{MemoryBroker, MemoryClient};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Clone, Debug, Deserialize, Serialize)]
struct Hello {
    message_id: u32,
    name: String,
}

impl MessageBody for Hello {
    const TYPE_NAME: &'static str = "Hello";
}

#[derive(Clone, Debug, Deserialize, Serialize)]
struct HelloResponse {
    result: String,
}

impl MessageBody for HelloResponse {
    const TYPE_NAME: &'static str = "HelloResponse";
}

fn create_host(broker: &MemoryBroker, channel: &'static str) -> MqHost<MemoryBroker> {
    let host = MqHost::new(broker.clone(), HostOptions::default());

    let registered =
        host.register_handler_to_channel(channel, move |message: Message<Hello>| async move {
            info!("{} host got message {}: {:?}", channel, message.body.message_id, message.body);
            Ok::<_, ProcessError>(HelloResponse {
                result: format!("Hello, {}", message.body.name),
            })
        });
    if let Err(e) = registered {
        warn!("failed to register handler: {}", e);
    }

    host
}

fn hello(message_id: u32, name: &str) -> Outbound<Hello> {
    Outbound::Body(Hello {
        message_id,
        name: name.to_string(),
    })
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt::init();

    let broker = MemoryBroker::new();

    let hosts = [
        create_host(&broker, "channel1"),
        create_host(&broker, "channel1"),
        create_host(&broker, "channel2"),
    ];

    // A host holds at most one handler per message type.
    let duplicate = hosts[0]
        .register_handler_to_channel("channel2", |message: Message<Hello>| async move {
            Ok::<_, ProcessError>(message.body)
        });
    if let Err(e) = duplicate {
        info!("second registration rejected: {}", e);
    }

    for host in &hosts {
        host.start()?;
    }

    let client: ChannelClient<MemoryClient> = ChannelClient::new(&broker);

    client
        .publish_to_channel("channel1", hello(1, "message1, channel1"))
        .await?;
    client
        .publish_to_channel("channel2", hello(2, "message2, channel2"))
        .await?;
    client
        .publish_to_channel("channel1", hello(3, "message3, channel1"))
        .await?;

    let response = client
        .publish_and_wait::<Hello, HelloResponse>(
            "channel1",
            hello(3, "message3, channel1"),
            WaitOptions::timeout(Duration::from_millis(1000)),
        )
        .await?;

    info!("response={:?}", response);

    for host in &hosts {
        host.shutdown().await;
        for stats in host.stats() {
            info!("{}", stats);
        }
    }

    Ok(())
}
