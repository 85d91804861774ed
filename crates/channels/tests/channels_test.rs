//! Channel isolation, registration rules and failure handling

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use assert_matches::assert_matches;
use courier_channels::{
    Error, HandlerOptions, HostOptions, MqHost, ProcessError, WaitOptions, channel,
};
use courier_mq::{Message, MessageBody, MessageService, Outbound, QueueClient};
use courier_mq_memory::MemoryBroker;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{sleep, timeout};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Greeting {
    name: String,
}

impl MessageBody for Greeting {
    const TYPE_NAME: &'static str = "Greeting";
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct GreetingResponse {
    result: String,
}

impl MessageBody for GreetingResponse {
    const TYPE_NAME: &'static str = "GreetingResponse";
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
struct Job {
    id: u32,
}

impl MessageBody for Job {
    const TYPE_NAME: &'static str = "Job";
}

fn fast_options() -> HostOptions {
    HostOptions {
        poll_interval_ms: 50,
        ..HostOptions::default()
    }
}

fn greeting(name: &str) -> Outbound<Greeting> {
    Outbound::Body(Greeting {
        name: name.to_string(),
    })
}

fn tagged_greeter(
    tag: &'static str,
) -> impl Fn(Message<Greeting>) -> std::future::Ready<Result<GreetingResponse, ProcessError>>
+ Send
+ Sync
+ 'static {
    move |message| {
        std::future::ready(Ok(GreetingResponse {
            result: format!("{tag}: Hello, {}", message.body.name),
        }))
    }
}

#[tokio::test]
async fn test_channels_are_isolated() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let chat = MqHost::new(broker.clone(), fast_options());
    chat.register_handler_to_channel("chat", tagged_greeter("chat"))
        .unwrap();
    chat.start().unwrap();

    let client = chat.create_message_queue_client();

    // Nothing serves "work", so the request stays on its queue.
    let unanswered = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "work",
            greeting("Bob"),
            WaitOptions::timeout(Duration::from_millis(200)),
        )
        .await
        .unwrap();
    assert_eq!(unanswered, None);
    assert_eq!(broker.queue_len("work_mq:Greeting.inq").await, 1);

    let answered = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "chat",
            greeting("Ann"),
            WaitOptions::timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(answered.unwrap().result, "chat: Hello, Ann");

    chat.shutdown().await;
}

#[tokio::test]
async fn test_hosts_on_separate_channels_serve_their_own() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let chat = MqHost::new(broker.clone(), fast_options());
    let work = MqHost::new(broker.clone(), fast_options());
    chat.register_handler_to_channel("chat", tagged_greeter("chat"))
        .unwrap();
    work.register_handler_to_channel("work", tagged_greeter("work"))
        .unwrap();
    chat.start().unwrap();
    work.start().unwrap();

    let client = chat.create_message_queue_client();
    for (channel, expected) in [("chat", "chat: Hello, Ann"), ("work", "work: Hello, Ann")] {
        let response = client
            .publish_and_wait::<Greeting, GreetingResponse>(
                channel,
                greeting("Ann"),
                WaitOptions::timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        assert_eq!(response.unwrap().result, expected);
    }

    chat.shutdown().await;
    work.shutdown().await;
}

#[tokio::test]
async fn test_duplicate_registration_leaves_first_in_place() {
    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());
    host.register_handler_to_channel("chat", tagged_greeter("first"))
        .unwrap();

    let duplicate = host.register_handler_to_channel("work", tagged_greeter("second"));
    assert_matches!(
        duplicate,
        Err(Error::DuplicateHandler { type_name: "Greeting" })
    );

    host.start().unwrap();

    let client = host.create_message_queue_client();
    let response = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "chat",
            greeting("Ann"),
            WaitOptions::timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(response.unwrap().result, "first: Hello, Ann");

    host.shutdown().await;
}

#[tokio::test]
async fn test_hosts_sharing_a_channel_compete_for_messages() {
    let broker = MemoryBroker::new();
    let first = MqHost::new(broker.clone(), fast_options());
    let second = MqHost::new(broker.clone(), fast_options());
    first
        .register_handler_to_channel("chat", tagged_greeter("first"))
        .unwrap();
    second
        .register_handler_to_channel("chat", tagged_greeter("second"))
        .unwrap();
    first.start().unwrap();
    second.start().unwrap();

    let client = first.create_message_queue_client();
    for _ in 0..10 {
        let response = client
            .publish_and_wait::<Greeting, GreetingResponse>(
                "chat",
                greeting("Ann"),
                WaitOptions::timeout(Duration::from_secs(1)),
            )
            .await
            .unwrap();
        assert!(response.unwrap().result.ends_with("Hello, Ann"));
    }

    let served: u64 = first
        .stats()
        .iter()
        .chain(second.stats().iter())
        .map(|stats| stats.total_processed)
        .sum();
    assert_eq!(served, 10);

    first.shutdown().await;
    second.shutdown().await;
}

#[tokio::test]
async fn test_always_failing_handler_exhausts_retries() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());

    let attempts = Arc::new(AtomicUsize::new(0));
    let (exception_tx, mut exception_rx) = mpsc::unbounded_channel();

    let counted = attempts.clone();
    host.register_handler_to_channel_with_options(
        "work",
        move |_: Message<Job>| {
            counted.fetch_add(1, Ordering::SeqCst);
            async move { Err::<GreetingResponse, ProcessError>("job exploded".into()) }
        },
        HandlerOptions::default()
            .with_retry_count(2)
            .with_exception_fn(move |message: &Message<Job>, error: &ProcessError| {
                let _ = exception_tx.send((message.clone(), error.to_string()));
            }),
    )
    .unwrap();
    host.start().unwrap();

    let client = host.create_message_queue_client();
    let request = Message::new(Job { id: 42 });
    client
        .publish_to_channel("work", Outbound::Envelope(request.clone()))
        .await
        .unwrap();

    let (message, error) = timeout(Duration::from_secs(1), exception_rx.recv())
        .await
        .expect("Timeout")
        .unwrap();

    assert_eq!(message, request);
    assert_eq!(error, "job exploded");
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // Exactly one exception callback.
    sleep(Duration::from_millis(100)).await;
    assert!(exception_rx.try_recv().is_err());

    host.shutdown().await;

    let stats = &host.stats()[0];
    assert_eq!(stats.total_received, 1);
    assert_eq!(stats.total_failed, 1);
    assert_eq!(stats.total_retries, 2);
    assert_eq!(broker.queue_len("work_mq:Job.dlq").await, 1);
}

#[tokio::test]
async fn test_request_filter_runs_before_processing() {
    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());
    host.register_handler_to_channel("chat", tagged_greeter("chat"))
        .unwrap()
        .set_request_filter(|mut message: Message<Greeting>| {
            if message.body.name.is_empty() {
                return Err("name is required".into());
            }
            message.body.name = message.body.name.to_uppercase();
            Ok(message)
        })
        .unwrap()
        .set_retry_count(0)
        .unwrap();
    host.start().unwrap();

    let client = host.create_message_queue_client();

    let response = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "chat",
            greeting("ann"),
            WaitOptions::timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();
    assert_eq!(response.unwrap().result, "chat: Hello, ANN");

    let rejected = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "chat",
            greeting(""),
            WaitOptions::timeout(Duration::from_secs(1)),
        )
        .await;
    assert_matches!(rejected, Err(Error::Remote(error)) => {
        assert_eq!(error.error_code, "Exception");
        assert_eq!(error.message, "name is required");
    });

    host.shutdown().await;
}

#[tokio::test]
async fn test_priority_queue_is_drained_first() {
    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());

    let (order_tx, mut order_rx) = mpsc::unbounded_channel();
    host.register_handler_to_channel("work", move |message: Message<Job>| {
        let _ = order_tx.send(message.body.id);
        std::future::ready(Ok::<_, ProcessError>(GreetingResponse {
            result: String::new(),
        }))
    })
    .unwrap();

    let client = host.create_message_queue_client();
    client
        .publish_to_channel("work", Outbound::Body(Job { id: 1 }))
        .await
        .unwrap();
    client
        .publish_to_channel(
            "work",
            Outbound::Envelope(Message::new(Job { id: 2 }).with_priority(1)),
        )
        .await
        .unwrap();

    host.start().unwrap();

    let first = timeout(Duration::from_secs(1), order_rx.recv())
        .await
        .expect("Timeout")
        .unwrap();
    let second = timeout(Duration::from_secs(1), order_rx.recv())
        .await
        .expect("Timeout")
        .unwrap();

    assert_eq!((first, second), (2, 1));

    host.shutdown().await;
}

#[tokio::test]
async fn test_undecodable_message_does_not_stop_dispatch() {
    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());
    host.register_handler_to_channel("chat", tagged_greeter("chat"))
        .unwrap();
    host.start().unwrap();

    let raw = broker.create_client();
    raw.publish(
        &channel::resolve::<Greeting>("chat"),
        bytes::Bytes::from_static(b"garbage"),
    )
    .await
    .unwrap();

    let client = host.create_message_queue_client();
    let response = client
        .publish_and_wait::<Greeting, GreetingResponse>(
            "chat",
            greeting("Ann"),
            WaitOptions::timeout(Duration::from_secs(1)),
        )
        .await
        .unwrap();

    assert_eq!(response.unwrap().result, "chat: Hello, Ann");
    assert_eq!(broker.queue_len("chat_mq:Greeting.dlq").await, 1);

    host.shutdown().await;
}

#[tokio::test]
async fn test_lifecycle_errors() {
    let broker = MemoryBroker::new();
    let host = MqHost::new(broker.clone(), fast_options());
    let handle = host
        .register_handler_to_channel("chat", tagged_greeter("chat"))
        .unwrap();

    host.start().unwrap();
    assert!(host.is_started());

    assert_matches!(host.start(), Err(Error::HostStarted));
    assert_matches!(handle.set_retry_count(4), Err(Error::HostStarted));
    assert_matches!(
        host.register_handler_to_channel("work", |message: Message<Job>| {
            std::future::ready(Ok::<_, ProcessError>(Job { id: message.body.id }))
        }),
        Err(Error::HostStarted)
    );
    assert_matches!(
        MqHost::new(broker.clone(), fast_options())
            .register_handler_to_channel("", tagged_greeter("x")),
        Err(Error::EmptyChannel)
    );

    timeout(Duration::from_secs(1), host.shutdown())
        .await
        .expect("Timeout");
    assert_eq!(broker.open_clients(), 0);
}
