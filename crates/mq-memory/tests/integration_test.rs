//! Integration tests for the in-memory broker

use std::time::Duration;

use assert_matches::assert_matches;
use bytes::Bytes;
use courier_mq::{MessageService, QueueClient};
use courier_mq_memory::{Error, MemoryBroker};
use tokio::time::{sleep, timeout};

#[tokio::test]
async fn test_blocked_get_wakes_on_publish() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let consumer = broker.create_client();
    let producer = broker.create_client();

    let waiter = tokio::spawn(async move { consumer.blocking_get("jobs", None).await });

    sleep(Duration::from_millis(20)).await;
    producer.publish("jobs", Bytes::from("job-1")).await.unwrap();

    let received = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("Timeout")
        .unwrap()
        .unwrap();
    assert_eq!(received, Some(Bytes::from("job-1")));
}

#[tokio::test]
async fn test_two_waiters_each_receive_one_entry() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let first = broker.create_client();
    let second = broker.create_client();
    let producer = broker.create_client();

    let first_waiter = tokio::spawn(async move { first.blocking_get("jobs", None).await });
    let second_waiter = tokio::spawn(async move { second.blocking_get("jobs", None).await });

    sleep(Duration::from_millis(20)).await;
    producer.publish("jobs", Bytes::from("a")).await.unwrap();
    producer.publish("jobs", Bytes::from("b")).await.unwrap();

    let mut received = vec![
        timeout(Duration::from_secs(1), first_waiter)
            .await
            .expect("Timeout")
            .unwrap()
            .unwrap()
            .unwrap(),
        timeout(Duration::from_secs(1), second_waiter)
            .await
            .expect("Timeout")
            .unwrap()
            .unwrap()
            .unwrap(),
    ];
    received.sort();

    assert_eq!(received, vec![Bytes::from("a"), Bytes::from("b")]);
    assert_eq!(broker.queue_len("jobs").await, 0);
}

#[tokio::test]
async fn test_queues_are_independent() {
    let broker = MemoryBroker::new();
    let client = broker.create_client();

    client.publish("chat_mq:Greeting.inq", Bytes::from("chat")).await.unwrap();
    client.publish("work_mq:Greeting.inq", Bytes::from("work")).await.unwrap();

    assert_eq!(
        client.try_get("work_mq:Greeting.inq").await.unwrap(),
        Some(Bytes::from("work"))
    );
    assert_eq!(
        client.try_get("chat_mq:Greeting.inq").await.unwrap(),
        Some(Bytes::from("chat"))
    );
}

#[tokio::test]
async fn test_notify_reaches_watcher_of_named_queue() {
    let broker = MemoryBroker::new();
    let watcher = broker.create_client();
    let notifier = broker.create_client();

    let watched = vec!["topic:a".to_string(), "topic:b".to_string()];
    let watch = tokio::spawn(async move { watcher.wait_for_notify_on_any(&watched).await });

    sleep(Duration::from_millis(20)).await;
    notifier.notify("topic:other", Bytes::from("ignored")).await.unwrap();
    notifier.notify("topic:b", Bytes::from("ping")).await.unwrap();

    let name = timeout(Duration::from_secs(1), watch)
        .await
        .expect("Timeout")
        .unwrap()
        .unwrap();
    assert_eq!(name, "topic:b");

    // Notifications are not enqueued.
    assert_eq!(broker.queue_len("topic:b").await, 0);
}

#[tokio::test]
async fn test_close_releases_blocked_waiters() {
    let broker = MemoryBroker::new();
    let client = broker.create_client();

    let waiter = tokio::spawn(async move { client.blocking_get("never", None).await });

    sleep(Duration::from_millis(20)).await;
    broker.close();

    let result = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("Timeout")
        .unwrap();
    assert_matches!(result, Err(Error::Closed));
}

#[tokio::test]
async fn test_entry_published_before_wait_is_returned() {
    let broker = MemoryBroker::new();
    let client = broker.create_client();

    client.publish("q", Bytes::from("early")).await.unwrap();

    let result = client
        .blocking_get("q", Some(Duration::from_millis(10)))
        .await
        .unwrap();
    assert_eq!(result, Some(Bytes::from("early")));
}

#[tokio::test]
async fn test_one_shot_queues_do_not_accumulate() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let client = broker.create_client();

    for i in 0..200 {
        let answered = format!("mq:tmp:answered{i}");
        client.publish(&answered, Bytes::from("reply")).await.unwrap();
        let received = client
            .blocking_get(&answered, Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(received, Some(Bytes::from("reply")));

        let abandoned = format!("mq:tmp:abandoned{i}");
        let received = client
            .blocking_get(&abandoned, Some(Duration::from_millis(1)))
            .await
            .unwrap();
        assert_eq!(received, None);

        let polled = format!("mq:tmp:polled{i}");
        assert_eq!(client.try_get(&polled).await.unwrap(), None);
    }

    assert_eq!(broker.queue_count().await, 0);
}

#[tokio::test]
async fn test_reply_after_wait_starts_leaves_no_queue() {
    let _ = tracing_subscriber::fmt::try_init();

    let broker = MemoryBroker::new();
    let consumer = broker.create_client();
    let producer = broker.create_client();

    let waiter = tokio::spawn(async move { consumer.blocking_get("mq:tmp:late", None).await });

    sleep(Duration::from_millis(20)).await;
    assert_eq!(broker.queue_count().await, 1);
    producer.publish("mq:tmp:late", Bytes::from("reply")).await.unwrap();

    let received = timeout(Duration::from_secs(1), waiter)
        .await
        .expect("Timeout")
        .unwrap()
        .unwrap();
    assert_eq!(received, Some(Bytes::from("reply")));
    assert_eq!(broker.queue_count().await, 0);
}
