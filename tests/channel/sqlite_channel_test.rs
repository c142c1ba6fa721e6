//! Tests for `src/channel/sqlite.rs`: durable FIFO with ack-after-processing.

use std::sync::Arc;
use std::time::Duration;

use smsrelay::channel::{DispatchMessage, Envelope, MessageChannel, SqliteChannel, DEFAULT_TOPIC};

use crate::support::open_pool;

const PULL_TIMEOUT: Duration = Duration::from_secs(2);

async fn channel() -> SqliteChannel {
    SqliteChannel::new(open_pool().await, DEFAULT_TOPIC, Duration::from_millis(20))
}

fn message_id(payload: &[u8]) -> String {
    let envelope = Envelope::decode(payload).expect("payload should decode");
    match DispatchMessage::from_envelope(envelope).expect("envelope should parse") {
        DispatchMessage::SmsRequest(data) => data.message_id,
        other => panic!("unexpected message: {other:?}"),
    }
}

#[tokio::test]
async fn publish_then_pull_yields_first_attempt() {
    let channel = channel().await;
    channel
        .publish(&Envelope::sms_request("req-1"))
        .await
        .expect("publish");

    let delivery = tokio::time::timeout(PULL_TIMEOUT, channel.pull())
        .await
        .expect("pull should not block")
        .expect("pull");
    assert_eq!(delivery.attempt, 1);
    assert_eq!(message_id(&delivery.payload), "req-1");
}

#[tokio::test]
async fn ack_removes_message_from_backlog() {
    let channel = channel().await;
    channel
        .publish(&Envelope::sms_request("req-1"))
        .await
        .expect("publish");
    assert_eq!(channel.pending_count().await.expect("count"), 1);

    let delivery = channel.pull().await.expect("pull");
    assert_eq!(channel.pending_count().await.expect("count"), 1);

    channel.ack(&delivery).await.expect("ack");
    assert_eq!(channel.pending_count().await.expect("count"), 0);

    // Acking twice is harmless.
    channel.ack(&delivery).await.expect("second ack");
}

#[tokio::test]
async fn unacked_message_is_redelivered_with_higher_attempt() {
    let channel = channel().await;
    channel
        .publish(&Envelope::sms_request("req-1"))
        .await
        .expect("publish");

    let first = channel.pull().await.expect("first pull");
    let second = tokio::time::timeout(PULL_TIMEOUT, channel.pull())
        .await
        .expect("redelivery should not block")
        .expect("second pull");

    assert_eq!(first.id, second.id);
    assert_eq!(first.attempt, 1);
    assert_eq!(second.attempt, 2);
}

#[tokio::test]
async fn deliveries_follow_publish_order() {
    let channel = channel().await;
    for id in ["a", "b", "c"] {
        channel
            .publish(&Envelope::sms_request(id))
            .await
            .expect("publish");
    }

    let mut seen = Vec::new();
    for _ in 0..3 {
        let delivery = channel.pull().await.expect("pull");
        seen.push(message_id(&delivery.payload));
        channel.ack(&delivery).await.expect("ack");
    }
    assert_eq!(seen, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn pull_wakes_up_on_publish() {
    let channel = Arc::new(SqliteChannel::new(
        open_pool().await,
        DEFAULT_TOPIC,
        Duration::from_secs(60),
    ));

    let consumer = {
        let channel = Arc::clone(&channel);
        tokio::spawn(async move { channel.pull().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!consumer.is_finished(), "pull should wait on an empty channel");

    channel
        .publish(&Envelope::sms_request("late"))
        .await
        .expect("publish");

    let delivery = tokio::time::timeout(PULL_TIMEOUT, consumer)
        .await
        .expect("publish should wake the consumer")
        .expect("consumer task")
        .expect("pull");
    assert_eq!(message_id(&delivery.payload), "late");
}

#[tokio::test]
async fn publisher_on_another_handle_is_picked_up_by_polling() {
    let pool = open_pool().await;
    let consumer_side = Arc::new(SqliteChannel::new(
        pool.clone(),
        DEFAULT_TOPIC,
        Duration::from_millis(20),
    ));
    let publisher_side = SqliteChannel::new(pool, DEFAULT_TOPIC, Duration::from_millis(20));

    let consumer = {
        let channel = Arc::clone(&consumer_side);
        tokio::spawn(async move { channel.pull().await })
    };
    publisher_side
        .publish(&Envelope::sms_request("remote"))
        .await
        .expect("publish");

    let delivery = tokio::time::timeout(PULL_TIMEOUT, consumer)
        .await
        .expect("poll should find the message")
        .expect("consumer task")
        .expect("pull");
    assert_eq!(message_id(&delivery.payload), "remote");
}

#[tokio::test]
async fn topics_do_not_share_messages() {
    let pool = open_pool().await;
    let sms = SqliteChannel::new(pool.clone(), DEFAULT_TOPIC, Duration::from_millis(20));
    let other = SqliteChannel::new(pool, "notification.other", Duration::from_millis(20));

    sms.publish(&Envelope::sms_request("req-1"))
        .await
        .expect("publish");

    assert_eq!(other.topic(), "notification.other");
    assert_eq!(other.pending_count().await.expect("count"), 0);
    let pulled = tokio::time::timeout(Duration::from_millis(100), other.pull()).await;
    assert!(pulled.is_err(), "other topic should stay empty");
}
