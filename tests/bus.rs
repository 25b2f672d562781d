//! Tests for the announcement bus and acknowledgement aggregation.

mod common;

use common::{announcement, policy_id, T0};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use warden::bus::aggregator::{AckAggregator, AckOutcome};
use warden::bus::memory::MemoryBus;
use warden::bus::{Acknowledgement, AnnouncementBus};
use warden::core::error::{HttpStatus, WardenError};
use warden::policy::announcement::{AnnouncementHeaders, SubjectDeletionAnnouncement};
use warden::policy::subject::{AckLabel, SubjectId};

fn announcement_with_acks(labels: &[&str]) -> SubjectDeletionAnnouncement {
    let policy = announcement(None, false, labels);
    SubjectDeletionAnnouncement::new(
        policy_id(),
        T0,
        SubjectId::from("user:alice"),
        AnnouncementHeaders::for_announcement(&policy),
    )
}

#[tokio::test(start_paused = true)]
async fn aggregator_collects_all_requested_acks() {
    let bus = Arc::new(MemoryBus::new());
    let mut subs = bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AckOutcome>();

    AckAggregator::start(
        bus.clone(),
        announcement_with_acks(&["search-index", "cache"]),
        Duration::from_secs(2),
        reply_tx,
    );

    let delivery = subs.recv().await.unwrap();
    let ack_reply = delivery.ack_reply.unwrap();
    ack_reply
        .send(Acknowledgement::successful(AckLabel::from("search-index")))
        .unwrap();
    ack_reply
        .send(Acknowledgement::successful(AckLabel::from("cache")))
        .unwrap();

    match reply_rx.recv().await.unwrap() {
        AckOutcome::Acknowledgements(acks) => {
            assert_eq!(acks.acks.len(), 2);
            assert!(!acks.requires_redelivery());
            assert_eq!(acks.correlation_id, delivery.announcement.headers.correlation_id);
        }
        AckOutcome::Failure(error) => panic!("unexpected failure: {error}"),
    }
}

#[tokio::test(start_paused = true)]
async fn aggregator_synthesizes_timeouts_for_missing_labels() {
    let bus = Arc::new(MemoryBus::new());
    let mut subs = bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AckOutcome>();

    let started_at = tokio::time::Instant::now();
    AckAggregator::start(
        bus.clone(),
        announcement_with_acks(&["search-index", "cache"]),
        Duration::from_secs(2),
        reply_tx,
    );

    let delivery = subs.recv().await.unwrap();
    let ack_reply = delivery.ack_reply.unwrap();
    ack_reply
        .send(Acknowledgement::successful(AckLabel::from("search-index")))
        .unwrap();
    // "cache" never answers; keep the reply sender alive past the deadline.

    match reply_rx.recv().await.unwrap() {
        AckOutcome::Acknowledgements(acks) => {
            assert_eq!(acks.acks.len(), 2);
            assert!(acks.requires_redelivery());
            let timed_out = acks
                .acks
                .iter()
                .find(|ack| ack.label == AckLabel::from("cache"))
                .unwrap();
            assert_eq!(timed_out.status, HttpStatus::REQUEST_TIMEOUT);
        }
        AckOutcome::Failure(error) => panic!("unexpected failure: {error}"),
    }
    assert_eq!(started_at.elapsed(), Duration::from_secs(2));
    drop(ack_reply);
}

#[tokio::test(start_paused = true)]
async fn aggregator_ignores_duplicate_and_unrequested_acks() {
    let bus = Arc::new(MemoryBus::new());
    let mut subs = bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AckOutcome>();

    AckAggregator::start(
        bus.clone(),
        announcement_with_acks(&["search-index"]),
        Duration::from_secs(2),
        reply_tx,
    );

    let delivery = subs.recv().await.unwrap();
    let ack_reply = delivery.ack_reply.unwrap();
    ack_reply
        .send(Acknowledgement::failed(
            AckLabel::from("unrequested"),
            HttpStatus::SERVICE_UNAVAILABLE,
        ))
        .unwrap();
    ack_reply
        .send(Acknowledgement::successful(AckLabel::from("search-index")))
        .unwrap();
    ack_reply
        .send(Acknowledgement::successful(AckLabel::from("search-index")))
        .unwrap();

    match reply_rx.recv().await.unwrap() {
        AckOutcome::Acknowledgements(acks) => {
            assert_eq!(acks.acks.len(), 1);
            assert!(!acks.requires_redelivery());
        }
        AckOutcome::Failure(error) => panic!("unexpected failure: {error}"),
    }
}

#[tokio::test(start_paused = true)]
async fn aggregator_completes_early_when_repliers_vanish() {
    let bus = Arc::new(MemoryBus::new());
    let mut subs = bus.subscribe();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AckOutcome>();

    let started_at = tokio::time::Instant::now();
    AckAggregator::start(
        bus.clone(),
        announcement_with_acks(&["search-index"]),
        Duration::from_secs(60),
        reply_tx,
    );

    // The only subscriber drops its reply channel without acking.
    let delivery = subs.recv().await.unwrap();
    drop(delivery);

    match reply_rx.recv().await.unwrap() {
        AckOutcome::Acknowledgements(acks) => {
            assert_eq!(acks.acks.len(), 1);
            assert_eq!(acks.acks[0].status, HttpStatus::REQUEST_TIMEOUT);
        }
        AckOutcome::Failure(error) => panic!("unexpected failure: {error}"),
    }
    // No waiting out the full deadline.
    assert!(started_at.elapsed() < Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn aggregator_reports_publish_failures() {
    let bus = Arc::new(MemoryBus::new());
    bus.close();
    let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<AckOutcome>();

    AckAggregator::start(
        bus.clone(),
        announcement_with_acks(&["search-index"]),
        Duration::from_secs(2),
        reply_tx,
    );

    match reply_rx.recv().await.unwrap() {
        AckOutcome::Failure(WardenError::BusClosed) => {}
        other => panic!("expected BusClosed failure, got {other:?}"),
    }
}

#[tokio::test]
async fn bus_delivers_to_late_subscribers_only_after_subscription() {
    let bus = MemoryBus::new();
    bus.publish(announcement_with_acks(&[]), None).unwrap();

    let mut subs = bus.subscribe();
    assert!(subs.try_recv().is_err());

    bus.publish(announcement_with_acks(&[]), None).unwrap();
    assert!(subs.try_recv().is_ok());
}
