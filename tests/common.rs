//! Common test utilities.
//!
//! This module contains shared helpers for integration tests.
//! Import with `mod common;` in test files.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use warden::bus::memory::{Delivery, MemoryBus};
use warden::bus::Acknowledgement;
use warden::core::config::{BackoffConfig, ExpiryConfig};
use warden::core::error::HttpStatus;
use warden::core::time::{Clock, SimClock, Timestamp};
use warden::expiry::controller::{ControllerHandle, SubjectExpiryController};
use warden::policy::command::PolicyCommand;
use warden::policy::forwarder::CommandForwarder;
use warden::policy::subject::{AckLabel, PolicyId, Subject, SubjectAnnouncement, SubjectId};

/// Base instant for simulated clocks.
pub const T0: Timestamp = Timestamp::new(1_700_000_000_000);

/// Policy id used throughout controller tests.
pub fn policy_id() -> PolicyId {
    PolicyId::from("ns:test-policy")
}

/// Expiry configuration with deterministic (jitter-free) backoff.
///
/// Grace period 30 s, persistence timeout 60 s, backoff 1 s..30 min.
pub fn expiry_config() -> ExpiryConfig {
    ExpiryConfig {
        grace_period_ms: 30_000,
        persistence_timeout_ms: 60_000,
        backoff: BackoffConfig {
            min_ms: 1_000,
            max_ms: 30 * 60 * 1000,
            random_factor: 0.0,
        },
    }
}

/// Announcement policy builder.
pub fn announcement(
    before_expiry: Option<Duration>,
    when_deleted: bool,
    labels: &[&str],
) -> SubjectAnnouncement {
    SubjectAnnouncement {
        before_expiry_ms: before_expiry.map(|lead| lead.as_millis() as u64),
        when_deleted,
        requested_ack_labels: labels.iter().map(|label| AckLabel::from(*label)).collect(),
        requested_acks_timeout_ms: None,
    }
}

/// Everything a controller test needs: bus, forwarder sink and a simulated
/// clock, all driven by the paused tokio runtime.
pub struct TestRig {
    pub bus: Arc<MemoryBus>,
    pub forwarder: CommandForwarder,
    pub commands: mpsc::UnboundedReceiver<PolicyCommand>,
    pub clock: Arc<SimClock>,
    pub config: ExpiryConfig,
}

impl TestRig {
    /// Create a rig with the given configuration.
    ///
    /// Must run inside a paused tokio runtime so that the simulated clock
    /// and every timer advance together.
    pub fn new(config: ExpiryConfig) -> Self {
        let (forwarder, commands) = CommandForwarder::new();
        Self {
            bus: Arc::new(MemoryBus::new()),
            forwarder,
            commands,
            clock: Arc::new(SimClock::new(T0)),
            config,
        }
    }

    /// Current simulated instant.
    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    /// Subscribe to published announcements.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Delivery> {
        self.bus.subscribe()
    }

    /// Spawn a controller for `subject` with a seeded backoff.
    pub fn spawn(&self, subject: Subject) -> ControllerHandle {
        SubjectExpiryController::new(
            policy_id(),
            subject,
            &self.config,
            self.bus.clone(),
            self.forwarder.clone(),
            self.clock.clone(),
        )
        .with_backoff_seed(&self.config, 7)
        .spawn()
    }

    /// Receive the next forwarded delete command, asserting its subject.
    pub async fn expect_delete_command(&mut self, subject_id: &str) {
        match self.commands.recv().await {
            Some(PolicyCommand::DeleteExpiredSubject(command)) => {
                assert_eq!(command.subject_id, SubjectId::from(subject_id));
                assert!(!command.headers.response_required);
            }
            None => panic!("command forwarder closed without a delete command"),
        }
    }

    /// Assert that no command has been forwarded so far.
    pub fn assert_no_command(&mut self) {
        assert!(
            self.commands.try_recv().is_err(),
            "unexpected policy command forwarded"
        );
    }
}

/// Answer a delivery's requested ack with the given status.
pub fn ack_with(delivery: &Delivery, label: &str, status: HttpStatus) {
    let reply = delivery
        .ack_reply
        .as_ref()
        .expect("delivery carries no ack reply channel");
    let ack = if status.is_success() {
        Acknowledgement::successful(AckLabel::from(label))
    } else {
        Acknowledgement::failed(AckLabel::from(label), status)
    };
    reply.send(ack).expect("aggregator dropped its ack channel");
}

/// Assert `actual` is within `tolerance` of `target`.
pub fn assert_close(actual: Timestamp, target: Timestamp, tolerance: Duration) {
    let tolerance_ms = tolerance.as_millis() as u64;
    let diff = actual.ms.abs_diff(target.ms);
    assert!(
        diff <= tolerance_ms,
        "instant {actual} not within {tolerance_ms}ms of {target}"
    );
}
