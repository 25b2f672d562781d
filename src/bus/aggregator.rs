//! Ephemeral acknowledgement aggregation.
//!
//! One aggregator task lives per announcement attempt: it publishes the
//! announcement with an ack reply channel, collects the requested labels
//! until the deadline, and delivers exactly one outcome to the requester.
//! No shared state reaches back into the requester.

use crate::bus::{Acknowledgement, Acknowledgements, AnnouncementBus};
use crate::core::error::WardenError;
use crate::policy::announcement::SubjectDeletionAnnouncement;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Outcome of one acknowledgement aggregation.
#[derive(Debug)]
pub enum AckOutcome {
    /// Aggregated acknowledgements, possibly containing synthesized
    /// timeouts for labels that never answered.
    Acknowledgements(Acknowledgements),

    /// Aggregation failed before any acknowledgement could be collected.
    Failure(WardenError),
}

/// Short-lived acknowledgement collector.
pub struct AckAggregator;

impl AckAggregator {
    /// Publish `announcement` and collect its requested acknowledgements.
    ///
    /// Delivers exactly one event to `reply` when done. Must only be called
    /// for announcements with a non-empty ack request set; fire-and-forget
    /// publication is the caller's concern.
    pub fn start<E>(
        bus: Arc<dyn AnnouncementBus>,
        announcement: SubjectDeletionAnnouncement,
        timeout: Duration,
        reply: mpsc::UnboundedSender<E>,
    ) -> JoinHandle<()>
    where
        E: From<AckOutcome> + Send + 'static,
    {
        debug_assert!(!announcement.headers.ack_requests.is_empty());
        tokio::spawn(async move {
            let outcome = Self::collect(bus, announcement, timeout).await;
            // The requester may already be gone; nothing left to do then.
            let _ = reply.send(E::from(outcome));
        })
    }

    async fn collect(
        bus: Arc<dyn AnnouncementBus>,
        announcement: SubjectDeletionAnnouncement,
        timeout: Duration,
    ) -> AckOutcome {
        let correlation_id = announcement.headers.correlation_id.clone();
        let mut pending = announcement.headers.ack_requests.clone();
        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel();

        if let Err(error) = bus.publish(announcement, Some(ack_tx)) {
            tracing::info!(
                correlation_id = %correlation_id,
                error = %error,
                "failed to publish announcement for acknowledgement collection"
            );
            return AckOutcome::Failure(error);
        }

        let deadline = tokio::time::Instant::now() + timeout;
        let mut acks = Vec::with_capacity(pending.len());
        while !pending.is_empty() {
            match tokio::time::timeout_at(deadline, ack_rx.recv()).await {
                Ok(Some(ack)) => {
                    if pending.remove(&ack.label) {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            label = %ack.label,
                            status = %ack.status,
                            "collected acknowledgement"
                        );
                        acks.push(ack);
                    } else {
                        tracing::debug!(
                            correlation_id = %correlation_id,
                            label = %ack.label,
                            "ignoring duplicate or unrequested acknowledgement"
                        );
                    }
                }
                // All reply senders dropped; remaining labels will never answer.
                Ok(None) => break,
                Err(_) => {
                    tracing::debug!(
                        correlation_id = %correlation_id,
                        missing = pending.len(),
                        "acknowledgement aggregation timed out"
                    );
                    break;
                }
            }
        }

        for label in pending {
            acks.push(Acknowledgement::timed_out(label));
        }
        AckOutcome::Acknowledgements(Acknowledgements::new(correlation_id, acks))
    }
}
