//! In-process announcement bus.

use crate::bus::{Acknowledgement, AnnouncementBus};
use crate::core::error::{WardenError, WardenResult};
use crate::policy::announcement::SubjectDeletionAnnouncement;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::mpsc;

/// One delivered announcement together with its ack reply channel.
#[derive(Debug)]
pub struct Delivery {
    /// The published announcement.
    pub announcement: SubjectDeletionAnnouncement,

    /// Where to send acknowledgements, when the publisher collects them.
    pub ack_reply: Option<mpsc::UnboundedSender<Acknowledgement>>,
}

/// In-process fan-out bus.
///
/// Every subscriber receives every published announcement. Subscribers whose
/// receiving end is gone are pruned on the next publish.
#[derive(Debug, Default)]
pub struct MemoryBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<Delivery>>>,
    closed: AtomicBool,
}

impl MemoryBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<Delivery> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(tx);
        rx
    }

    /// Shut the bus down; subsequent publishes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl AnnouncementBus for MemoryBus {
    fn publish(
        &self,
        announcement: SubjectDeletionAnnouncement,
        ack_reply: Option<mpsc::UnboundedSender<Acknowledgement>>,
    ) -> WardenResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(WardenError::BusClosed);
        }

        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.retain(|tx| !tx.is_closed());

        tracing::debug!(
            correlation_id = %announcement.headers.correlation_id,
            subscribers = subscribers.len(),
            "publishing subject deletion announcement"
        );

        for tx in subscribers.iter() {
            let _ = tx.send(Delivery {
                announcement: announcement.clone(),
                ack_reply: ack_reply.clone(),
            });
        }
        Ok(())
    }
}
