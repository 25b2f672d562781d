//! Supervision of per-subject expiry controllers.
//!
//! The supervisor owns one controller per expiring subject and releases its
//! tracking entry when the controller stops. Controllers are stateless
//! across restarts; after a process restart the host re-reads its policies
//! and spawns controllers afresh.

use crate::bus::AnnouncementBus;
use crate::core::config::ExpiryConfig;
use crate::core::time::Clock;
use crate::expiry::controller::{ControllerHandle, SubjectExpiryController};
use crate::policy::forwarder::CommandForwarder;
use crate::policy::subject::{PolicyId, Subject, SubjectId};
use std::collections::HashMap;
use std::sync::Arc;

type TrackedKey = (PolicyId, SubjectId);

/// Spawns and tracks one expiry controller per subject.
pub struct ExpirySupervisor {
    config: ExpiryConfig,
    bus: Arc<dyn AnnouncementBus>,
    forwarder: CommandForwarder,
    clock: Arc<dyn Clock>,
    tracked: HashMap<TrackedKey, ControllerHandle>,
}

impl ExpirySupervisor {
    /// Create a supervisor.
    pub fn new(
        config: ExpiryConfig,
        bus: Arc<dyn AnnouncementBus>,
        forwarder: CommandForwarder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            config,
            bus,
            forwarder,
            clock,
            tracked: HashMap::new(),
        }
    }

    /// Spawn a controller for `subject`.
    ///
    /// A controller already tracked for the same subject is stopped and
    /// replaced; the subject descriptor may have changed.
    pub fn spawn(&mut self, policy_id: PolicyId, subject: Subject) {
        let key = (policy_id.clone(), subject.id().clone());
        if let Some(previous) = self.tracked.remove(&key) {
            tracing::debug!(policy = %key.0, subject = %key.1, "replacing tracked controller");
            previous.stop();
        }

        let controller = SubjectExpiryController::new(
            policy_id,
            subject,
            &self.config,
            self.bus.clone(),
            self.forwarder.clone(),
            self.clock.clone(),
        );
        let handle = controller.spawn();

        tracing::debug!(policy = %key.0, subject = %key.1, "spawned subject expiry controller");
        self.tracked.insert(key, handle);
    }

    /// Route an external subject-deleted observation to its controller.
    pub fn notify_subject_deleted(&self, policy_id: &PolicyId, subject_id: &SubjectId) {
        let key = (policy_id.clone(), subject_id.clone());
        match self.tracked.get(&key) {
            Some(handle) => handle.subject_deleted(),
            None => {
                tracing::debug!(
                    policy = %policy_id,
                    subject = %subject_id,
                    "subject deleted without tracked controller"
                );
            }
        }
    }

    /// Release tracking entries of controllers that have stopped.
    ///
    /// Returns the number of entries released.
    pub fn reap(&mut self) -> usize {
        let mut released = 0;
        self.tracked.retain(|key, handle| {
            if handle.is_finished() {
                tracing::debug!(policy = %key.0, subject = %key.1, "releasing stopped controller");
                released += 1;
                false
            } else {
                true
            }
        });
        released
    }

    /// Number of currently tracked controllers.
    pub fn tracked_count(&self) -> usize {
        self.tracked.len()
    }

    /// Whether a controller is tracked for the subject.
    pub fn is_tracked(&self, policy_id: &PolicyId, subject_id: &SubjectId) -> bool {
        self.tracked
            .contains_key(&(policy_id.clone(), subject_id.clone()))
    }

    /// Stop every tracked controller and wait for them to terminate.
    pub async fn stop_all(&mut self) {
        tracing::debug!(count = self.tracked.len(), "stopping all controllers");
        for (_, handle) in self.tracked.drain() {
            handle.stop();
            handle.join().await;
        }
    }
}
