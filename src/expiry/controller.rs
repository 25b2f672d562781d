//! Subject expiry lifecycle controller.
//!
//! One controller owns the end-of-life of a single subject: it schedules the
//! pre-expiry announcement, collects acknowledgements with backoff retries
//! inside the grace window, forwards the deletion command once the expiry is
//! reached, and waits for the deletion to be confirmed.
//!
//! The controller is a single task processing one event at a time; timers,
//! the acknowledgement aggregator and external notifications all feed the
//! same queue, so interleavings are deterministic given arrival order.

use crate::bus::aggregator::{AckAggregator, AckOutcome};
use crate::bus::{Acknowledgements, AnnouncementBus};
use crate::core::config::ExpiryConfig;
use crate::core::error::WardenError;
use crate::core::time::{truncate_to_one_day, Clock, Timestamp, ANNOUNCEMENT_WINDOW};
use crate::expiry::backoff::Backoff;
use crate::expiry::timers::{TimerFired, TimerKey, TimerService};
use crate::policy::announcement::{AnnouncementHeaders, SubjectDeletionAnnouncement};
use crate::policy::command::DeleteExpiredSubject;
use crate::policy::forwarder::CommandForwarder;
use crate::policy::subject::{PolicyId, Subject};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Lifecycle states of a subject expiry controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryState {
    /// An announcement is due and scheduled.
    ToAnnounce,
    /// An announcement is published; acknowledgements are outstanding.
    ToAcknowledge,
    /// Waiting for the subject's expiry to pass.
    ToDelete,
    /// The deletion command is sent; waiting for confirmation.
    Deleted,
}

impl std::fmt::Display for ExpiryState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ToAnnounce => write!(f, "TO_ANNOUNCE"),
            Self::ToAcknowledge => write!(f, "TO_ACKNOWLEDGE"),
            Self::ToDelete => write!(f, "TO_DELETE"),
            Self::Deleted => write!(f, "DELETED"),
        }
    }
}

/// Events consumed by the controller.
#[derive(Debug)]
pub enum ControllerEvent {
    /// The subject has been removed from persistence.
    SubjectDeleted,
    /// It is time to publish an announcement.
    Announce,
    /// It is time to delete the subject.
    Delete,
    /// The announcement is acknowledged (or no acks were requested).
    Acknowledged,
    /// Aggregated acknowledgement result.
    Acks(Acknowledgements),
    /// Acknowledgement collection failed.
    AckFailure(WardenError),
    /// A named timer fired.
    Timer(TimerFired),
    /// External stop request from the supervisor.
    Stop,
}

impl std::fmt::Display for ControllerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SubjectDeleted => write!(f, "SUBJECT_DELETED"),
            Self::Announce => write!(f, "ANNOUNCE"),
            Self::Delete => write!(f, "DELETE"),
            Self::Acknowledged => write!(f, "ACKNOWLEDGED"),
            Self::Acks(_) => write!(f, "ACKNOWLEDGEMENTS"),
            Self::AckFailure(_) => write!(f, "ACK_FAILURE"),
            Self::Timer(fired) => write!(f, "TIMER({})", fired.key),
            Self::Stop => write!(f, "STOP"),
        }
    }
}

impl From<TimerFired> for ControllerEvent {
    fn from(fired: TimerFired) -> Self {
        Self::Timer(fired)
    }
}

impl From<AckOutcome> for ControllerEvent {
    fn from(outcome: AckOutcome) -> Self {
        match outcome {
            AckOutcome::Acknowledgements(acks) => Self::Acks(acks),
            AckOutcome::Failure(error) => Self::AckFailure(error),
        }
    }
}

/// Outcome of one event handler.
enum Transition {
    Stay,
    GoTo(ExpiryState),
    Stop,
}

/// Handle to a running controller.
#[derive(Debug)]
pub struct ControllerHandle {
    events: mpsc::UnboundedSender<ControllerEvent>,
    join: JoinHandle<()>,
}

impl ControllerHandle {
    /// Notify the controller that its subject was deleted from persistence.
    ///
    /// Sends after the controller stopped are silently dropped; repeated
    /// notifications never revive a stopped controller.
    pub fn subject_deleted(&self) {
        let _ = self.events.send(ControllerEvent::SubjectDeleted);
    }

    /// Ask the controller to stop, cancelling pending timers.
    pub fn stop(&self) {
        let _ = self.events.send(ControllerEvent::Stop);
    }

    /// Whether the controller task has terminated.
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the controller task to terminate.
    pub async fn join(self) {
        let _ = self.join.await;
    }
}

/// Controller driving one subject's announce, acknowledge and delete cycle.
pub struct SubjectExpiryController {
    policy_id: PolicyId,
    subject: Subject,
    grace_period: Duration,
    persistence_timeout: Duration,
    bus: Arc<dyn AnnouncementBus>,
    forwarder: CommandForwarder,
    clock: Arc<dyn Clock>,
    backoff: Backoff,
    timers: TimerService<ControllerEvent>,
    events_tx: mpsc::UnboundedSender<ControllerEvent>,
    events_rx: mpsc::UnboundedReceiver<ControllerEvent>,

    state: ExpiryState,
    next_back_off: Duration,
    deleted: bool,
    delete_at: Timestamp,
    acknowledged: bool,
}

impl SubjectExpiryController {
    /// Create a controller for one subject.
    ///
    /// `delete_at` is stamped with the subject's expiry, or with the current
    /// instant for subjects without one.
    pub fn new(
        policy_id: PolicyId,
        subject: Subject,
        config: &ExpiryConfig,
        bus: Arc<dyn AnnouncementBus>,
        forwarder: CommandForwarder,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let timers = TimerService::new(events_tx.clone());
        let delete_at = subject
            .expiry()
            .map(|expiry| expiry.timestamp())
            .unwrap_or_else(|| clock.now());

        Self {
            policy_id,
            grace_period: config.grace_period(),
            persistence_timeout: config.persistence_timeout(),
            bus,
            forwarder,
            clock,
            backoff: Backoff::new(&config.backoff),
            timers,
            events_tx,
            events_rx,
            state: ExpiryState::ToDelete,
            next_back_off: config.backoff.min(),
            deleted: false,
            delete_at,
            acknowledged: false,
            subject,
        }
    }

    /// Replace the backoff jitter source with a seeded one.
    pub fn with_backoff_seed(mut self, config: &ExpiryConfig, seed: u64) -> Self {
        self.backoff = Backoff::with_seed(&config.backoff, seed);
        self
    }

    /// Spawn the controller onto the runtime.
    pub fn spawn(self) -> ControllerHandle {
        let events = self.events_tx.clone();
        let join = tokio::spawn(self.run());
        ControllerHandle { events, join }
    }

    /// Run the controller to completion.
    pub async fn run(mut self) {
        if matches!(self.start(), Transition::Stop) {
            self.timers.cancel_all();
            return;
        }

        loop {
            let event = if self.state == ExpiryState::Deleted {
                match tokio::time::timeout(self.persistence_timeout, self.events_rx.recv()).await {
                    Ok(Some(event)) => event,
                    Ok(None) => break,
                    Err(_) => {
                        match self.timeout_in_deleted() {
                            Transition::Stop => break,
                            transition => {
                                self.apply(transition);
                                continue;
                            }
                        }
                    }
                }
            } else {
                match self.events_rx.recv().await {
                    Some(event) => event,
                    None => break,
                }
            };

            // Timer firings pass the generation check before becoming
            // ANNOUNCE/DELETE; stale ones from replaced timers are dropped.
            let event = match event {
                ControllerEvent::Timer(fired) => {
                    if !self.timers.accept(fired) {
                        tracing::trace!(timer = %fired.key, "dropping stale timer firing");
                        continue;
                    }
                    match fired.key {
                        TimerKey::Announce => ControllerEvent::Announce,
                        TimerKey::Delete => ControllerEvent::Delete,
                    }
                }
                event => event,
            };

            if matches!(event, ControllerEvent::Stop) {
                tracing::debug!(subject = %self.subject.id(), "stop requested");
                break;
            }

            match self.handle_event(event) {
                Transition::Stop => break,
                transition => self.apply(transition),
            }
        }

        self.timers.cancel_all();
        tracing::debug!(
            policy = %self.policy_id,
            subject = %self.subject.id(),
            "subject expiry controller stopped"
        );
    }

    /// Compute the initial state and schedule the first timer.
    fn start(&mut self) -> Transition {
        if self
            .subject
            .announcement()
            .and_then(|announcement| announcement.before_expiry())
            .is_some()
        {
            tracing::debug!(subject = %self.subject.id(), state = %ExpiryState::ToAnnounce, "starting");
            self.state = ExpiryState::ToAnnounce;
            let now = self.clock.now();
            let target = self.subject.announcement_instant().unwrap_or(now);
            self.schedule_announcement(now, target);
            Transition::Stay
        } else {
            tracing::debug!(subject = %self.subject.id(), state = %ExpiryState::ToDelete, "starting");
            self.state = ExpiryState::ToDelete;
            match self.subject.expiry().map(|expiry| expiry.timestamp()) {
                Some(expiry) => {
                    let next = self.schedule_delete(expiry);
                    self.apply(Transition::GoTo(next));
                    Transition::Stay
                }
                // Nothing to wait for; run the delete sub-protocol right away.
                None => {
                    let transition = self.schedule_delete_if_needed();
                    match transition {
                        Transition::Stop => Transition::Stop,
                        transition => {
                            self.apply(transition);
                            Transition::Stay
                        }
                    }
                }
            }
        }
    }

    fn apply(&mut self, transition: Transition) {
        if let Transition::GoTo(next) = transition {
            if next != self.state {
                tracing::debug!(from = %self.state, to = %next, "state transition");
            }
            self.state = next;
        }
    }

    fn handle_event(&mut self, event: ControllerEvent) -> Transition {
        use ControllerEvent::*;
        use ExpiryState::*;

        match (self.state, event) {
            (ToAnnounce, SubjectDeleted) => {
                tracing::debug!("got SUBJECT_DELETED in TO_ANNOUNCE");
                self.process_subject_deleted(Transition::Stay)
            }
            (ToAnnounce, Announce) => self.announce(),

            (ToAcknowledge, Acks(acks)) => self.on_acknowledgements(acks),
            (ToAcknowledge, AckFailure(error)) => self.on_ack_failure(error),
            (ToAcknowledge, Acknowledged) => {
                tracing::debug!("got ACKNOWLEDGED in TO_ACKNOWLEDGE");
                self.acknowledged = true;
                self.schedule_delete_if_needed()
            }
            (ToAcknowledge, SubjectDeleted) => {
                tracing::debug!("got SUBJECT_DELETED in TO_ACKNOWLEDGE");
                // Announcement and backoff are already in flight; no extra
                // scheduling needed for a post-deletion announcement.
                self.mark_deleted();
                Transition::Stay
            }

            (ToDelete, Delete) => {
                tracing::debug!("got DELETE in TO_DELETE");
                self.schedule_delete_if_needed()
            }
            (ToDelete, SubjectDeleted) => {
                tracing::debug!("got SUBJECT_DELETED in TO_DELETE");
                self.process_subject_deleted(Transition::Stop)
            }

            (Deleted, SubjectDeleted) => {
                tracing::debug!("got SUBJECT_DELETED in DELETED");
                self.process_subject_deleted(Transition::Stop)
            }

            (state, event) => {
                tracing::warn!(%state, %event, "unexpected event, ignoring");
                Transition::Stay
            }
        }
    }

    /// ANNOUNCE in TO_ANNOUNCE.
    fn announce(&mut self) -> Transition {
        tracing::debug!("got ANNOUNCE in TO_ANNOUNCE");
        self.timers.cancel(TimerKey::Announce);

        if !(self.deleted && self.subject.announce_when_deleted()) {
            let now = self.clock.now();
            if let Some(target) = self.subject.announcement_instant() {
                if target.is_at_or_after(now.plus(ANNOUNCEMENT_WINDOW)) {
                    // Timer fired early; re-arm instead of announcing.
                    self.schedule_announcement(now, target);
                    return Transition::Stay;
                }
            }
        }

        let collecting = self.publish_and_collect_acks();
        if !collecting {
            // No acks requested; do not wait for the aggregator.
            self.self_send(ControllerEvent::Acknowledged);
        }
        Transition::GoTo(ExpiryState::ToAcknowledge)
    }

    /// Aggregated acks in TO_ACKNOWLEDGE.
    fn on_acknowledgements(&mut self, acks: Acknowledgements) -> Transition {
        tracing::debug!(
            correlation_id = %acks.correlation_id,
            count = acks.acks.len(),
            "got acknowledgements"
        );
        if acks.requires_redelivery() {
            self.retry_announcement_after_backoff()
        } else {
            self.acknowledged = true;
            self.schedule_delete_if_needed()
        }
    }

    /// Aggregation failure in TO_ACKNOWLEDGE.
    fn on_ack_failure(&mut self, error: WardenError) -> Transition {
        tracing::info!(error = %error, "failure waiting for acknowledgements");
        if error.is_retriable() {
            self.retry_announcement_after_backoff()
        } else {
            tracing::warn!(error = %error, "acknowledgement failure unrecoverable, giving up");
            self.schedule_delete_if_needed()
        }
    }

    /// SUBJECT_DELETED handling shared across states.
    fn process_subject_deleted(&mut self, if_no_announcement: Transition) -> Transition {
        self.mark_deleted();
        if !self.acknowledged && self.subject.announce_when_deleted() {
            self.timers.cancel(TimerKey::Announce);
            self.self_send(ControllerEvent::Announce);
            Transition::GoTo(ExpiryState::ToAnnounce)
        } else {
            if_no_announcement
        }
    }

    /// Stamp the deletion instant on the first observation.
    fn mark_deleted(&mut self) {
        if !self.deleted {
            self.deleted = true;
            self.delete_at = self.clock.now();
        }
    }

    /// State timeout in DELETED: the delete confirmation never arrived.
    fn timeout_in_deleted(&mut self) -> Transition {
        if self.deleted {
            tracing::error!(
                subject = %self.subject.id(),
                "timeout in DELETED with subject already deleted"
            );
            return Transition::Stop;
        }
        tracing::debug!("timeout in DELETED");
        let should_announce = self.subject.announce_when_deleted();
        let in_grace_period = self.is_in_grace_period(self.clock.now().plus(self.next_back_off));
        if self.acknowledged || !should_announce || !in_grace_period {
            tracing::error!(
                subject = %self.subject.id(),
                acknowledged = self.acknowledged,
                should_announce,
                in_grace_period,
                "timeout waiting for persistence, giving up"
            );
            Transition::Stop
        } else {
            // Retry the deletion; the state timeout re-arms.
            self.forwarder.tell(self.delete_command());
            Transition::GoTo(ExpiryState::Deleted)
        }
    }

    /// Back off and schedule the next announcement attempt.
    fn retry_announcement_after_backoff(&mut self) -> Transition {
        let now = self.clock.now();
        self.next_back_off = self.backoff.next(self.next_back_off);
        let announcement_instant = now.plus(self.next_back_off);
        if self.is_in_grace_period(announcement_instant) {
            tracing::debug!(retry_at = %announcement_instant, "retrying announcement within grace period");
            self.schedule_announcement(now, announcement_instant);
            Transition::GoTo(ExpiryState::ToAnnounce)
        } else if self.deleted {
            // Must not happen unless the service was down longer than the
            // grace period.
            tracing::error!(
                subject = %self.subject.id(),
                "grace period past for deleted subject, giving up"
            );
            Transition::Stop
        } else {
            tracing::info!(subject = %self.subject.id(), "grace period past, deleting subject");
            self.forwarder.tell(self.delete_command());
            Transition::GoTo(ExpiryState::Deleted)
        }
    }

    /// Shared sub-protocol: move toward deletion once announcing is settled.
    fn schedule_delete_if_needed(&mut self) -> Transition {
        if !self.deleted {
            match self.subject.expiry().map(|expiry| expiry.timestamp()) {
                Some(expiry) => Transition::GoTo(self.schedule_delete(expiry)),
                None => {
                    self.do_delete();
                    Transition::GoTo(ExpiryState::Deleted)
                }
            }
        } else if self.acknowledged {
            // Already deleted and acknowledged; done.
            Transition::Stop
        } else {
            // Deleted but unacknowledged; let the post-deletion branch decide
            // whether a final announcement is due.
            self.self_send(ControllerEvent::SubjectDeleted);
            Transition::GoTo(ExpiryState::Deleted)
        }
    }

    /// Schedule the DELETE timer for `expiry`, deleting at once if overdue.
    fn schedule_delete(&mut self, expiry: Timestamp) -> ExpiryState {
        let now = self.clock.now();
        if now.is_before(expiry) {
            let delay = truncate_to_one_day(now.duration_until(expiry) + ANNOUNCEMENT_WINDOW);
            tracing::debug!(?delay, expiry = %expiry, "scheduling deletion");
            self.timers.schedule(TimerKey::Delete, delay);
            ExpiryState::ToDelete
        } else {
            tracing::debug!(subject = %self.subject.id(), "subject expired, deleting");
            self.do_delete();
            ExpiryState::Deleted
        }
    }

    /// Forward the delete command and drop any pending DELETE timer.
    fn do_delete(&mut self) {
        self.forwarder.tell(self.delete_command());
        self.timers.cancel(TimerKey::Delete);
    }

    fn delete_command(&self) -> DeleteExpiredSubject {
        DeleteExpiredSubject::new(self.policy_id.clone(), self.subject.id().clone())
    }

    /// Schedule the ANNOUNCE timer toward `target`, firing at once when the
    /// target is inside the announcement window (or already past).
    fn schedule_announcement(&mut self, now: Timestamp, target: Timestamp) {
        let delay = now.duration_until(target);
        if delay < ANNOUNCEMENT_WINDOW {
            tracing::debug!(now = %now, target = %target, "announcement due now");
            self.self_send(ControllerEvent::Announce);
        } else {
            let delay = truncate_to_one_day(delay);
            tracing::debug!(?delay, target = %target, "scheduling announcement");
            self.timers.schedule(TimerKey::Announce, delay);
        }
    }

    /// Publish the announcement, starting an aggregator when acks are due.
    ///
    /// Returns true when an aggregator was started and an outcome event will
    /// arrive later. Nothing is published once the announcement has been
    /// acknowledged, or when the subject carries no announcement policy.
    fn publish_and_collect_acks(&mut self) -> bool {
        let Some(announcement_policy) = self.subject.announcement() else {
            return false;
        };
        if self.acknowledged {
            return false;
        }

        let headers = AnnouncementHeaders::for_announcement(announcement_policy);
        let announcement = SubjectDeletionAnnouncement::new(
            self.policy_id.clone(),
            self.delete_at,
            self.subject.id().clone(),
            headers,
        );
        tracing::debug!(
            correlation_id = %announcement.headers.correlation_id,
            delete_at = %announcement.delete_at,
            "publishing announcement"
        );

        if announcement.headers.ack_requests.is_empty() {
            if let Err(error) = self.bus.publish(announcement, None) {
                tracing::warn!(error = %error, "failed to publish announcement");
            }
            false
        } else {
            let timeout = announcement
                .headers
                .timeout()
                .map(|timeout| timeout.min(self.persistence_timeout))
                .unwrap_or(self.persistence_timeout);
            AckAggregator::start(
                self.bus.clone(),
                announcement,
                timeout,
                self.events_tx.clone(),
            );
            true
        }
    }

    fn is_in_grace_period(&self, announcement_instant: Timestamp) -> bool {
        let expiration = self
            .subject
            .expiry()
            .map(|expiry| expiry.timestamp())
            .unwrap_or(self.delete_at);
        announcement_instant.is_before(expiration.plus(self.grace_period))
    }

    fn self_send(&self, event: ControllerEvent) {
        let _ = self.events_tx.send(event);
    }
}
