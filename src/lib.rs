//! Warden - subject expiry lifecycle controller for policy-managed subjects.
//!
//! A subject is an authorization principal attached to a policy. Subjects may
//! expire; warden owns their end of life. One controller per expiring subject
//! announces the upcoming deletion to subscribers, collects acknowledgements
//! with randomized backoff retries inside a bounded grace period, and finally
//! instructs the policy persistence engine to delete the subject.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       Expiry Supervisor                         │
//! │             (one controller per expiring subject)               │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                  Subject Expiry Controller                      │
//! │   TO_ANNOUNCE │ TO_ACKNOWLEDGE │ TO_DELETE │ DELETED            │
//! │        named timers │ backoff │ grace period                    │
//! └─────────────────────────────────────────────────────────────────┘
//!              │                                   │
//! ┌───────────────────────────┐     ┌───────────────────────────────┐
//! │     Announcement Bus      │     │      Command Forwarder        │
//! │  pub/sub + ack aggregation│     │  DeleteExpiredSubject sink    │
//! └───────────────────────────┘     └───────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::error`] - Error types and the acknowledgement status model
//! - [`core::time`] - Wall-clock instants and the injectable clock
//!
//! ## Policy model
//! - [`policy::subject`] - Subjects, expiry descriptors, announcement policies
//! - [`policy::announcement`] - Subject deletion announcements
//! - [`policy::command`] - Commands toward the persistence engine
//! - [`policy::forwarder`] - Outbound command channel
//!
//! ## Announcement bus
//! - [`bus`] - Bus trait and acknowledgement model
//! - [`bus::aggregator`] - Ephemeral acknowledgement aggregation
//! - [`bus::memory`] - In-process bus implementation
//!
//! ## Expiry lifecycle
//! - [`expiry::controller`] - The per-subject lifecycle state machine
//! - [`expiry::supervisor`] - Controller supervision
//! - [`expiry::backoff`] - Randomized retry backoff
//! - [`expiry::timers`] - Named single-shot timers

pub mod bus;
pub mod core;
pub mod expiry;
pub mod policy;
