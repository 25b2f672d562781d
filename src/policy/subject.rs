//! Policy subjects and their expiry descriptors.
//!
//! A subject is an authorization principal attached to a policy. Subjects may
//! carry an absolute expiry instant and an announcement policy describing how
//! subscribers are told about the subject's end of life.

use crate::core::time::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Opaque policy entity identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyId(pub String);

impl PolicyId {
    /// Create a policy id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for PolicyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Opaque subject identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SubjectId(pub String);

impl SubjectId {
    /// Create a subject id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SubjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubjectId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Label of an acknowledgement a subscriber is expected to send.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AckLabel(pub String);

impl AckLabel {
    /// Create an ack label from anything string-like.
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl std::fmt::Display for AckLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AckLabel {
    fn from(label: &str) -> Self {
        Self(label.to_string())
    }
}

/// Absolute instant at which a subject must be removed from its policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectExpiry {
    /// Expiry instant.
    pub timestamp: Timestamp,
}

impl SubjectExpiry {
    /// Create an expiry at the given instant.
    pub const fn new(timestamp: Timestamp) -> Self {
        Self { timestamp }
    }

    /// The expiry instant.
    pub const fn timestamp(&self) -> Timestamp {
        self.timestamp
    }
}

/// Announcement policy of a subject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectAnnouncement {
    /// How long before expiry the pre-expiry announcement is sent, in
    /// milliseconds. Absent means no pre-expiry announcement.
    #[serde(default)]
    pub before_expiry_ms: Option<u64>,

    /// Whether to also announce after the subject has been deleted.
    #[serde(default)]
    pub when_deleted: bool,

    /// Acknowledgement labels the announcement must collect.
    #[serde(default)]
    pub requested_ack_labels: BTreeSet<AckLabel>,

    /// Deadline for acknowledgement aggregation, in milliseconds.
    #[serde(default)]
    pub requested_acks_timeout_ms: Option<u64>,
}

impl SubjectAnnouncement {
    /// Announcement policy with no pre-expiry lead, no post-deletion
    /// announcement and no requested acks.
    pub fn none() -> Self {
        Self {
            before_expiry_ms: None,
            when_deleted: false,
            requested_ack_labels: BTreeSet::new(),
            requested_acks_timeout_ms: None,
        }
    }

    /// Lead time before expiry, if configured.
    pub fn before_expiry(&self) -> Option<Duration> {
        self.before_expiry_ms.map(Duration::from_millis)
    }

    /// Requested acknowledgement aggregation deadline, if configured.
    pub fn requested_acks_timeout(&self) -> Option<Duration> {
        self.requested_acks_timeout_ms.map(Duration::from_millis)
    }
}

/// An authorization subject with optional expiry and announcement policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subject {
    /// Subject identifier.
    pub id: SubjectId,

    /// Instant at which the subject must be removed, if any.
    #[serde(default)]
    pub expiry: Option<SubjectExpiry>,

    /// Announcement policy, if any.
    #[serde(default)]
    pub announcement: Option<SubjectAnnouncement>,
}

impl Subject {
    /// Create a subject with neither expiry nor announcement policy.
    pub fn new(id: impl Into<SubjectId>) -> Self {
        Self {
            id: id.into(),
            expiry: None,
            announcement: None,
        }
    }

    /// Attach an expiry instant.
    pub fn with_expiry(mut self, timestamp: Timestamp) -> Self {
        self.expiry = Some(SubjectExpiry::new(timestamp));
        self
    }

    /// Attach an announcement policy.
    pub fn with_announcement(mut self, announcement: SubjectAnnouncement) -> Self {
        self.announcement = Some(announcement);
        self
    }

    /// Subject identifier.
    pub fn id(&self) -> &SubjectId {
        &self.id
    }

    /// Expiry descriptor, if any.
    pub fn expiry(&self) -> Option<&SubjectExpiry> {
        self.expiry.as_ref()
    }

    /// Announcement policy, if any.
    pub fn announcement(&self) -> Option<&SubjectAnnouncement> {
        self.announcement.as_ref()
    }

    /// Instant at which the pre-expiry announcement is due.
    ///
    /// Present only when both the announcement lead time and the expiry are
    /// configured.
    pub fn announcement_instant(&self) -> Option<Timestamp> {
        let before_expiry = self.announcement.as_ref()?.before_expiry()?;
        let expiry = self.expiry.as_ref()?;
        Some(expiry.timestamp().minus(before_expiry))
    }

    /// Whether a post-deletion announcement is configured.
    pub fn announce_when_deleted(&self) -> bool {
        self.announcement
            .as_ref()
            .is_some_and(|announcement| announcement.when_deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn announcement_instant_needs_both_halves() {
        let announcement = SubjectAnnouncement {
            before_expiry_ms: Some(2_000),
            ..SubjectAnnouncement::none()
        };

        let with_both = Subject::new("user:alice")
            .with_expiry(Timestamp::new(10_000))
            .with_announcement(announcement.clone());
        assert_eq!(with_both.announcement_instant(), Some(Timestamp::new(8_000)));

        let no_expiry = Subject::new("user:alice").with_announcement(announcement);
        assert_eq!(no_expiry.announcement_instant(), None);

        let no_lead = Subject::new("user:alice")
            .with_expiry(Timestamp::new(10_000))
            .with_announcement(SubjectAnnouncement::none());
        assert_eq!(no_lead.announcement_instant(), None);
    }

    #[test]
    fn announce_when_deleted_defaults_false() {
        assert!(!Subject::new("user:bob").announce_when_deleted());

        let announcement = SubjectAnnouncement {
            when_deleted: true,
            ..SubjectAnnouncement::none()
        };
        assert!(Subject::new("user:bob")
            .with_announcement(announcement)
            .announce_when_deleted());
    }
}
