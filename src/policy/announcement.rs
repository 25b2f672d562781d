//! Subject deletion announcements.

use crate::core::time::Timestamp;
use crate::policy::subject::{AckLabel, PolicyId, SubjectAnnouncement, SubjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Headers attached to a subject deletion announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementHeaders {
    /// Correlation id, fresh per announcement attempt.
    pub correlation_id: String,

    /// Acknowledgement labels the announcement must collect.
    #[serde(default)]
    pub ack_requests: BTreeSet<AckLabel>,

    /// Acknowledgement aggregation deadline in milliseconds, if requested.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl AnnouncementHeaders {
    /// Build headers for a subject's announcement policy.
    ///
    /// Generates a fresh correlation id and copies the requested ack labels
    /// and aggregation timeout.
    pub fn for_announcement(announcement: &SubjectAnnouncement) -> Self {
        Self {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            ack_requests: announcement.requested_ack_labels.clone(),
            timeout_ms: announcement.requested_acks_timeout_ms,
        }
    }

    /// Aggregation timeout, if requested.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Announcement that a subject is about to vanish, or has vanished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectDeletionAnnouncement {
    /// Policy owning the subject.
    pub policy_id: PolicyId,

    /// Instant the subject is (or was) deleted at.
    pub delete_at: Timestamp,

    /// Subjects the announcement is about.
    pub subjects: Vec<SubjectId>,

    /// Announcement headers.
    pub headers: AnnouncementHeaders,
}

impl SubjectDeletionAnnouncement {
    /// Create a single-subject deletion announcement.
    pub fn new(
        policy_id: PolicyId,
        delete_at: Timestamp,
        subject_id: SubjectId,
        headers: AnnouncementHeaders,
    ) -> Self {
        Self {
            policy_id,
            delete_at,
            subjects: vec![subject_id],
            headers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headers_copy_requested_acks() {
        let announcement = SubjectAnnouncement {
            before_expiry_ms: Some(1_000),
            when_deleted: true,
            requested_ack_labels: [AckLabel::from("search-index"), AckLabel::from("cache")]
                .into_iter()
                .collect(),
            requested_acks_timeout_ms: Some(5_000),
        };

        let headers = AnnouncementHeaders::for_announcement(&announcement);
        assert_eq!(headers.ack_requests.len(), 2);
        assert_eq!(headers.timeout(), Some(Duration::from_secs(5)));
        assert!(!headers.correlation_id.is_empty());
    }

    #[test]
    fn fresh_correlation_id_per_attempt() {
        let announcement = SubjectAnnouncement::none();
        let first = AnnouncementHeaders::for_announcement(&announcement);
        let second = AnnouncementHeaders::for_announcement(&announcement);
        assert_ne!(first.correlation_id, second.correlation_id);
    }
}
