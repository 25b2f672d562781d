//! Announcement pub/sub and acknowledgement collection.
//!
//! - [`aggregator`] - Ephemeral acknowledgement aggregation task
//! - [`memory`] - In-process bus implementation

pub mod aggregator;
pub mod memory;

use crate::core::error::{HttpStatus, WardenResult};
use crate::policy::announcement::SubjectDeletionAnnouncement;
use crate::policy::subject::AckLabel;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// A single acknowledgement from a downstream consumer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    /// Label the acknowledgement answers.
    pub label: AckLabel,

    /// Outcome status.
    pub status: HttpStatus,

    /// Optional detail message.
    #[serde(default)]
    pub message: Option<String>,
}

impl Acknowledgement {
    /// A successful acknowledgement.
    pub fn successful(label: AckLabel) -> Self {
        Self {
            label,
            status: HttpStatus::OK,
            message: None,
        }
    }

    /// A failed acknowledgement with the given status.
    pub fn failed(label: AckLabel, status: HttpStatus) -> Self {
        Self {
            label,
            status,
            message: None,
        }
    }

    /// The acknowledgement synthesized for a label that never answered.
    pub fn timed_out(label: AckLabel) -> Self {
        Self {
            label,
            status: HttpStatus::REQUEST_TIMEOUT,
            message: Some("acknowledgement not received within timeout".to_string()),
        }
    }
}

/// Aggregated acknowledgement result for one announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgements {
    /// Correlation id of the announcement the acks answer.
    pub correlation_id: String,

    /// Collected (and synthesized) acknowledgements.
    pub acks: Vec<Acknowledgement>,
}

impl Acknowledgements {
    /// Create an aggregate.
    pub fn new(correlation_id: impl Into<String>, acks: Vec<Acknowledgement>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            acks,
        }
    }

    /// Whether any contained status requires the announcement to be
    /// redelivered.
    pub fn requires_redelivery(&self) -> bool {
        self.acks.iter().any(|ack| ack.status.requires_redelivery())
    }
}

/// Pub/sub bus carrying subject deletion announcements.
///
/// Passing an ack reply channel asks subscribers to answer the announcement's
/// requested labels; `None` publishes fire-and-forget.
pub trait AnnouncementBus: Send + Sync + 'static {
    /// Publish an announcement to all subscribers.
    fn publish(
        &self,
        announcement: SubjectDeletionAnnouncement,
        ack_reply: Option<mpsc::UnboundedSender<Acknowledgement>>,
    ) -> WardenResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_redelivery_query() {
        let good = Acknowledgements::new(
            "cid",
            vec![
                Acknowledgement::successful(AckLabel::from("search-index")),
                Acknowledgement::failed(AckLabel::from("cache"), HttpStatus::NOT_FOUND),
            ],
        );
        assert!(!good.requires_redelivery());

        let transient = Acknowledgements::new(
            "cid",
            vec![
                Acknowledgement::successful(AckLabel::from("search-index")),
                Acknowledgement::timed_out(AckLabel::from("cache")),
            ],
        );
        assert!(transient.requires_redelivery());
    }
}
