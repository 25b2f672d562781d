//! Commands sent to the policy persistence engine.

use crate::policy::subject::{PolicyId, SubjectId};
use serde::{Deserialize, Serialize};

/// Headers attached to policy commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandHeaders {
    /// Whether the sender expects a direct response.
    pub response_required: bool,
}

/// Command instructing the persistence engine to remove an expired subject.
///
/// Deletion confirmation arrives asynchronously as a subject-deleted
/// notification, never as a direct response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteExpiredSubject {
    /// Policy owning the subject.
    pub policy_id: PolicyId,

    /// Subject to delete.
    pub subject_id: SubjectId,

    /// Command headers.
    pub headers: CommandHeaders,
}

impl DeleteExpiredSubject {
    /// Create a delete command with `response_required = false`.
    pub fn new(policy_id: PolicyId, subject_id: SubjectId) -> Self {
        Self {
            policy_id,
            subject_id,
            headers: CommandHeaders {
                response_required: false,
            },
        }
    }
}

/// Commands the lifecycle subsystem forwards to the persistence engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyCommand {
    /// Remove an expired subject from its policy.
    DeleteExpiredSubject(DeleteExpiredSubject),
}

impl From<DeleteExpiredSubject> for PolicyCommand {
    fn from(command: DeleteExpiredSubject) -> Self {
        Self::DeleteExpiredSubject(command)
    }
}
