//! Error types and the acknowledgement status model.
//!
//! Acknowledgements travel with HTTP-style status codes; whether a failed
//! acknowledgement is retried or treated as terminal is decided purely by
//! its status.

use thiserror::Error;

/// HTTP-style status code carried by acknowledgements and ack failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct HttpStatus(pub u16);

impl HttpStatus {
    pub const OK: HttpStatus = HttpStatus(200);
    pub const NO_CONTENT: HttpStatus = HttpStatus(204);
    pub const BAD_REQUEST: HttpStatus = HttpStatus(400);
    pub const NOT_FOUND: HttpStatus = HttpStatus(404);
    pub const REQUEST_TIMEOUT: HttpStatus = HttpStatus(408);
    pub const FAILED_DEPENDENCY: HttpStatus = HttpStatus(424);
    pub const INTERNAL_SERVER_ERROR: HttpStatus = HttpStatus(500);
    pub const SERVICE_UNAVAILABLE: HttpStatus = HttpStatus(503);

    /// Numeric code.
    pub const fn code(self) -> u16 {
        self.0
    }

    /// 2xx success range.
    pub const fn is_success(self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    /// 5xx server error range.
    pub const fn is_server_error(self) -> bool {
        self.0 >= 500 && self.0 < 600
    }

    /// Whether an acknowledgement with this status must be redelivered.
    ///
    /// Request timeouts, failed dependencies and server errors are
    /// considered transient; everything else is terminal for the attempt.
    pub const fn requires_redelivery(self) -> bool {
        matches!(self.0, 408 | 424) || self.is_server_error()
    }
}

impl std::fmt::Display for HttpStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Common warden error conditions.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Acknowledgement collection failed with an HTTP-style status.
    #[error("acknowledgement collection failed ({status}): {message}")]
    AckCollection { status: HttpStatus, message: String },

    /// The announcement bus rejected a publication.
    #[error("announcement bus closed")]
    BusClosed,

    /// The command forwarder channel is gone.
    #[error("command forwarder closed")]
    ForwarderClosed,

    /// The subject descriptor is unusable.
    #[error("invalid subject: {message}")]
    InvalidSubject { message: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl WardenError {
    /// Create an AckCollection error.
    pub fn ack_collection(status: HttpStatus, message: impl Into<String>) -> Self {
        Self::AckCollection {
            status,
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// The HTTP-style status equivalent of this error.
    pub fn status(&self) -> HttpStatus {
        match self {
            Self::AckCollection { status, .. } => *status,
            Self::BusClosed | Self::ForwarderClosed => HttpStatus::SERVICE_UNAVAILABLE,
            Self::InvalidSubject { .. } => HttpStatus::BAD_REQUEST,
            Self::Internal { .. } => HttpStatus::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this error indicates the announcement should be retried.
    pub fn is_retriable(&self) -> bool {
        self.status().requires_redelivery()
    }
}

/// Result type using WardenError.
pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redelivery_predicate() {
        assert!(HttpStatus::REQUEST_TIMEOUT.requires_redelivery());
        assert!(HttpStatus::FAILED_DEPENDENCY.requires_redelivery());
        assert!(HttpStatus::INTERNAL_SERVER_ERROR.requires_redelivery());
        assert!(HttpStatus(599).requires_redelivery());

        assert!(!HttpStatus::OK.requires_redelivery());
        assert!(!HttpStatus::NO_CONTENT.requires_redelivery());
        assert!(!HttpStatus::NOT_FOUND.requires_redelivery());
        assert!(!HttpStatus::BAD_REQUEST.requires_redelivery());
        assert!(!HttpStatus(600).requires_redelivery());
    }

    #[test]
    fn error_status_mapping() {
        let err = WardenError::ack_collection(HttpStatus::SERVICE_UNAVAILABLE, "bus down");
        assert_eq!(err.status(), HttpStatus::SERVICE_UNAVAILABLE);
        assert!(err.is_retriable());

        let err = WardenError::ack_collection(HttpStatus::NOT_FOUND, "no such subject");
        assert!(!err.is_retriable());

        assert!(WardenError::BusClosed.is_retriable());
        assert!(!WardenError::internal("boom").status().is_success());
    }
}
