//! Bus errors.
//!
//! # Error Code Convention
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`RouteError::NoSuchTopic`] | `BUS_NO_SUCH_TOPIC` | Yes |
//! | [`RouteError::ServiceNotFound`] | `BUS_SERVICE_NOT_FOUND` | Yes |
//! | [`RouteError::HandlingUnavailable`] | `BUS_HANDLING_UNAVAILABLE` | No |
//! | [`RouteError::RelayLoop`] | `BUS_RELAY_LOOP` | No |
//! | [`BadCast`] | `PAYLOAD_BAD_CAST` | No |
//!
//! A missing topic or service is recoverable because registration can
//! happen at any time; the rest require the caller to change something.

use thiserror::Error;
use trellis_types::{ErrorCode, Handling};

/// Errors produced while routing messages through the trie.
#[derive(Debug, Error)]
pub enum RouteError {
    /// A lookup named a topic with no corresponding resource node.
    #[error("no such topic: {0}")]
    NoSuchTopic(String),

    /// A request found no service willing to accept it, at its
    /// destination or (for recursive requests) any ancestor.
    ///
    /// This never turns into a response; the issuing caller must
    /// handle it.
    #[error("no service available: {0}")]
    ServiceNotFound(String),

    /// The accepting receiver lacks a capability the message requires
    /// and no interceptor is installed.
    #[error("receiver at '{topic}' cannot satisfy handling requirements {missing:?}")]
    HandlingUnavailable {
        /// Path of the message destination.
        topic: String,
        /// The requirement bits the receiver does not support.
        missing: Handling,
    },

    /// A relay's destination lies inside its own source subtree, which
    /// would forward traffic back into itself forever.
    #[error("relay from '{source_topic}' to '{destination}' would loop")]
    RelayLoop {
        /// Path the relay listens on.
        source_topic: String,
        /// Path the relay forwards to.
        destination: String,
    },
}

impl ErrorCode for RouteError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoSuchTopic(_) => "BUS_NO_SUCH_TOPIC",
            Self::ServiceNotFound(_) => "BUS_SERVICE_NOT_FOUND",
            Self::HandlingUnavailable { .. } => "BUS_HANDLING_UNAVAILABLE",
            Self::RelayLoop { .. } => "BUS_RELAY_LOOP",
        }
    }

    fn is_recoverable(&self) -> bool {
        matches!(self, Self::NoSuchTopic(_) | Self::ServiceNotFound(_))
    }
}

/// A payload retrieval failed because the stored value has a different
/// type, or cannot be moved out of shared ownership.
#[derive(Debug, Error)]
#[error("payload cannot be taken as `{expected}`")]
pub struct BadCast {
    /// Name of the requested type.
    pub expected: &'static str,
}

impl ErrorCode for BadCast {
    fn code(&self) -> &'static str {
        "PAYLOAD_BAD_CAST"
    }

    fn is_recoverable(&self) -> bool {
        false
    }
}

/// A service handler failed with a status.
///
/// The carried status is delivered to the requester as the response,
/// covering both "the handler decided on an error status" and "the
/// handler failed with an underlying error worth a status".
#[derive(Debug)]
pub struct StatusError {
    /// The status delivered as the response.
    pub status: trellis_types::Status,
    /// Optional underlying cause, kept for logging.
    pub source: Option<anyhow::Error>,
}

impl StatusError {
    /// Creates a status-only failure.
    #[must_use]
    pub fn new(status: trellis_types::Status) -> StatusError {
        StatusError {
            status,
            source: None,
        }
    }

    /// Attaches an underlying cause.
    #[must_use]
    pub fn with_source(status: trellis_types::Status, source: anyhow::Error) -> StatusError {
        StatusError {
            status,
            source: Some(source),
        }
    }
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.source {
            Some(source) => write!(f, "service failed: {} ({source})", self.status),
            None => write!(f, "service failed: {}", self.status),
        }
    }
}

impl std::error::Error for StatusError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<trellis_types::Status> for StatusError {
    fn from(status: trellis_types::Status) -> Self {
        StatusError::new(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_types::{assert_error_codes, Status};

    #[test]
    fn route_error_codes() {
        assert_error_codes(
            &[
                RouteError::NoSuchTopic("a/b".into()),
                RouteError::ServiceNotFound("a/b".into()),
                RouteError::HandlingUnavailable {
                    topic: "a".into(),
                    missing: Handling::REALTIME,
                },
                RouteError::RelayLoop {
                    source_topic: "a".into(),
                    destination: "a/b".into(),
                },
            ],
            "BUS_",
        );
    }

    #[test]
    fn recoverability() {
        assert!(RouteError::NoSuchTopic("x".into()).is_recoverable());
        assert!(RouteError::ServiceNotFound("x".into()).is_recoverable());
        assert!(!RouteError::RelayLoop {
            source_topic: "a".into(),
            destination: "a/b".into()
        }
        .is_recoverable());
    }

    #[test]
    fn bad_cast_code() {
        let err = BadCast { expected: "i32" };
        assert_eq!(err.code(), "PAYLOAD_BAD_CAST");
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("i32"));
    }

    #[test]
    fn status_error_from_status() {
        let err = StatusError::from(Status::GONE);
        assert_eq!(err.status, Status::GONE);
        assert!(err.source.is_none());
        assert!(err.to_string().contains("410"));
    }

    #[test]
    fn status_error_with_source() {
        let err = StatusError::with_source(
            Status::INTERNAL_SERVER_ERROR,
            anyhow::anyhow!("backend offline"),
        );
        assert!(err.to_string().contains("backend offline"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
