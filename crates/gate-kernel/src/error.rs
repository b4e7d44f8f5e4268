//! Error types for the Consent Gate
//!
//! Every gate refusal is structural, not transient: none of them is retried
//! automatically. The caller either obtains fresh, correctly bound consent or
//! accepts that the session is over.

use crate::types::SessionId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Refusals raised by the authorization gate
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Consent-requiring operation invoked without a consent object
    #[error("BLOCKED: {operation} requires user consent")]
    ConsentRequired { operation: String },

    /// HMAC signature did not verify
    #[error(
        "BLOCKED: consent signature for {operation} is invalid; \
         possible attempt to forge consent without user interaction"
    )]
    ConsentInvalid { operation: String },

    /// Consent older than the configured lifetime
    #[error("BLOCKED: consent for {operation} expired {age_secs}s after it was granted; request new approval")]
    ConsentExpired { operation: String, age_secs: i64 },

    /// Consent bound to a different operation
    #[error(
        "BLOCKED: consent was granted for '{granted_for}', not for '{requested}'; \
         each destructive operation requires its own approval"
    )]
    ConsentMismatch {
        operation: String,
        granted_for: String,
        requested: String,
    },

    /// Action submitted after the session was killed
    #[error("session {session_id} has been terminated; no further actions are permitted")]
    SessionTerminated { session_id: SessionId },
}

impl GateError {
    /// The audit classification of this refusal
    #[must_use]
    pub fn refusal(&self) -> RefusalKind {
        match self {
            Self::ConsentRequired { .. } => RefusalKind::ConsentRequired,
            Self::ConsentInvalid { .. } => RefusalKind::ConsentInvalid,
            Self::ConsentExpired { .. } => RefusalKind::ConsentExpired,
            Self::ConsentMismatch { .. } => RefusalKind::ConsentMismatch,
            Self::SessionTerminated { .. } => RefusalKind::SessionTerminated,
        }
    }

    /// Gate refusals are never retried by the kernel
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        false
    }

    /// Signature failures are treated as possible forgery and logged distinctly
    #[inline]
    #[must_use]
    pub fn is_forgery_suspect(&self) -> bool {
        matches!(self, Self::ConsentInvalid { .. })
    }
}

/// Serializable tag recorded in the audit log for each refusal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefusalKind {
    ConsentRequired,
    ConsentInvalid,
    ConsentExpired,
    ConsentMismatch,
    SessionTerminated,
}

impl fmt::Display for RefusalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Failure reported by an operation body after the gate let it run
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperationFailure {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error("operation timed out after {timeout_ms}ms")]
    TimedOut { timeout_ms: u64 },
}

impl OperationFailure {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Audit log errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuditError {
    /// Hash chain broken at the given global sequence number
    #[error("audit chain integrity violated at entry {sequence}")]
    IntegrityViolation { sequence: u64 },

    #[error("failed to encode audit entry: {0}")]
    Encoding(String),
}

impl From<serde_json::Error> for AuditError {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e.to_string())
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A field is outside its permitted range
    #[error("invalid configuration: {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    /// TOML could not be parsed
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusals_map_to_their_audit_kind() {
        let op = "force_push".to_string();
        assert_eq!(
            GateError::ConsentRequired { operation: op.clone() }.refusal(),
            RefusalKind::ConsentRequired
        );
        assert_eq!(
            GateError::ConsentExpired {
                operation: op.clone(),
                age_secs: 301
            }
            .refusal(),
            RefusalKind::ConsentExpired
        );
        assert_eq!(
            GateError::SessionTerminated {
                session_id: SessionId::new()
            }
            .refusal(),
            RefusalKind::SessionTerminated
        );
    }

    #[test]
    fn only_invalid_signatures_are_forgery_suspects() {
        let invalid = GateError::ConsentInvalid {
            operation: "reset_hard".into(),
        };
        let mismatch = GateError::ConsentMismatch {
            operation: "reset_hard".into(),
            granted_for: "a".into(),
            requested: "b".into(),
        };
        assert!(invalid.is_forgery_suspect());
        assert!(!mismatch.is_forgery_suspect());
        assert!(!invalid.is_retryable());
        assert!(!mismatch.is_retryable());
    }
}
