//! Gate configuration
//!
//! Defaults match the consent and escalation rules the kernel is built around:
//! five minute consent lifetime, escalation on the second consecutive
//! dangerous action.

use crate::error::ConfigError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Upper bound on consent lifetime; no blanket approvals
pub const MAX_CONSENT_TTL_SECS: u64 = 300;

/// Consecutive dangerous actions that escalate to a kill
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 2;

/// Random bytes in a challenge token (hex-encoded to twice as many characters)
pub const DEFAULT_TOKEN_BYTES: usize = 8;

/// Bytes in a per-challenge HMAC key
pub const SIGNING_KEY_BYTES: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Consent lifetime in milliseconds, measured from the grant
    pub consent_ttl_ms: u64,
    /// Consecutive DANGEROUS evaluations that escalate to KILL
    pub escalation_threshold: u32,
    /// Random bytes per challenge token
    pub token_bytes: usize,
    /// Upper bound on an operation body's run time
    pub operation_timeout_ms: Option<u64>,
}

impl GateConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    #[must_use]
    pub fn with_consent_ttl(mut self, ttl: std::time::Duration) -> Self {
        self.consent_ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_escalation_threshold(mut self, threshold: u32) -> Self {
        self.escalation_threshold = threshold;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_token_bytes(mut self, bytes: usize) -> Self {
        self.token_bytes = bytes;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: std::time::Duration) -> Self {
        self.operation_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Parse from TOML, filling unspecified fields with defaults
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consent_ttl_ms == 0 {
            return Err(ConfigError::invalid("consent_ttl_ms", "must be positive"));
        }
        if self.consent_ttl_ms > MAX_CONSENT_TTL_SECS * 1000 {
            return Err(ConfigError::invalid(
                "consent_ttl_ms",
                format!("must not exceed {MAX_CONSENT_TTL_SECS}s"),
            ));
        }
        // A threshold of 1 would kill on the first dangerous action and leave
        // no room for the pause/confirm cycle.
        if self.escalation_threshold < DEFAULT_ESCALATION_THRESHOLD {
            return Err(ConfigError::invalid(
                "escalation_threshold",
                format!("must be at least {DEFAULT_ESCALATION_THRESHOLD}"),
            ));
        }
        if self.token_bytes < DEFAULT_TOKEN_BYTES {
            return Err(ConfigError::invalid(
                "token_bytes",
                format!("must be at least {DEFAULT_TOKEN_BYTES}"),
            ));
        }
        if self.operation_timeout_ms == Some(0) {
            return Err(ConfigError::invalid("operation_timeout_ms", "must be positive"));
        }
        Ok(())
    }

    pub fn consent_ttl(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.consent_ttl_ms).unwrap_or(i64::MAX))
    }

    pub fn operation_timeout(&self) -> Option<std::time::Duration> {
        self.operation_timeout_ms.map(std::time::Duration::from_millis)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            consent_ttl_ms: MAX_CONSENT_TTL_SECS * 1000,
            escalation_threshold: DEFAULT_ESCALATION_THRESHOLD,
            token_bytes: DEFAULT_TOKEN_BYTES,
            operation_timeout_ms: None,
        }
    }
}
