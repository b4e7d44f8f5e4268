//! Consent Gate Kernel (gate-kernel)
//!
//! Decides whether an agent's action is permitted to run right now, based on
//! two independent checks:
//! 1. **Consent**: irreversible operations require a single-use, time-boxed,
//!    HMAC-bound proof that a human approved that exact operation.
//! 2. **Escalation**: a per-session circuit breaker folds every action's risk
//!    tier into session state; repeated danger halts the session for good.
//!
//! Every evaluation and every gate call lands in a shared, hash-chained
//! audit log.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gate_kernel::prelude::*;
//!
//! let kernel = GateKernel::new(GateConfig::default())?;
//! let (gate, operator) = kernel.open_session(AgentId::new("agent-7"));
//!
//! let assessment = gate.evaluate(action);
//! if assessment.verdict == Verdict::Pause {
//!     operator.confirm_pause();
//! }
//!
//! let challenge = gate.request_consent_for(&force_push)?;
//! // ... challenge.token() travels to a human over a separate channel ...
//! let consent = gate.grant_consent(&challenge, &typed_by_human).ok_or(...)?;
//! let result = gate.execute_destructive(&force_push, consent).await?;
//! ```

// Core modules
pub mod api;
pub mod audit;
pub mod classifier;
pub mod clock;
pub mod config;
pub mod consent;
pub mod error;
pub mod escalation;
pub mod gate;
pub mod kernel;
pub mod telemetry;
pub mod types;

// Test harness
pub mod test_harness;

// Re-exports
pub use api::*;
pub use error::*;
pub use types::*;

/// Re-export the host-facing surface for convenience
pub mod prelude {
    pub use crate::api::{AuditReader, ConsentAuthority, EscalationMonitor};
    pub use crate::audit::{AuditEntry, AuditLog, AuditRecord, OperationRecord};
    pub use crate::classifier::{OperationDescriptor, OperationProfile};
    pub use crate::clock::{Clock, ManualClock, SystemClock};
    pub use crate::config::GateConfig;
    pub use crate::consent::{ConsentChallenge, ConsentProtocol, UserConsent};
    pub use crate::error::{ConfigError, GateError, OperationFailure, RefusalKind};
    pub use crate::escalation::{Assessment, EscalationTracker, SessionState};
    pub use crate::gate::{
        AuthorizationGate, DestructiveOperation, GatedOperation, Operation, OperationResult,
        SafeOperation,
    };
    pub use crate::kernel::{GateKernel, OperatorChannel};
    pub use crate::types::{
        Action, ActionCategory, AgentId, OperationDomain, RiskTier, SessionId, ThreatTier,
        Verdict,
    };
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Check if running with strict debugging enabled
pub const fn strict_debug() -> bool {
    cfg!(feature = "strict-debug")
}
