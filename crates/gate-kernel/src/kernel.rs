//! Session factory
//!
//! A [`GateKernel`] owns configuration, the clock and the audit log shared
//! by every session. Opening a session yields two handles: the
//! [`AuthorizationGate`] the agent drives, and the [`OperatorChannel`] kept
//! by the human side. Only the latter can confirm a pause.

use crate::audit::AuditLog;
use crate::clock::{Clock, SystemClock};
use crate::config::GateConfig;
use crate::consent::ConsentProtocol;
use crate::error::ConfigError;
use crate::escalation::{EscalationTracker, SessionState};
use crate::gate::AuthorizationGate;
use crate::types::{AgentId, SessionId};
use parking_lot::Mutex;
use std::sync::Arc;

pub struct GateKernel {
    config: GateConfig,
    clock: Arc<dyn Clock>,
    audit: Arc<AuditLog>,
}

impl GateKernel {
    /// Create a kernel on the wall clock
    pub fn new(config: GateConfig) -> Result<Self, ConfigError> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: GateConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            clock,
            audit: Arc::new(AuditLog::new()),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Start a session with its own tracker and pending-challenge set
    pub fn open_session(&self, agent_id: AgentId) -> (AuthorizationGate, OperatorChannel) {
        let session_id = SessionId::new();
        let tracker = Arc::new(Mutex::new(EscalationTracker::with_threshold(
            self.config.escalation_threshold,
        )));

        tracing::info!(session = %session_id, agent = %agent_id, "session opened");

        let gate = AuthorizationGate::new(
            session_id,
            agent_id,
            ConsentProtocol::new(self.clock.clone(), &self.config),
            tracker.clone(),
            self.audit.clone(),
            self.clock.clone(),
            self.config.operation_timeout(),
        );
        let operator = OperatorChannel {
            session_id,
            tracker,
        };
        (gate, operator)
    }
}

/// Human-side handle for one session. Never hand this to the agent.
pub struct OperatorChannel {
    session_id: SessionId,
    tracker: Arc<Mutex<EscalationTracker>>,
}

impl OperatorChannel {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Confirm the paused action, resetting the consecutive-danger count.
    ///
    /// Returns `false` and changes nothing if the session was killed.
    pub fn confirm_pause(&self) -> bool {
        let applied = self.tracker.lock().confirm_pause();
        if applied {
            tracing::info!(session = %self.session_id, "operator confirmed pause");
        } else {
            tracing::warn!(session = %self.session_id, "confirmation ignored, session terminated");
        }
        applied
    }

    pub fn state(&self) -> SessionState {
        self.tracker.lock().state()
    }

    pub fn is_killed(&self) -> bool {
        self.tracker.lock().is_killed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::EscalationPhase;
    use crate::types::{Action, ActionCategory, Verdict};

    fn action(category: ActionCategory) -> Action {
        Action::new(AgentId::new("agent"), category, "repo", "test")
    }

    #[test]
    fn rejects_invalid_config() {
        let config = GateConfig::default().with_escalation_threshold(1);
        assert!(GateKernel::new(config).is_err());
    }

    #[test]
    fn sessions_do_not_share_escalation_state() {
        let kernel = GateKernel::new(GateConfig::default()).unwrap();
        let (a, _) = kernel.open_session(AgentId::new("a"));
        let (b, _) = kernel.open_session(AgentId::new("b"));

        assert_eq!(a.evaluate(action(ActionCategory::RewriteHistory)).verdict, Verdict::Pause);
        // A safe action elsewhere must not reset a's counter
        assert_eq!(b.evaluate(action(ActionCategory::NormalOperation)).verdict, Verdict::Allow);
        assert_eq!(a.evaluate(action(ActionCategory::RewriteHistory)).verdict, Verdict::Kill);
        assert!(!b.is_killed());
        assert_eq!(kernel.audit_log().len(), 3);
    }

    #[test]
    fn operator_confirmation_clears_pause() {
        let kernel = GateKernel::new(GateConfig::default()).unwrap();
        let (gate, operator) = kernel.open_session(AgentId::new("agent"));

        gate.evaluate(action(ActionCategory::ModifyPermissions));
        assert_eq!(operator.state().phase(), EscalationPhase::Paused);
        assert!(operator.confirm_pause());
        assert_eq!(gate.state().consecutive_dangerous, 0);
        assert_eq!(
            gate.evaluate(action(ActionCategory::DestructiveReset)).verdict,
            Verdict::Pause
        );
    }

    #[cfg(not(feature = "strict-debug"))]
    #[test]
    fn operator_cannot_revive_killed_session() {
        let kernel = GateKernel::new(GateConfig::default()).unwrap();
        let (gate, operator) = kernel.open_session(AgentId::new("agent"));

        gate.evaluate(action(ActionCategory::ForcePush));
        assert!(!operator.confirm_pause());
        assert!(operator.is_killed());
        assert_eq!(
            gate.evaluate(action(ActionCategory::NormalOperation)).verdict,
            Verdict::Kill
        );
    }
}
