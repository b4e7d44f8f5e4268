//! Host-facing traits
//!
//! Integrating hosts can program against these instead of the concrete
//! gate, e.g. to put a session behind an RPC boundary. Operator actions are
//! deliberately absent: they live on [`OperatorChannel`](crate::kernel::OperatorChannel).

use crate::audit::{AuditEntry, AuditLog};
use crate::consent::{ConsentChallenge, UserConsent};
use crate::error::{AuditError, GateError};
use crate::escalation::{Assessment, SessionState};
use crate::gate::AuthorizationGate;
use crate::types::{Action, ThreatTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

pub const GATE_API_VERSION: ApiVersion = ApiVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

pub trait ConsentAuthority {
    fn issue_challenge(
        &self,
        description: String,
        affected_resources: Vec<String>,
        threat_tier: ThreatTier,
    ) -> Result<ConsentChallenge, GateError>;

    fn redeem_challenge(&self, challenge: &ConsentChallenge, response: &str) -> Option<UserConsent>;
}

pub trait EscalationMonitor {
    fn assess(&self, action: Action) -> Assessment;
    fn session_state(&self) -> SessionState;
}

pub trait AuditReader {
    fn audit_entries(&self) -> Vec<AuditEntry>;
    fn verify_audit(&self) -> Result<(), AuditError>;
}

impl ConsentAuthority for AuthorizationGate {
    fn issue_challenge(
        &self,
        description: String,
        affected_resources: Vec<String>,
        threat_tier: ThreatTier,
    ) -> Result<ConsentChallenge, GateError> {
        self.request_consent(description, affected_resources, threat_tier)
    }

    fn redeem_challenge(&self, challenge: &ConsentChallenge, response: &str) -> Option<UserConsent> {
        self.grant_consent(challenge, response)
    }
}

impl EscalationMonitor for AuthorizationGate {
    fn assess(&self, action: Action) -> Assessment {
        self.evaluate(action)
    }

    fn session_state(&self) -> SessionState {
        self.state()
    }
}

/// Scoped to the gate's own session
impl AuditReader for AuthorizationGate {
    fn audit_entries(&self) -> Vec<AuditEntry> {
        self.audit_log().entries_for(self.session_id())
    }

    fn verify_audit(&self) -> Result<(), AuditError> {
        self.audit_log().verify_integrity()
    }
}

impl AuditReader for AuditLog {
    fn audit_entries(&self) -> Vec<AuditEntry> {
        self.entries()
    }

    fn verify_audit(&self) -> Result<(), AuditError> {
        self.verify_integrity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateConfig;
    use crate::kernel::GateKernel;
    use crate::types::{ActionCategory, AgentId, Verdict};

    #[test]
    fn gate_is_usable_through_host_traits() {
        let kernel = GateKernel::new(GateConfig::default()).unwrap();
        let (gate, _) = kernel.open_session(AgentId::new("agent"));
        let (other, _) = kernel.open_session(AgentId::new("other"));

        let challenge = gate
            .issue_challenge("Reset working tree".into(), vec![], ThreatTier::Destructive)
            .unwrap();
        let token = challenge.token().to_string();
        assert!(gate.redeem_challenge(&challenge, &token).is_some());

        let action = Action::new(AgentId::new("agent"), ActionCategory::InstallTool, "pip", "install");
        assert_eq!(gate.assess(action.clone()).verdict, Verdict::Warn);
        other.assess(action);

        assert_eq!(gate.audit_entries().len(), 1);
        assert_eq!(AuditReader::audit_entries(kernel.audit_log().as_ref()).len(), 2);
        assert!(gate.verify_audit().is_ok());
        assert_eq!(gate.session_state().total_dangerous, 0);
    }
}
