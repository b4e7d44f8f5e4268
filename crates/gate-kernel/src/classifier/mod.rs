//! Operation classifier
//!
//! Static, total mapping from an action category to its escalation risk and
//! its consent profile. Pure data: consulted by the escalation tracker for
//! the risk tier and by the gate to decide whether consent is demanded.

use crate::types::{ActionCategory, OperationDomain, RiskTier, ThreatTier};
use serde::{Deserialize, Serialize};

/// Consent profile of a category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationProfile {
    pub threat_tier: ThreatTier,
    pub domain: OperationDomain,
    pub reversible: bool,
}

impl OperationProfile {
    pub fn requires_consent(&self) -> bool {
        self.threat_tier != ThreatTier::Safe
    }
}

/// Risk tier fed to the escalation tracker
pub const fn risk_tier(category: ActionCategory) -> RiskTier {
    use ActionCategory::*;
    match category {
        NormalOperation | RestoreProtection => RiskTier::Safe,
        InstallTool => RiskTier::Elevated,
        RewriteHistory | ModifyPermissions | DestructiveReset => RiskTier::Dangerous,
        ForcePush => RiskTier::Catastrophic,
    }
}

pub const fn profile(category: ActionCategory) -> OperationProfile {
    use ActionCategory::*;
    let (threat_tier, domain, reversible) = match category {
        NormalOperation => (ThreatTier::Safe, OperationDomain::Local, true),
        InstallTool => (ThreatTier::Catastrophic, OperationDomain::Local, false),
        RewriteHistory => (ThreatTier::Catastrophic, OperationDomain::Local, false),
        // Protection can be re-enabled, but damage may be done in between
        ModifyPermissions => (ThreatTier::Destructive, OperationDomain::Security, true),
        ForcePush => (ThreatTier::Catastrophic, OperationDomain::Remote, false),
        DestructiveReset => (ThreatTier::Destructive, OperationDomain::Local, false),
        RestoreProtection => (ThreatTier::Safe, OperationDomain::Security, true),
    };
    OperationProfile {
        threat_tier,
        domain,
        reversible,
    }
}

pub fn requires_consent(category: ActionCategory) -> bool {
    profile(category).requires_consent()
}

/// Full description of a gated operation, derived from its category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationDescriptor {
    pub name: String,
    pub category: ActionCategory,
    pub threat_tier: ThreatTier,
    pub domain: OperationDomain,
    pub reversible: bool,
    pub description: String,
}

impl OperationDescriptor {
    pub fn classify(
        name: impl Into<String>,
        category: ActionCategory,
        description: impl Into<String>,
    ) -> Self {
        let profile = profile(category);
        Self {
            name: name.into(),
            category,
            threat_tier: profile.threat_tier,
            domain: profile.domain,
            reversible: profile.reversible,
            description: description.into(),
        }
    }

    pub fn requires_consent(&self) -> bool {
        self.threat_tier != ThreatTier::Safe
    }
}
