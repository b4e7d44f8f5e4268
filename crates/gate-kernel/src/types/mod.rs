use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntryId(pub Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity of the agent whose actions a session evaluates
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AgentId(pub String);

impl AgentId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reversibility and blast radius of an operation; decides whether consent is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ThreatTier {
    Safe,
    Destructive,
    Catastrophic,
}

impl ThreatTier {
    pub fn as_u8(self) -> u8 {
        match self {
            ThreatTier::Safe => 0,
            ThreatTier::Destructive => 1,
            ThreatTier::Catastrophic => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ThreatTier::Safe => "SAFE",
            ThreatTier::Destructive => "DESTRUCTIVE",
            ThreatTier::Catastrophic => "CATASTROPHIC",
        }
    }
}

impl fmt::Display for ThreatTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Risk of a single action as seen by the escalation tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Safe,
    Elevated,
    Dangerous,
    Catastrophic,
}

impl RiskTier {
    pub const ALL: [RiskTier; 4] = [
        RiskTier::Safe,
        RiskTier::Elevated,
        RiskTier::Dangerous,
        RiskTier::Catastrophic,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RiskTier::Safe => "SAFE",
            RiskTier::Elevated => "ELEVATED",
            RiskTier::Dangerous => "DANGEROUS",
            RiskTier::Catastrophic => "CATASTROPHIC",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperationDomain {
    /// Only the local working tree
    Local,
    /// A remote repository
    Remote,
    /// Repository security settings
    Security,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Verdict {
    /// Proceed normally
    Allow,
    /// Proceed, but flagged
    Warn,
    /// Halted until an operator confirms
    Pause,
    /// Session terminated
    Kill,
}

impl Verdict {
    /// Whether the evaluated action may go on to the gate without operator involvement
    pub fn permits_execution(self) -> bool {
        matches!(self, Verdict::Allow | Verdict::Warn)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::Allow => "ALLOW",
            Verdict::Warn => "WARN",
            Verdict::Pause => "PAUSE",
            Verdict::Kill => "KILL",
        };
        f.write_str(s)
    }
}

/// Categories of agent operations, ranked by destructive potential
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionCategory {
    NormalOperation,
    InstallTool,
    RewriteHistory,
    ModifyPermissions,
    ForcePush,
    DestructiveReset,
    RestoreProtection,
}

impl ActionCategory {
    pub const ALL: [ActionCategory; 7] = [
        ActionCategory::NormalOperation,
        ActionCategory::InstallTool,
        ActionCategory::RewriteHistory,
        ActionCategory::ModifyPermissions,
        ActionCategory::ForcePush,
        ActionCategory::DestructiveReset,
        ActionCategory::RestoreProtection,
    ];
}

/// A single operation attempted by an agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub agent_id: AgentId,
    pub category: ActionCategory,
    pub target: String,
    pub description: String,
    pub command: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl Action {
    pub fn new(
        agent_id: AgentId,
        category: ActionCategory,
        target: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            agent_id,
            category,
            target: target.into(),
            description: description.into(),
            command: None,
            submitted_at: Utc::now(),
        }
    }

    /// Attach the literal command the agent intended to run
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    #[must_use]
    pub fn at(mut self, submitted_at: DateTime<Utc>) -> Self {
        self.submitted_at = submitted_at;
        self
    }
}
