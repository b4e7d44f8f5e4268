//! Escalation Tracker (circuit breaker)
//!
//! Converts a session's stream of risk tiers into verdicts. The tracker
//! recognises trajectories, not just individual actions: one DANGEROUS action
//! pauses for operator confirmation, a second one in a row without an
//! intervening confirmation is treated as an uncontrolled trajectory and kills
//! the session.
//!
//! | Current | Input | Counters | Verdict | Next |
//! |---|---|---|---|---|
//! | killed | any | - | KILL | killed |
//! | live | SAFE | consecutive := 0 | ALLOW | - |
//! | live | ELEVATED | - | WARN | - |
//! | live | DANGEROUS, consecutive becomes 1 | +1 both | PAUSE | paused |
//! | live | DANGEROUS, consecutive reaches threshold | +1 both | KILL (escalated) | killed |
//! | live | CATASTROPHIC | - | KILL | killed |
//!
//! `killed` is absorbing: nothing in this module clears it.

use crate::classifier;
use crate::config::DEFAULT_ESCALATION_THRESHOLD;
use crate::types::{Action, RiskTier, Verdict};
use serde::{Deserialize, Serialize};

/// The tracker's evaluation of one action. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assessment {
    pub action: Action,
    pub risk_tier: RiskTier,
    pub verdict: Verdict,
    pub reasoning: String,
    /// Verdict was raised because of the session's trajectory, not this action alone
    pub escalated: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EscalationPhase {
    Normal,
    /// Last verdict was PAUSE; awaiting operator confirmation
    Paused,
    Killed,
}

/// Per-session counters. One instance per session, never shared.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    pub consecutive_dangerous: u32,
    pub total_dangerous: u32,
    pub total_catastrophic: u32,
    pub killed: bool,
    pub awaiting_confirmation: bool,
}

impl SessionState {
    pub fn phase(&self) -> EscalationPhase {
        if self.killed {
            EscalationPhase::Killed
        } else if self.awaiting_confirmation {
            EscalationPhase::Paused
        } else {
            EscalationPhase::Normal
        }
    }
}

#[derive(Debug, Clone)]
pub struct EscalationTracker {
    state: SessionState,
    threshold: u32,
}

impl EscalationTracker {
    pub fn new() -> Self {
        Self::with_threshold(DEFAULT_ESCALATION_THRESHOLD)
    }

    /// Thresholds below the default are clamped up to it
    pub fn with_threshold(threshold: u32) -> Self {
        Self {
            state: SessionState::default(),
            threshold: threshold.max(DEFAULT_ESCALATION_THRESHOLD),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_killed(&self) -> bool {
        self.state.killed
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    /// Classify the action and fold its risk tier into session state
    pub fn evaluate(&mut self, action: Action) -> Assessment {
        let tier = classifier::risk_tier(action.category);
        self.evaluate_tier(action, tier)
    }

    /// Fold an already-assessed risk tier into session state
    pub fn evaluate_tier(&mut self, action: Action, tier: RiskTier) -> Assessment {
        if self.state.killed {
            return Assessment {
                action,
                risk_tier: tier,
                verdict: Verdict::Kill,
                reasoning: "Session already terminated. No further actions permitted.".to_string(),
                escalated: false,
            };
        }

        match tier {
            RiskTier::Safe => {
                self.state.consecutive_dangerous = 0;
                self.state.awaiting_confirmation = false;
                Assessment {
                    action,
                    risk_tier: tier,
                    verdict: Verdict::Allow,
                    reasoning: "Routine operation. No intervention required.".to_string(),
                    escalated: false,
                }
            }
            // Precursors: neither reset nor advance the consecutive counter
            RiskTier::Elevated => Assessment {
                action,
                risk_tier: tier,
                verdict: Verdict::Warn,
                reasoning: "Elevated risk: operation may precede destructive actions. Logged and monitored."
                    .to_string(),
                escalated: false,
            },
            RiskTier::Dangerous => {
                self.state.consecutive_dangerous += 1;
                self.state.total_dangerous += 1;

                if self.state.consecutive_dangerous >= self.threshold {
                    self.kill();
                    return Assessment {
                        action,
                        risk_tier: RiskTier::Catastrophic,
                        verdict: Verdict::Kill,
                        reasoning: format!(
                            "Escalation: {} consecutive DANGEROUS operations without operator \
                             confirmation. Session terminated.",
                            self.state.consecutive_dangerous
                        ),
                        escalated: true,
                    };
                }

                self.state.awaiting_confirmation = true;
                Assessment {
                    action,
                    risk_tier: tier,
                    verdict: Verdict::Pause,
                    reasoning: "DANGEROUS operation. Paused until an operator confirms; \
                                the agent cannot resume on its own."
                        .to_string(),
                    escalated: false,
                }
            }
            RiskTier::Catastrophic => {
                self.kill();
                Assessment {
                    action,
                    risk_tier: tier,
                    verdict: Verdict::Kill,
                    reasoning: "CATASTROPHIC operation. Session terminated immediately.".to_string(),
                    escalated: false,
                }
            }
        }
    }

    /// Operator confirmed the paused action. No effect once killed.
    ///
    /// Returns whether the confirmation was applied.
    pub fn confirm_pause(&mut self) -> bool {
        if self.state.killed {
            #[cfg(feature = "strict-debug")]
            panic!("confirm_pause called on a killed session");

            return false;
        }
        self.state.consecutive_dangerous = 0;
        self.state.awaiting_confirmation = false;
        true
    }

    fn kill(&mut self) {
        self.state.killed = true;
        self.state.awaiting_confirmation = false;
        self.state.total_catastrophic += 1;
    }
}

impl Default for EscalationTracker {
    fn default() -> Self {
        Self::new()
    }
}
