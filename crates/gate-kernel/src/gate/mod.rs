//! Authorization Gate
//!
//! The only path through which gated operations run. Safe operations execute
//! unconditionally; destructive ones require a [`UserConsent`] by value, so
//! omitting consent does not type-check. Every call appends exactly one audit
//! record, refused or not.
//!
//! Destructive checks, all before the side effect:
//! 1. session not terminated
//! 2. consent signature verifies
//! 3. consent not older than the consent lifetime
//! 4. consent was granted for this operation's description

use crate::audit::{AuditLog, AuditRecord, OperationRecord};
use crate::classifier::OperationDescriptor;
use crate::clock::Clock;
use crate::consent::{ConsentChallenge, ConsentProtocol, UserConsent};
use crate::error::{GateError, OperationFailure};
use crate::escalation::{Assessment, EscalationTracker, SessionState};
use crate::types::{Action, ActionCategory, AgentId, SessionId, ThreatTier, Verdict};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Identity shared by every operation the gate can run
pub trait GatedOperation: Send + Sync {
    fn name(&self) -> &str;
    fn category(&self) -> ActionCategory;
    fn description(&self) -> &str;

    fn affected_resources(&self) -> Vec<String> {
        Vec::new()
    }

    fn descriptor(&self) -> OperationDescriptor {
        OperationDescriptor::classify(self.name(), self.category(), self.description())
    }
}

/// Operation that runs without consent
#[async_trait]
pub trait SafeOperation: GatedOperation {
    async fn execute(&self) -> Result<String, OperationFailure>;
}

/// Operation that runs only with consent bound to it
#[async_trait]
pub trait DestructiveOperation: GatedOperation {
    async fn execute(&self, consent: &UserConsent) -> Result<String, OperationFailure>;
}

/// For hosts that dispatch on operation kind at runtime
#[derive(Clone)]
pub enum Operation {
    Safe(Arc<dyn SafeOperation>),
    Destructive(Arc<dyn DestructiveOperation>),
}

impl Operation {
    pub fn descriptor(&self) -> OperationDescriptor {
        match self {
            Self::Safe(op) => op.descriptor(),
            Self::Destructive(op) => op.descriptor(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    pub success: bool,
    /// Refused by the gate; the body never ran
    pub blocked: bool,
    pub operation_name: String,
    pub message: String,
    pub threat_tier: ThreatTier,
}

impl OperationResult {
    fn completed(descriptor: &OperationDescriptor, outcome: &Result<String, OperationFailure>) -> Self {
        let (success, message) = match outcome {
            Ok(output) => (true, output.clone()),
            Err(failure) => (false, failure.to_string()),
        };
        Self {
            success,
            blocked: false,
            operation_name: descriptor.name.clone(),
            message,
            threat_tier: descriptor.threat_tier,
        }
    }

    fn blocked(descriptor: &OperationDescriptor, message: String) -> Self {
        Self {
            success: false,
            blocked: true,
            operation_name: descriptor.name.clone(),
            message,
            threat_tier: descriptor.threat_tier,
        }
    }
}

/// Agent-facing handle for one session.
///
/// Owns the session's pending challenges and shares its escalation tracker
/// only with the session's [`OperatorChannel`](crate::kernel::OperatorChannel).
pub struct AuthorizationGate {
    session_id: SessionId,
    agent_id: AgentId,
    consent: ConsentProtocol,
    tracker: Arc<Mutex<EscalationTracker>>,
    audit: Arc<AuditLog>,
    clock: Arc<dyn Clock>,
    operation_timeout: Option<Duration>,
}

impl AuthorizationGate {
    pub(crate) fn new(
        session_id: SessionId,
        agent_id: AgentId,
        consent: ConsentProtocol,
        tracker: Arc<Mutex<EscalationTracker>>,
        audit: Arc<AuditLog>,
        clock: Arc<dyn Clock>,
        operation_timeout: Option<Duration>,
    ) -> Self {
        Self {
            session_id,
            agent_id,
            consent,
            tracker,
            audit,
            clock,
            operation_timeout,
        }
    }

    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    pub fn agent_id(&self) -> &AgentId {
        &self.agent_id
    }

    pub fn is_killed(&self) -> bool {
        self.tracker.lock().is_killed()
    }

    pub fn state(&self) -> SessionState {
        self.tracker.lock().state()
    }

    pub fn audit_log(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Issue a challenge; its token must reach a human, not the agent
    pub fn request_consent(
        &self,
        description: impl Into<String>,
        affected_resources: Vec<String>,
        threat_tier: ThreatTier,
    ) -> Result<ConsentChallenge, GateError> {
        self.ensure_live()?;
        Ok(self
            .consent
            .request_consent(description, affected_resources, threat_tier))
    }

    /// Issue a challenge describing `op` exactly as the gate will check it
    pub fn request_consent_for(&self, op: &dyn GatedOperation) -> Result<ConsentChallenge, GateError> {
        let descriptor = op.descriptor();
        self.request_consent(
            descriptor.description,
            op.affected_resources(),
            descriptor.threat_tier,
        )
    }

    pub fn grant_consent(&self, challenge: &ConsentChallenge, response: &str) -> Option<UserConsent> {
        self.consent.grant_consent(challenge, response)
    }

    pub fn pending_challenges(&self) -> usize {
        self.consent.pending_count()
    }

    /// Fold an action into the session's escalation state
    pub fn evaluate(&self, action: Action) -> Assessment {
        let mut tracker = self.tracker.lock();
        let assessment = tracker.evaluate(action);

        match assessment.verdict {
            Verdict::Allow => tracing::debug!(
                session = %self.session_id,
                category = ?assessment.action.category,
                "action allowed"
            ),
            Verdict::Warn => tracing::warn!(
                session = %self.session_id,
                category = ?assessment.action.category,
                reasoning = %assessment.reasoning,
                "elevated action"
            ),
            Verdict::Pause => tracing::warn!(
                session = %self.session_id,
                category = ?assessment.action.category,
                "session paused, awaiting operator confirmation"
            ),
            Verdict::Kill => tracing::error!(
                session = %self.session_id,
                category = ?assessment.action.category,
                escalated = assessment.escalated,
                reasoning = %assessment.reasoning,
                "session killed"
            ),
        }

        // Appended under the tracker lock to keep per-session order
        self.record(AuditRecord::Assessment(assessment.clone()));
        drop(tracker);
        assessment
    }

    pub async fn execute_safe(&self, op: &dyn SafeOperation) -> Result<OperationResult, GateError> {
        let descriptor = op.descriptor();
        self.ensure_live_for(&descriptor)?;

        if descriptor.requires_consent() {
            return Err(self.refuse(
                &descriptor,
                GateError::ConsentRequired {
                    operation: descriptor.name.clone(),
                },
            ));
        }

        let outcome = self.run(op.execute()).await;
        Ok(self.complete(&descriptor, &outcome))
    }

    /// Consumes `consent`: it authorizes at most one execution
    pub async fn execute_destructive(
        &self,
        op: &dyn DestructiveOperation,
        consent: UserConsent,
    ) -> Result<OperationResult, GateError> {
        let descriptor = op.descriptor();
        self.ensure_live_for(&descriptor)?;
        self.validate_consent(&descriptor, &consent)?;

        tracing::info!(
            session = %self.session_id,
            operation = %descriptor.name,
            threat_tier = %descriptor.threat_tier,
            "consent verified, executing"
        );
        let outcome = self.run(op.execute(&consent)).await;
        Ok(self.complete(&descriptor, &outcome))
    }

    pub async fn execute(
        &self,
        op: Operation,
        consent: Option<UserConsent>,
    ) -> Result<OperationResult, GateError> {
        match (op, consent) {
            (Operation::Safe(op), _) => self.execute_safe(&*op).await,
            (Operation::Destructive(op), Some(consent)) => {
                self.execute_destructive(&*op, consent).await
            }
            (Operation::Destructive(op), None) => {
                let descriptor = op.descriptor();
                self.ensure_live_for(&descriptor)?;
                Err(self.refuse(
                    &descriptor,
                    GateError::ConsentRequired {
                        operation: descriptor.name.clone(),
                    },
                ))
            }
        }
    }

    /// Record an attempt to run `op` with no consent at all. Always blocked.
    pub fn attempt_without_consent(&self, op: &dyn GatedOperation) -> OperationResult {
        let descriptor = op.descriptor();
        let message = format!(
            "BLOCKED: {} requires explicit user consent. Threat level: {}. What this operation does: {}",
            descriptor.name, descriptor.threat_tier, descriptor.description
        );
        tracing::warn!(
            session = %self.session_id,
            operation = %descriptor.name,
            threat_tier = %descriptor.threat_tier,
            "operation attempted without consent"
        );

        let result = OperationResult::blocked(&descriptor, message);
        let refusal = if self.is_killed() {
            GateError::SessionTerminated {
                session_id: self.session_id,
            }
        } else {
            GateError::ConsentRequired {
                operation: descriptor.name.clone(),
            }
        };
        self.record(AuditRecord::Operation(OperationRecord {
            result: result.clone(),
            refusal: Some(refusal.refusal()),
        }));
        result
    }

    fn ensure_live(&self) -> Result<(), GateError> {
        if self.is_killed() {
            tracing::warn!(session = %self.session_id, "request refused, session terminated");
            return Err(GateError::SessionTerminated {
                session_id: self.session_id,
            });
        }
        Ok(())
    }

    fn ensure_live_for(&self, descriptor: &OperationDescriptor) -> Result<(), GateError> {
        if self.is_killed() {
            return Err(self.refuse(
                descriptor,
                GateError::SessionTerminated {
                    session_id: self.session_id,
                },
            ));
        }
        Ok(())
    }

    fn validate_consent(
        &self,
        descriptor: &OperationDescriptor,
        consent: &UserConsent,
    ) -> Result<(), GateError> {
        if !consent.is_valid() {
            return Err(self.refuse(
                descriptor,
                GateError::ConsentInvalid {
                    operation: descriptor.name.clone(),
                },
            ));
        }

        let now = self.clock.now();
        if consent.is_expired_at(now, self.consent.ttl()) {
            return Err(self.refuse(
                descriptor,
                GateError::ConsentExpired {
                    operation: descriptor.name.clone(),
                    age_secs: consent.age_at(now).num_seconds(),
                },
            ));
        }

        if consent.description() != descriptor.description {
            return Err(self.refuse(
                descriptor,
                GateError::ConsentMismatch {
                    operation: descriptor.name.clone(),
                    granted_for: consent.description().to_string(),
                    requested: descriptor.description.clone(),
                },
            ));
        }
        Ok(())
    }

    async fn run<F>(&self, body: F) -> Result<String, OperationFailure>
    where
        F: Future<Output = Result<String, OperationFailure>>,
    {
        match self.operation_timeout {
            Some(limit) => match tokio::time::timeout(limit, body).await {
                Ok(outcome) => outcome,
                Err(_) => Err(OperationFailure::TimedOut {
                    timeout_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                }),
            },
            None => body.await,
        }
    }

    fn complete(
        &self,
        descriptor: &OperationDescriptor,
        outcome: &Result<String, OperationFailure>,
    ) -> OperationResult {
        match outcome {
            Ok(_) => tracing::info!(
                session = %self.session_id,
                operation = %descriptor.name,
                "operation completed"
            ),
            Err(failure) => tracing::warn!(
                session = %self.session_id,
                operation = %descriptor.name,
                error = %failure,
                "operation failed"
            ),
        }
        let result = OperationResult::completed(descriptor, outcome);
        self.record(AuditRecord::Operation(OperationRecord {
            result: result.clone(),
            refusal: None,
        }));
        result
    }

    fn refuse(&self, descriptor: &OperationDescriptor, error: GateError) -> GateError {
        if error.is_forgery_suspect() {
            tracing::error!(
                session = %self.session_id,
                operation = %descriptor.name,
                "consent signature invalid, possible forgery"
            );
        } else {
            tracing::warn!(
                session = %self.session_id,
                operation = %descriptor.name,
                refusal = %error.refusal(),
                "operation refused"
            );
        }
        self.record(AuditRecord::Operation(OperationRecord {
            result: OperationResult::blocked(descriptor, error.to_string()),
            refusal: Some(error.refusal()),
        }));
        error
    }

    fn record(&self, record: AuditRecord) {
        if let Err(e) = self.audit.append(self.session_id, self.clock.now(), record) {
            tracing::error!(session = %self.session_id, error = %e, "failed to append audit entry");
        }
    }
}
