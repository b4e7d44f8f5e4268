//! Gate Simulator - seeded multi-session harness for the kernel
//!
//! Drives concurrent sessions against one shared audit log with random
//! evaluations, operator confirmations, consent flows and safe executions.
//! Verdicts are checked against a reference model of the circuit breaker and
//! the audit log is checked against the calls each session made.

use crate::audit::AuditRecord;
use crate::classifier;
use crate::config::GateConfig;
use crate::consent::UserConsent;
use crate::error::{GateError, OperationFailure, RefusalKind};
use crate::gate::{AuthorizationGate, DestructiveOperation, GatedOperation, Operation, SafeOperation};
use crate::kernel::{GateKernel, OperatorChannel};
use crate::types::{Action, ActionCategory, AgentId, RiskTier, SessionId, Verdict};
use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Base seed; session `i` uses `seed + i`
    pub seed: u64,
    pub sessions: usize,
    pub steps_per_session: u64,
    pub escalation_threshold: u32,
    pub mix: ActionMix,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sessions: 8,
            steps_per_session: 500,
            escalation_threshold: 2,
            mix: ActionMix::default(),
        }
    }
}

/// Probability of each step kind; the remainder goes to safe executions
#[derive(Debug, Clone)]
pub struct ActionMix {
    pub evaluate: f64,
    pub confirm: f64,
    pub consent_flow: f64,
}

impl Default for ActionMix {
    fn default() -> Self {
        Self {
            evaluate: 0.60,
            confirm: 0.10,
            consent_flow: 0.20,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Violation {
    /// Tracker verdict differs from the reference model
    UnexpectedVerdict {
        session: SessionId,
        step: u64,
        category: ActionCategory,
        expected: Verdict,
        actual: Verdict,
    },
    /// Gate call outcome differs from what the session state implies
    UnexpectedOutcome {
        session: SessionId,
        step: u64,
        operation: String,
        expected: String,
        actual: String,
    },
    Invariant(InvariantViolation),
    SessionPanicked { index: usize },
}

#[derive(Debug, Clone)]
pub struct InvariantViolation {
    pub check: InvariantCheck,
    pub details: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvariantCheck {
    KilledIsAbsorbing,
    HashChainIsUnbroken,
    SessionSequenceIsContiguous,
    OneAuditEntryPerCall,
    NoSideEffectOnRefusal,
}

#[derive(Debug, Clone, Default)]
pub struct SimulationStats {
    pub evaluations: u64,
    pub confirmations: u64,
    pub executions: u64,
    pub refusals: u64,
    pub verdicts: HashMap<Verdict, u64>,
    pub sessions_killed: usize,
}

impl SimulationStats {
    fn merge(&mut self, other: &SimulationStats) {
        self.evaluations += other.evaluations;
        self.confirmations += other.confirmations;
        self.executions += other.executions;
        self.refusals += other.refusals;
        self.sessions_killed += other.sessions_killed;
        for (verdict, n) in &other.verdicts {
            *self.verdicts.entry(*verdict).or_insert(0) += n;
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatorReport {
    pub config: SimulatorConfig,
    pub stats: SimulationStats,
    pub violations: Vec<Violation>,
    pub audit_entries: usize,
}

impl SimulatorReport {
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn generate_text(&self) -> String {
        let mut report = String::new();
        report.push_str("=== Gate Simulator Report ===\n\n");
        report.push_str(&format!("Seed: {}\n", self.config.seed));
        report.push_str(&format!("Sessions: {}\n", self.config.sessions));
        report.push_str(&format!("Evaluations: {}\n", self.stats.evaluations));
        report.push_str(&format!("Confirmations: {}\n", self.stats.confirmations));
        report.push_str(&format!("Executions: {}\n", self.stats.executions));
        report.push_str(&format!("Refusals: {}\n", self.stats.refusals));
        report.push_str(&format!("Sessions killed: {}\n", self.stats.sessions_killed));
        report.push_str(&format!("Audit entries: {}\n", self.audit_entries));
        report.push_str(&format!("Violations: {}\n", self.violations.len()));

        if !self.violations.is_empty() {
            report.push_str("\n=== Violations ===\n");
            for (i, v) in self.violations.iter().enumerate() {
                report.push_str(&format!("{}. {:?}\n", i + 1, v));
            }
        }

        report.push_str(&format!(
            "\n=== Result: {} ===\n",
            if self.passed() { "PASS" } else { "FAIL" }
        ));
        report
    }
}

/// Reference circuit breaker the tracker is checked against
#[derive(Debug, Clone, Copy)]
struct ModelSession {
    consecutive: u32,
    killed: bool,
    threshold: u32,
}

impl ModelSession {
    fn step(&mut self, tier: RiskTier) -> Verdict {
        if self.killed {
            return Verdict::Kill;
        }
        match tier {
            RiskTier::Safe => {
                self.consecutive = 0;
                Verdict::Allow
            }
            RiskTier::Elevated => Verdict::Warn,
            RiskTier::Dangerous => {
                self.consecutive += 1;
                if self.consecutive >= self.threshold {
                    self.killed = true;
                    Verdict::Kill
                } else {
                    Verdict::Pause
                }
            }
            RiskTier::Catastrophic => {
                self.killed = true;
                Verdict::Kill
            }
        }
    }

    fn confirm(&mut self) {
        if !self.killed {
            self.consecutive = 0;
        }
    }
}

/// Operation whose body only counts how often it ran
struct SimOperation {
    name: String,
    category: ActionCategory,
    description: String,
    runs: AtomicU64,
}

impl SimOperation {
    fn new(category: ActionCategory) -> Self {
        Self {
            name: format!("{category:?}"),
            category,
            description: format!("simulated {category:?} on sim-repo"),
            runs: AtomicU64::new(0),
        }
    }
}

impl GatedOperation for SimOperation {
    fn name(&self) -> &str {
        &self.name
    }
    fn category(&self) -> ActionCategory {
        self.category
    }
    fn description(&self) -> &str {
        &self.description
    }
}

#[async_trait]
impl SafeOperation for SimOperation {
    async fn execute(&self) -> Result<String, OperationFailure> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} ok", self.name))
    }
}

#[async_trait]
impl DestructiveOperation for SimOperation {
    async fn execute(&self, _consent: &UserConsent) -> Result<String, OperationFailure> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{} ok", self.name))
    }
}

struct SessionRun {
    gate: AuthorizationGate,
    operator: OperatorChannel,
    rng: StdRng,
    model: ModelSession,
    mix: ActionMix,
    safe_op: Arc<SimOperation>,
    destructive_ops: Vec<Arc<SimOperation>>,
    calls: u64,
    expected_runs: u64,
    stats: SimulationStats,
    violations: Vec<Violation>,
}

struct SessionOutcome {
    calls: u64,
    stats: SimulationStats,
    violations: Vec<Violation>,
}

impl SessionRun {
    async fn drive(mut self, steps: u64) -> SessionOutcome {
        for step in 0..steps {
            let r: f64 = self.rng.gen();
            if r < self.mix.evaluate {
                self.evaluate(step);
            } else if r < self.mix.evaluate + self.mix.confirm {
                if crate::strict_debug() && self.operator.is_killed() {
                    continue;
                }
                self.operator.confirm_pause();
                self.model.confirm();
                self.stats.confirmations += 1;
            } else if r < self.mix.evaluate + self.mix.confirm + self.mix.consent_flow {
                self.consent_flow(step).await;
            } else {
                self.safe_execution(step).await;
            }
        }
        self.finish()
    }

    fn evaluate(&mut self, step: u64) {
        let category = ActionCategory::ALL[self.rng.gen_range(0..ActionCategory::ALL.len())];
        let expected = self.model.step(classifier::risk_tier(category));
        let action = Action::new(
            self.gate.agent_id().clone(),
            category,
            "sim-repo",
            format!("step {step}"),
        );
        let actual = self.gate.evaluate(action).verdict;

        self.calls += 1;
        self.stats.evaluations += 1;
        *self.stats.verdicts.entry(actual).or_insert(0) += 1;
        if actual != expected {
            self.violations.push(Violation::UnexpectedVerdict {
                session: self.gate.session_id(),
                step,
                category,
                expected,
                actual,
            });
        }
    }

    async fn safe_execution(&mut self, step: u64) {
        let op = self.safe_op.clone();
        let outcome = self.gate.execute_safe(&*op).await;
        self.calls += 1;
        let expected = if self.model.killed {
            Err(RefusalKind::SessionTerminated)
        } else {
            Ok(())
        };
        self.check_outcome(step, op.name(), expected, &outcome.map(|r| r.success));
    }

    async fn consent_flow(&mut self, step: u64) {
        let index = self.rng.gen_range(0..self.destructive_ops.len());
        let op = self.destructive_ops[index].clone();

        if self.model.killed {
            let refused = matches!(
                self.gate.request_consent_for(&*op),
                Err(GateError::SessionTerminated { .. })
            );
            if !refused {
                self.unexpected(step, op.name(), "request refused", "challenge issued");
            }
            let outcome = self
                .gate
                .execute(Operation::Destructive(op.clone()), None)
                .await;
            self.calls += 1;
            self.check_outcome(
                step,
                op.name(),
                Err(RefusalKind::SessionTerminated),
                &outcome.map(|r| r.success),
            );
            return;
        }

        let challenge = match self.gate.request_consent_for(&*op) {
            Ok(c) => c,
            Err(e) => {
                self.unexpected(step, op.name(), "challenge issued", &e.to_string());
                return;
            }
        };
        let token = challenge.token().to_string();

        match self.rng.gen_range(0..4) {
            // Honest approval
            0 => {
                let outcome = match self.gate.grant_consent(&challenge, &token) {
                    Some(consent) => self.gate.execute_destructive(&*op, consent).await,
                    None => {
                        self.unexpected(step, op.name(), "consent granted", "grant refused");
                        return;
                    }
                };
                self.calls += 1;
                self.check_outcome(step, op.name(), Ok(()), &outcome.map(|r| r.success));
            }
            // Guessed response, then a bypass attempt
            1 => {
                let guess = format!("{:016x}", self.rng.gen::<u64>());
                if guess != token && self.gate.grant_consent(&challenge, &guess).is_some() {
                    self.unexpected(step, op.name(), "guess rejected", "consent granted");
                }
                let result = self.gate.attempt_without_consent(&*op);
                self.calls += 1;
                if !result.blocked {
                    self.unexpected(step, op.name(), "blocked", "not blocked");
                }
                self.stats.refusals += 1;
            }
            // Consent presented for a different operation
            2 => {
                let other = self.destructive_ops[(index + 1) % self.destructive_ops.len()].clone();
                let outcome = match self.gate.grant_consent(&challenge, &token) {
                    Some(consent) => self.gate.execute_destructive(&*other, consent).await,
                    None => {
                        self.unexpected(step, op.name(), "consent granted", "grant refused");
                        return;
                    }
                };
                self.calls += 1;
                self.check_outcome(
                    step,
                    other.name(),
                    Err(RefusalKind::ConsentMismatch),
                    &outcome.map(|r| r.success),
                );
            }
            // Replayed redemption
            _ => {
                let first = self.gate.grant_consent(&challenge, &token);
                if self.gate.grant_consent(&challenge, &token).is_some() {
                    self.unexpected(step, op.name(), "replay rejected", "consent granted twice");
                }
                let outcome = match first {
                    Some(consent) => self.gate.execute_destructive(&*op, consent).await,
                    None => {
                        self.unexpected(step, op.name(), "consent granted", "grant refused");
                        return;
                    }
                };
                self.calls += 1;
                self.check_outcome(step, op.name(), Ok(()), &outcome.map(|r| r.success));
            }
        }
    }

    fn check_outcome(
        &mut self,
        step: u64,
        operation: &str,
        expected: Result<(), RefusalKind>,
        actual: &Result<bool, GateError>,
    ) {
        match (expected, actual) {
            (Ok(()), Ok(true)) => {
                self.stats.executions += 1;
                self.expected_runs += 1;
            }
            (Err(kind), Err(e)) if e.refusal() == kind => self.stats.refusals += 1,
            _ => {
                let expected = match expected {
                    Ok(()) => "executed".to_string(),
                    Err(kind) => kind.to_string(),
                };
                let actual = match actual {
                    Ok(success) => format!("ran (success={success})"),
                    Err(e) => e.refusal().to_string(),
                };
                self.unexpected(step, operation, &expected, &actual);
            }
        }
    }

    fn unexpected(&mut self, step: u64, operation: &str, expected: &str, actual: &str) {
        self.violations.push(Violation::UnexpectedOutcome {
            session: self.gate.session_id(),
            step,
            operation: operation.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        });
    }

    fn finish(mut self) -> SessionOutcome {
        let session = self.gate.session_id();
        let entries = self.gate.audit_log().entries_for(session);

        if entries.len() as u64 != self.calls {
            self.violations.push(invariant(
                InvariantCheck::OneAuditEntryPerCall,
                format!("session {session}: {} calls, {} entries", self.calls, entries.len()),
            ));
        }

        if let Some(gap) = entries
            .iter()
            .enumerate()
            .find(|(i, e)| e.session_sequence != *i as u64)
        {
            self.violations.push(invariant(
                InvariantCheck::SessionSequenceIsContiguous,
                format!("session {session}: entry {} has session_sequence {}", gap.0, gap.1.session_sequence),
            ));
        }

        let mut killed = false;
        for entry in &entries {
            let live_after_kill = match &entry.record {
                AuditRecord::Assessment(a) => {
                    let was_killed = killed;
                    killed |= a.verdict == Verdict::Kill;
                    was_killed && a.verdict != Verdict::Kill
                }
                AuditRecord::Operation(r) => {
                    killed && r.refusal != Some(RefusalKind::SessionTerminated)
                }
            };
            if live_after_kill {
                self.violations.push(invariant(
                    InvariantCheck::KilledIsAbsorbing,
                    format!("session {session}: entry {} processed after kill", entry.sequence),
                ));
                break;
            }
        }

        let runs: u64 = self
            .destructive_ops
            .iter()
            .chain(std::iter::once(&self.safe_op))
            .map(|op| op.runs.load(Ordering::SeqCst))
            .sum();
        if runs != self.expected_runs {
            self.violations.push(invariant(
                InvariantCheck::NoSideEffectOnRefusal,
                format!("session {session}: {runs} bodies ran, {} executions permitted", self.expected_runs),
            ));
        }

        if self.gate.is_killed() {
            self.stats.sessions_killed += 1;
        }

        SessionOutcome {
            calls: self.calls,
            stats: self.stats,
            violations: self.violations,
        }
    }
}

fn invariant(check: InvariantCheck, details: String) -> Violation {
    Violation::Invariant(InvariantViolation { check, details })
}

/// Run the simulator. Sessions run as concurrent tokio tasks.
pub async fn run_simulator(config: SimulatorConfig) -> SimulatorReport {
    let mut violations = Vec::new();
    let mut stats = SimulationStats::default();

    let gate_config = GateConfig::default().with_escalation_threshold(config.escalation_threshold);
    let kernel = match GateKernel::new(gate_config) {
        Ok(kernel) => kernel,
        Err(e) => {
            violations.push(Violation::UnexpectedOutcome {
                session: SessionId::new(),
                step: 0,
                operation: "open kernel".to_string(),
                expected: "valid configuration".to_string(),
                actual: e.to_string(),
            });
            return SimulatorReport {
                config,
                stats,
                violations,
                audit_entries: 0,
            };
        }
    };

    let mut handles = Vec::with_capacity(config.sessions);
    for index in 0..config.sessions {
        let (gate, operator) = kernel.open_session(AgentId::new(format!("sim-agent-{index}")));
        let run = SessionRun {
            gate,
            operator,
            rng: StdRng::seed_from_u64(config.seed.wrapping_add(index as u64)),
            model: ModelSession {
                consecutive: 0,
                killed: false,
                threshold: kernel.config().escalation_threshold,
            },
            mix: config.mix.clone(),
            safe_op: Arc::new(SimOperation::new(ActionCategory::NormalOperation)),
            destructive_ops: ActionCategory::ALL
                .into_iter()
                .filter(|c| classifier::requires_consent(*c))
                .map(|c| Arc::new(SimOperation::new(c)))
                .collect(),
            calls: 0,
            expected_runs: 0,
            stats: SimulationStats::default(),
            violations: Vec::new(),
        };
        handles.push(tokio::spawn(run.drive(config.steps_per_session)));
    }

    let mut total_calls = 0u64;
    for (index, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(outcome) => {
                total_calls += outcome.calls;
                stats.merge(&outcome.stats);
                violations.extend(outcome.violations);
            }
            Err(_) => violations.push(Violation::SessionPanicked { index }),
        }
    }

    let audit = kernel.audit_log();
    if let Err(e) = audit.verify_integrity() {
        violations.push(invariant(InvariantCheck::HashChainIsUnbroken, e.to_string()));
    }
    if audit.len() as u64 != total_calls {
        violations.push(invariant(
            InvariantCheck::OneAuditEntryPerCall,
            format!("{total_calls} calls, {} entries in shared log", audit.len()),
        ));
    }

    tracing::info!(
        seed = config.seed,
        sessions = config.sessions,
        violations = violations.len(),
        "simulation finished"
    );

    SimulatorReport {
        config,
        stats,
        violations,
        audit_entries: audit.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_matches_documented_sequences() {
        let mut model = ModelSession {
            consecutive: 0,
            killed: false,
            threshold: 2,
        };
        assert_eq!(model.step(RiskTier::Dangerous), Verdict::Pause);
        model.confirm();
        assert_eq!(model.step(RiskTier::Dangerous), Verdict::Pause);
        assert_eq!(model.step(RiskTier::Dangerous), Verdict::Kill);
        model.confirm();
        assert_eq!(model.step(RiskTier::Safe), Verdict::Kill);
    }

    #[tokio::test]
    async fn small_simulation_passes() {
        let report = run_simulator(SimulatorConfig {
            sessions: 3,
            steps_per_session: 100,
            ..Default::default()
        })
        .await;
        assert!(report.passed(), "{}", report.generate_text());
        assert!(report.audit_entries > 0);
    }
}
