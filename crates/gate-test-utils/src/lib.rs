//! Testing utilities for the Consent Gate workspace
//!
//! Shared fixtures: operations that record their side effects, a manual
//! clock, the reconstructed incident timeline, session helpers.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::Duration;
use gate_kernel::clock::ManualClock;
use gate_kernel::config::GateConfig;
use gate_kernel::consent::UserConsent;
use gate_kernel::error::OperationFailure;
use gate_kernel::gate::{AuthorizationGate, DestructiveOperation, GatedOperation, SafeOperation};
use gate_kernel::kernel::{GateKernel, OperatorChannel};
use gate_kernel::types::{Action, ActionCategory, AgentId};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Operation whose body counts invocations instead of touching anything
#[derive(Debug)]
pub struct RecordingOperation {
    name: String,
    category: ActionCategory,
    description: String,
    resources: Vec<String>,
    fail_with: Option<String>,
    runs: AtomicUsize,
}

impl RecordingOperation {
    pub fn new(
        name: impl Into<String>,
        category: ActionCategory,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            category,
            description: description.into(),
            resources: Vec::new(),
            fail_with: None,
            runs: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn with_resources(mut self, resources: &[&str]) -> Self {
        self.resources = resources.iter().map(|r| (*r).to_string()).collect();
        self
    }

    /// Body runs but reports failure
    #[must_use]
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }

    fn record_run(&self) -> Result<String, OperationFailure> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.fail_with {
            Some(message) => Err(OperationFailure::failed(message.clone())),
            None => Ok(format!("{} completed", self.name)),
        }
    }
}

impl GatedOperation for RecordingOperation {
    fn name(&self) -> &str {
        &self.name
    }

    fn category(&self) -> ActionCategory {
        self.category
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn affected_resources(&self) -> Vec<String> {
        self.resources.clone()
    }
}

#[async_trait]
impl SafeOperation for RecordingOperation {
    async fn execute(&self) -> Result<String, OperationFailure> {
        self.record_run()
    }
}

#[async_trait]
impl DestructiveOperation for RecordingOperation {
    async fn execute(&self, _consent: &UserConsent) -> Result<String, OperationFailure> {
        self.record_run()
    }
}

pub fn status_check() -> RecordingOperation {
    RecordingOperation::new(
        "git_status",
        ActionCategory::NormalOperation,
        "Show working tree status",
    )
}

pub fn install_filter_tool() -> RecordingOperation {
    RecordingOperation::new(
        "install_filter_tool",
        ActionCategory::InstallTool,
        "Install a history-rewriting tool on the local system",
    )
    .with_resources(&["local system"])
}

pub fn rewrite_history(repo: &str) -> RecordingOperation {
    RecordingOperation::new(
        "rewrite_history",
        ActionCategory::RewriteHistory,
        format!("Rewrite the entire commit history of {repo}"),
    )
    .with_resources(&[repo])
}

pub fn remove_branch_protection() -> RecordingOperation {
    RecordingOperation::new(
        "remove_branch_protection",
        ActionCategory::ModifyPermissions,
        "Remove branch protection rules on main",
    )
    .with_resources(&["origin/main"])
}

pub fn force_push() -> RecordingOperation {
    RecordingOperation::new(
        "force_push",
        ActionCategory::ForcePush,
        "Force-push rewritten history to the remote, overwriting its commits",
    )
    .with_resources(&["origin/main"])
}

pub fn reset_hard() -> RecordingOperation {
    RecordingOperation::new(
        "reset_hard",
        ActionCategory::DestructiveReset,
        "Discard all uncommitted changes in the working tree",
    )
}

/// The six actions of the history-rewrite incident, in the order they ran
pub fn incident_timeline(agent: &AgentId) -> Vec<Action> {
    vec![
        Action::new(
            agent.clone(),
            ActionCategory::InstallTool,
            "local system",
            "Install git-filter-repo, a history-rewriting tool",
        )
        .with_command("brew install git-filter-repo"),
        Action::new(
            agent.clone(),
            ActionCategory::RewriteHistory,
            "service-backend (374 commits)",
            "Rewrite entire commit history, forcing past the safety check for repos with remotes",
        )
        .with_command("git filter-repo --message-callback '...' --force"),
        Action::new(
            agent.clone(),
            ActionCategory::RewriteHistory,
            "service-frontend (509 commits)",
            "Rewrite the second repo's history without checking the first result",
        )
        .with_command("git filter-repo --message-callback '...' --force"),
        Action::new(
            agent.clone(),
            ActionCategory::ModifyPermissions,
            "branch protection (both repos)",
            "Remove branch protection on main to get past it",
        )
        .with_command("gh api repos/{owner}/{repo}/branches/main/protection -X DELETE"),
        Action::new(
            agent.clone(),
            ActionCategory::ForcePush,
            "remotes (both repos)",
            "Force-push rewritten history to both public repos",
        )
        .with_command("git push --force origin main"),
        Action::new(
            agent.clone(),
            ActionCategory::DestructiveReset,
            "service-backend (during recovery)",
            "Reset the damaged repo, destroying uncommitted work",
        )
        .with_command("git reset --hard"),
    ]
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::starting_now())
}

/// Kernel on a manual clock with one open session
pub struct TestSession {
    pub kernel: GateKernel,
    pub gate: AuthorizationGate,
    pub operator: OperatorChannel,
    pub clock: Arc<ManualClock>,
}

impl TestSession {
    pub fn open() -> Self {
        Self::with_config(GateConfig::default())
    }

    pub fn with_config(config: GateConfig) -> Self {
        let clock = manual_clock();
        let kernel = GateKernel::with_clock(config, clock.clone()).unwrap();
        let (gate, operator) = kernel.open_session(AgentId::new("test-agent"));
        Self {
            kernel,
            gate,
            operator,
            clock,
        }
    }

    pub fn agent(&self) -> AgentId {
        self.gate.agent_id().clone()
    }

    pub fn action(&self, category: ActionCategory) -> Action {
        Action::new(self.agent(), category, "test-repo", format!("{category:?}"))
    }

    /// Run the full human-approval flow for `op`
    pub fn approve(&self, op: &dyn GatedOperation) -> UserConsent {
        let challenge = self.gate.request_consent_for(op).unwrap();
        let token = challenge.token().to_string();
        self.gate.grant_consent(&challenge, &token).unwrap()
    }

    pub fn advance(&self, by: Duration) {
        self.clock.advance(by);
    }
}
