//! Replays of the history-rewrite incident against a fresh session.

use gate_kernel::prelude::*;
use gate_test_utils::{
    force_push, incident_timeline, install_filter_tool, rewrite_history, TestSession,
};
use pretty_assertions::assert_eq;

#[test]
fn test_install_then_two_rewrites_kills_session() {
    let session = TestSession::open();
    let categories = [
        ActionCategory::InstallTool,
        ActionCategory::RewriteHistory,
        ActionCategory::RewriteHistory,
    ];

    let assessments: Vec<Assessment> = categories
        .iter()
        .map(|c| session.gate.evaluate(session.action(*c)))
        .collect();

    let verdicts: Vec<Verdict> = assessments.iter().map(|a| a.verdict).collect();
    assert_eq!(verdicts, vec![Verdict::Warn, Verdict::Pause, Verdict::Kill]);
    assert_eq!(
        assessments.iter().map(|a| a.escalated).collect::<Vec<_>>(),
        vec![false, false, true]
    );
    assert!(session.gate.is_killed());

    let entries = session.gate.audit_log().entries();
    assert_eq!(entries.len(), 3);
    let logged: Vec<ActionCategory> = entries
        .iter()
        .filter_map(|e| match &e.record {
            AuditRecord::Assessment(a) => Some(a.action.category),
            AuditRecord::Operation(_) => None,
        })
        .collect();
    assert_eq!(logged, categories.to_vec());
}

#[test]
fn test_full_timeline_stops_at_second_rewrite() {
    let session = TestSession::open();
    let timeline = incident_timeline(&session.agent());
    assert_eq!(timeline.len(), 6);

    let mut stopped_at = None;
    for (i, action) in timeline.into_iter().enumerate() {
        let a = session.gate.evaluate(action);
        if a.verdict == Verdict::Kill && stopped_at.is_none() {
            stopped_at = Some(i);
        }
    }

    // Step 3 of 6: protection removal, force push and reset never get through
    assert_eq!(stopped_at, Some(2));
    let state = session.gate.state();
    assert_eq!(state.total_dangerous, 2);
    assert_eq!(state.total_catastrophic, 1);
    assert!(session.gate.audit_log().verify_integrity().is_ok());
}

#[test]
fn test_confirmed_timeline_is_stopped_by_force_push() {
    let session = TestSession::open();
    let mut verdicts = Vec::new();
    for action in incident_timeline(&session.agent()) {
        let a = session.gate.evaluate(action);
        if a.verdict == Verdict::Pause {
            session.operator.confirm_pause();
        }
        verdicts.push(a.verdict);
    }

    assert_eq!(
        verdicts,
        vec![
            Verdict::Warn,
            Verdict::Pause,
            Verdict::Pause,
            Verdict::Pause,
            Verdict::Kill,
            Verdict::Kill,
        ]
    );
}

#[tokio::test]
async fn test_consent_gate_blocks_the_destructive_steps() {
    let session = TestSession::open();
    let install = install_filter_tool();
    let rewrite = rewrite_history("service-backend");
    let push = force_push();

    // Without consent every step is blocked and explains itself
    for op in [&install as &dyn GatedOperation, &rewrite, &push] {
        let result = session.gate.attempt_without_consent(op);
        assert!(result.blocked);
        assert!(result.message.contains("requires explicit user consent"));
    }
    assert_eq!(install.runs() + rewrite.runs() + push.runs(), 0);

    // The user approved the install, nothing else
    let consent = session.approve(&install);
    let result = session.gate.execute_destructive(&install, consent).await.unwrap();
    assert!(result.success);

    // Reusing approval meant for the install on the rewrite fails
    let consent = session.approve(&install);
    let err = session.gate.execute_destructive(&rewrite, consent).await.unwrap_err();
    assert_eq!(err.refusal(), RefusalKind::ConsentMismatch);
    assert_eq!(rewrite.runs(), 0);

    assert_eq!(session.gate.audit_log().len(), 5);
}
