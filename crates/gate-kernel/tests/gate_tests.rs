use gate_kernel::prelude::*;
use gate_test_utils::{force_push, reset_hard, status_check, RecordingOperation, TestSession};
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn refusals(session: &TestSession) -> Vec<Option<RefusalKind>> {
    session
        .gate
        .audit_log()
        .entries()
        .into_iter()
        .filter_map(|e| match e.record {
            AuditRecord::Operation(r) => Some(r.refusal),
            AuditRecord::Assessment(_) => None,
        })
        .collect()
}

#[tokio::test]
async fn test_failed_body_is_not_a_refusal() {
    let session = TestSession::open();
    let op = reset_hard().failing("index.lock exists");
    let consent = session.approve(&op);

    let result = session.gate.execute_destructive(&op, consent).await.unwrap();
    assert!(!result.success);
    assert!(!result.blocked);
    assert!(result.message.contains("index.lock exists"));
    assert_eq!(op.runs(), 1);
    assert_eq!(refusals(&session), vec![None]);
}

#[tokio::test]
async fn test_dynamic_dispatch_matches_static_paths() {
    let session = TestSession::open();
    let status: Arc<RecordingOperation> = Arc::new(status_check());
    let push: Arc<RecordingOperation> = Arc::new(force_push());

    let ok = session
        .gate
        .execute(Operation::Safe(status.clone()), None)
        .await
        .unwrap();
    assert!(ok.success);

    let err = session
        .gate
        .execute(Operation::Destructive(push.clone()), None)
        .await
        .unwrap_err();
    assert_eq!(err.refusal(), RefusalKind::ConsentRequired);

    let consent = session.approve(&*push);
    let ok = session
        .gate
        .execute(Operation::Destructive(push.clone()), Some(consent))
        .await
        .unwrap();
    assert!(ok.success);
    assert_eq!(ok.threat_tier, ThreatTier::Catastrophic);

    assert_eq!(status.runs(), 1);
    assert_eq!(push.runs(), 1);
    assert_eq!(
        refusals(&session),
        vec![None, Some(RefusalKind::ConsentRequired), None]
    );
}

#[tokio::test]
async fn test_every_refusal_kind_is_audited() {
    let session = TestSession::open();
    let reset = reset_hard();
    let push = force_push();

    assert!(session.gate.execute_safe(&reset).await.is_err());

    let consent = session.approve(&reset);
    assert!(session.gate.execute_destructive(&push, consent).await.is_err());

    let consent = session.approve(&reset);
    session.advance(chrono::Duration::seconds(301));
    assert!(session.gate.execute_destructive(&reset, consent).await.is_err());

    session.gate.evaluate(session.action(ActionCategory::ForcePush));
    assert!(session.gate.execute_safe(&status_check()).await.is_err());

    assert_eq!(
        refusals(&session),
        vec![
            Some(RefusalKind::ConsentRequired),
            Some(RefusalKind::ConsentMismatch),
            Some(RefusalKind::ConsentExpired),
            Some(RefusalKind::SessionTerminated),
        ]
    );
    assert_eq!(reset.runs() + push.runs(), 0);
}

#[tokio::test]
async fn test_attempt_after_kill_is_recorded_as_terminated() {
    let session = TestSession::open();
    session.gate.evaluate(session.action(ActionCategory::ForcePush));

    let result = session.gate.attempt_without_consent(&reset_hard());
    assert!(result.blocked);
    assert_eq!(refusals(&session), vec![Some(RefusalKind::SessionTerminated)]);
}

#[tokio::test]
async fn test_audit_export_round_trips() {
    let session = TestSession::open();
    session.gate.evaluate(session.action(ActionCategory::InstallTool));
    session.gate.execute_safe(&status_check()).await.unwrap();

    let exported = session.gate.audit_log().to_json_lines().unwrap();
    let parsed: Vec<AuditEntry> = exported
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(parsed.len(), 2);
    assert_eq!(parsed[1].prev_hash, parsed[0].hash);
    assert!(matches!(parsed[0].record, AuditRecord::Assessment(ref a) if a.verdict == Verdict::Warn));
}
