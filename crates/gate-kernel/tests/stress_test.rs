//! Concurrency and simulation runs
//!
//! Run with: cargo test --package gate-kernel --test stress_test

use gate_kernel::prelude::*;
use gate_kernel::test_harness::{run_simulator, SimulatorConfig, TestHarness};
use gate_test_utils::reset_hard;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_concurrent_sessions_share_one_log() {
    let kernel = GateKernel::new(GateConfig::default()).unwrap();
    let mut handles = Vec::new();

    for i in 0..16 {
        let (gate, operator) = kernel.open_session(AgentId::new(format!("agent-{i}")));
        let gate = Arc::new(gate);
        handles.push(tokio::spawn(async move {
            let op = reset_hard();
            for _ in 0..25 {
                let a = gate.evaluate(Action::new(
                    gate.agent_id().clone(),
                    ActionCategory::DestructiveReset,
                    "repo",
                    "reset",
                ));
                assert_eq!(a.verdict, Verdict::Pause);
                operator.confirm_pause();

                let challenge = gate.request_consent_for(&op).unwrap();
                let token = challenge.token().to_string();
                let consent = gate.grant_consent(&challenge, &token).unwrap();
                gate.execute_destructive(&op, consent).await.unwrap();
            }
            (gate.session_id(), op.runs())
        }));
    }

    for handle in handles {
        let (session_id, runs) = handle.await.unwrap();
        assert_eq!(runs, 25);

        let entries = kernel.audit_log().entries_for(session_id);
        assert_eq!(entries.len(), 50);
        for (i, e) in entries.iter().enumerate() {
            assert_eq!(e.session_sequence, i as u64);
        }
    }

    assert_eq!(kernel.audit_log().len(), 16 * 50);
    assert!(kernel.audit_log().verify_integrity().is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_simulator_default_seed() {
    let report = run_simulator(SimulatorConfig::default()).await;
    assert!(report.passed(), "{}", report.generate_text());
    assert!(report.stats.sessions_killed > 0);
    assert!(report.stats.executions > 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_simulator_with_higher_threshold() {
    let report = run_simulator(SimulatorConfig {
        seed: 7,
        escalation_threshold: 4,
        ..Default::default()
    })
    .await;
    assert!(report.passed(), "{}", report.generate_text());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stress_harness_small_run() {
    let report = TestHarness::run_stress_test(4, 200).await;
    assert!(report.success);
    assert_eq!(report.violations, 0);
}
