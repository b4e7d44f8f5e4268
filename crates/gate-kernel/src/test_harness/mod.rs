// Test harness module
// Seeded multi-session simulator for the gate

pub mod simulator;

pub use simulator::*;

/// Entry points for stress runs and multi-seed certification
pub struct TestHarness;

impl TestHarness {
    pub async fn run_stress_test(sessions: usize, steps_per_session: u64) -> StressTestReport {
        tracing::info!(sessions, steps_per_session, "running gate stress test");

        let config = SimulatorConfig {
            seed: 12345,
            sessions,
            steps_per_session,
            ..Default::default()
        };
        let report = run_simulator(config).await;

        StressTestReport {
            sessions,
            steps_per_session,
            violations: report.violations.len(),
            success: report.passed(),
        }
    }

    /// Run the default simulation under several seeds
    pub async fn run_certification() -> CertificationReport {
        const SEEDS: u64 = 10;

        let mut all_passed = true;
        let mut total_violations = 0;

        for seed in 0..SEEDS {
            let report = run_simulator(SimulatorConfig {
                seed,
                ..Default::default()
            })
            .await;
            if !report.passed() {
                tracing::error!(seed, "certification seed failed\n{}", report.generate_text());
                all_passed = false;
            }
            total_violations += report.violations.len();
        }

        CertificationReport {
            passed: all_passed && total_violations == 0,
            total_violations,
            seeds_tested: SEEDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StressTestReport {
    pub sessions: usize,
    pub steps_per_session: u64,
    pub violations: usize,
    pub success: bool,
}

#[derive(Debug, Clone)]
pub struct CertificationReport {
    pub passed: bool,
    pub total_violations: usize,
    pub seeds_tested: u64,
}
