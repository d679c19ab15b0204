mod utils;
#[allow(unused)]
use utils::*;

use mock_backend::{Behavior, MockBackend};
use std::time::Duration;
use txbench::prelude::*;

fn two_type_backend(behavior: Behavior) -> MockBackend {
    MockBackend::builder()
        .transaction("payment", behavior.clone())
        .transaction("lookup", behavior)
        .finish()
}

#[tokio::test]
async fn unlimited_phase_conserves_counts_across_workers() {
    init();

    let backend = two_type_backend(Behavior::Succeed(Duration::from_millis(1)));
    let config = BenchConfig::new(4)
        .phase(PhaseConfig::timed(Duration::from_secs(1), vec![1.0, 1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    // Every attempt the backend saw is accounted for, per type.
    let payment = report.counts.success(1) + report.counts.retry(1) + report.counts.abort(1);
    let lookup = report.counts.success(2) + report.counts.retry(2) + report.counts.abort(2);
    assert_eq!(payment, backend.attempts("payment"));
    assert_eq!(lookup, backend.attempts("lookup"));
    assert!(payment > 0);
    assert!(lookup > 0);

    // All four workers joined cleanly and released their sessions.
    assert_eq!(backend.connections(), 4);
    assert_eq!(backend.closed(), 4);
    assert!(report.failures.is_empty());
    assert!(report.abandoned.is_empty());

    assert!(!report.samples.is_empty());
    assert!(report.elapsed >= Duration::from_millis(900));
    assert!(report.elapsed <= Duration::from_secs(3));
}

#[tokio::test]
async fn an_always_aborting_workload_is_not_a_failure() {
    init();

    let backend = MockBackend::builder()
        .transaction("reject", Behavior::Abort)
        .finish();
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_millis(500), vec![1.0]).rate(500));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    assert!(report.counts.total_abort() > 0);
    assert_eq!(report.counts.total_success(), 0);
    assert!(report.failures.is_empty());
    assert!(report.abandoned.is_empty());

    // Every abort was rolled back, and aborted attempts are still measured.
    assert_eq!(backend.rollbacks(), report.counts.total_abort());
    assert_eq!(report.samples.len() as u64, report.counts.total_abort());

    // Both workers reached a clean stop.
    assert_eq!(backend.closed(), 2);
}

#[tokio::test]
async fn an_unrecognized_fault_fails_only_that_worker() {
    init();

    let backend = MockBackend::builder()
        .transaction("boom", Behavior::Unknown)
        .finish();
    let config = BenchConfig::new(1)
        .phase(PhaseConfig::timed(Duration::from_secs(10), vec![1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    // Exactly one fatal escalation, zero further attempts.
    assert_eq!(backend.attempts("boom"), 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].worker, 0);
    assert!(report.failures[0].cause.to_string().contains("backend exploded"));

    // The worker still terminated cleanly: flagged, not abandoned.
    assert!(report.abandoned.is_empty());
    assert_eq!(backend.closed(), 1);

    // Zero successes with a failure present, distinguishable from aborts.
    assert_eq!(report.counts.total_success(), 0);
    assert_eq!(report.counts.total_abort(), 0);
    assert!(report.samples.is_empty());
}

#[tokio::test]
async fn serial_phases_clamp_to_one_worker_and_run_each_slot_once() {
    init();

    let backend = MockBackend::builder()
        .transaction("alpha", Behavior::Succeed(Duration::ZERO))
        .transaction("beta", Behavior::Succeed(Duration::ZERO))
        .transaction("gamma", Behavior::Succeed(Duration::ZERO))
        .finish();
    let config = BenchConfig::new(4)
        .phase(PhaseConfig::serial(vec![1.0, 0.0, 1.0]).active_workers(4));

    // Clamping is a warning, not a configuration error.
    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    assert_eq!(backend.attempts("alpha"), 1);
    assert_eq!(backend.attempts("beta"), 0);
    assert_eq!(backend.attempts("gamma"), 1);
    assert_eq!(report.counts.total_success(), 2);
    assert_eq!(report.samples.len(), 2);

    assert!(report.failures.is_empty());
    assert_eq!(backend.closed(), 4);
}

#[tokio::test]
async fn transient_faults_retry_on_the_same_session() {
    init();

    let backend = MockBackend::builder()
        .transaction("contended", Behavior::Conflict { failures: 2 })
        .finish();
    let config = BenchConfig::new(1).phase(PhaseConfig::serial(vec![1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    // Two conflicts rolled back, then the same selection committed; one
    // session for the whole dance.
    assert_eq!(backend.attempts("contended"), 3);
    assert_eq!(backend.rollbacks(), 2);
    assert_eq!(backend.connections(), 1);
    assert_eq!(report.counts.total_success(), 1);
    assert_eq!(report.counts.total_retry(), 0);
    assert!(report.failures.is_empty());
    assert_eq!(report.samples.len(), 1);
}

#[tokio::test]
async fn supplemental_types_are_never_selected() {
    init();

    let backend = MockBackend::builder()
        .transaction("payment", Behavior::Succeed(Duration::from_micros(500)))
        .supplemental("maintenance")
        .finish();
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_millis(300), vec![1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    assert!(backend.attempts("payment") > 0);
    assert_eq!(backend.attempts("maintenance"), 0);
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn weight_mismatch_is_fatal_before_any_worker_launches() {
    init();

    let backend = two_type_backend(Behavior::Succeed(Duration::ZERO));
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_millis(300), vec![1.0, 1.0, 1.0]));

    let err = Bench::new(backend.clone(), config).run().await.unwrap_err();
    assert!(matches!(
        err,
        ConfigError::WeightCountMismatch { expected: 2, actual: 3, .. }
    ));
    // Nothing launched, nothing connected.
    assert_eq!(backend.connections(), 0);
}

#[tokio::test]
async fn warmup_work_is_never_measured() {
    init();

    let warmup = Duration::from_millis(300);
    let backend = MockBackend::builder()
        .transaction("payment", Behavior::Succeed(Duration::from_millis(1)))
        .finish();
    let config = BenchConfig::new(1)
        .warmup(warmup)
        .phase(PhaseConfig::timed(Duration::from_millis(400), vec![1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    // The workload ran during warm-up, but no sample starts inside it.
    assert!(backend.attempts("payment") as usize > report.samples.len());
    assert!(!report.samples.is_empty());
    let warmup_ns = warmup.as_nanos() as u64;
    assert!(report.samples.iter().all(|s| s.start_ns >= warmup_ns));

    // The measured window covers the phase, not the warm-up.
    assert!(report.elapsed >= Duration::from_millis(300));
    assert!(report.elapsed <= Duration::from_millis(800));
}

#[tokio::test]
async fn phases_advance_through_the_plan() {
    init();

    let backend = two_type_backend(Behavior::Succeed(Duration::from_micros(500)));
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_millis(300), vec![1.0, 0.0]))
        .phase(PhaseConfig::timed(Duration::from_millis(300), vec![0.0, 1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    assert!(backend.attempts("payment") > 0);
    assert!(backend.attempts("lookup") > 0);
    assert!(report.elapsed >= Duration::from_millis(500));
    assert!(report.elapsed <= Duration::from_millis(1500));
}

#[tokio::test]
async fn disabled_phases_never_run() {
    init();

    let backend = two_type_backend(Behavior::Succeed(Duration::from_micros(500)));
    let config = BenchConfig::new(1)
        .phase(PhaseConfig::timed(Duration::from_secs(5), vec![1.0, 1.0]).disabled())
        .phase(PhaseConfig::timed(Duration::from_millis(300), vec![1.0, 1.0]));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    // The five-second disabled phase contributed nothing, including time.
    assert!(report.elapsed <= Duration::from_millis(900));
    assert!(backend.executed() > 0);
}

#[tokio::test]
async fn uniform_rate_limiting_holds_the_configured_rate() {
    init();

    let backend = MockBackend::builder()
        .transaction("payment", Behavior::Succeed(Duration::ZERO))
        .finish();
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_secs(1), vec![1.0]).rate(100));

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    let executed = backend.executed();
    assert!(executed >= 50, "saw only {executed} arrivals");
    assert!(executed <= 160, "saw {executed} arrivals for a rate of 100");
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn poisson_arrivals_track_the_configured_rate() {
    init();

    let backend = MockBackend::builder()
        .transaction("payment", Behavior::Succeed(Duration::ZERO))
        .finish();
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_secs(1), vec![1.0]).rate(300).poisson());

    let report = Bench::new(backend.clone(), config).run().await.unwrap();

    let executed = backend.executed();
    assert!(executed >= 100, "saw only {executed} arrivals");
    assert!(executed <= 600, "saw {executed} arrivals for a rate of 300");
    assert!(report.failures.is_empty());
}

#[tokio::test]
async fn an_operator_abort_forces_a_prompt_exit() {
    init();

    let backend = MockBackend::builder()
        .transaction("payment", Behavior::Succeed(Duration::from_millis(5)))
        .finish();
    let config = BenchConfig::new(2)
        .phase(PhaseConfig::timed(Duration::from_secs(30), vec![1.0]));

    let bench = Bench::new(backend.clone(), config);
    let handle = bench.abort_handle();
    let run = tokio::spawn(bench.run());

    tokio::time::sleep(Duration::from_millis(200)).await;
    handle.abort();

    let report = tokio::time::timeout(Duration::from_secs(10), run)
        .await
        .expect("aborted run should wind down promptly")
        .unwrap()
        .unwrap();

    // In-flight work finished or failed on its own; nobody was stranded.
    assert!(report.abandoned.is_empty());
    assert!(report.failures.is_empty());
    assert_eq!(backend.closed(), 2);
}
