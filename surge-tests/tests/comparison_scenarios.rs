//! Comparison report and preset scenario tests

use std::time::Duration;
use surge_runtime::batch::DEFAULT_LATENCY;
use surge_runtime::{compare, BatchConfig, ResourceIdentity, Scenario, Session};
use surge_tests::{CountingOperation, EventAssertions, SummaryAssertions, FAST_LATENCY};

#[tokio::test(start_paused = true)]
async fn test_comparison_runs_both_modes() {
    let backend = CountingOperation::new(FAST_LATENCY);
    let report = compare(
        backend.clone(),
        10,
        3,
        FAST_LATENCY,
        ResourceIdentity::RoundRobin { ids: 3 },
    )
    .await
    .unwrap();

    SummaryAssertions::new(&report.unbounded)
        .assert_conserved()
        .assert_max_concurrency(10)
        .assert_elapsed(FAST_LATENCY);
    SummaryAssertions::new(&report.bounded)
        .assert_conserved()
        .assert_max_concurrency(3)
        .assert_elapsed(Duration::from_millis(400));

    assert_eq!(report.theoretical_bounded, Duration::from_millis(400));
    assert_eq!(backend.total_calls(), 20);
    assert_eq!(backend.peak_in_progress(), 10);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["permits"], 3);
    assert_eq!(json["bounded"]["max_concurrency"], 3);
}

#[tokio::test(start_paused = true)]
async fn test_same_resource_scenario_without_gate() {
    let backend = CountingOperation::new(FAST_LATENCY);
    let session = Session::default();
    let handle = session
        .start_batch(Scenario::SameResource.config(0).with_operation(backend.clone()))
        .unwrap();

    let outcome = session.await_completion(handle).await.unwrap();
    SummaryAssertions::new(outcome.summary().unwrap())
        .assert_completed(5)
        .assert_max_concurrency(5);
    assert_eq!(backend.calls_for(1), 5);

    EventAssertions::new(&session.observe(handle).unwrap().events)
        .assert_contains("same resource requested by every task")
        .assert_contains("5 requests started at once (no admission gate)")
        .assert_contains("problems:")
        .assert_contains("- resource 1 was fetched 5 times")
        .assert_contains("an admission gate would cap concurrency and keep the backend stable")
        .assert_not_contains("benefits:");
}

#[tokio::test(start_paused = true)]
async fn test_round_robin_scenario_with_gate() {
    let session = Session::default();
    let config = Scenario::RoundRobin.config(3);
    assert_eq!(config.latency, DEFAULT_LATENCY);

    let handle = session.start_batch(config).unwrap();
    let outcome = session.await_completion(handle).await.unwrap();

    // 10 tasks through 3 permits: four waves of the default latency
    SummaryAssertions::new(outcome.summary().unwrap())
        .assert_completed(10)
        .assert_max_concurrency(3)
        .assert_elapsed(DEFAULT_LATENCY * 4);

    let mut resources: Vec<u64> = session
        .outcomes(handle)
        .unwrap()
        .iter()
        .map(|outcome| outcome.resource_id)
        .collect();
    resources.sort_unstable();
    resources.dedup();
    assert_eq!(resources, vec![1, 2, 3]);

    EventAssertions::new(&session.observe(handle).unwrap().events)
        .assert_contains("benefits:")
        .assert_contains("- concurrency capped at 3 (observed 3)")
        .assert_not_contains("problems:");
}

#[tokio::test(start_paused = true)]
async fn test_unbounded_round_robin_reports_repeated_resources() {
    let session = Session::default();
    let handle = session
        .start_batch(
            BatchConfig::new(10, 0)
                .with_latency(FAST_LATENCY)
                .with_identity(ResourceIdentity::RoundRobin { ids: 3 }),
        )
        .unwrap();
    session.await_completion(handle).await.unwrap();

    // Tasks 1..=10 map to 2,3,1,2,3,1,2,3,1,2
    EventAssertions::new(&session.observe(handle).unwrap().events)
        .assert_contains("- resource 1 was fetched 3 times")
        .assert_contains("- resource 2 was fetched 4 times")
        .assert_contains("- resource 3 was fetched 3 times");
}
