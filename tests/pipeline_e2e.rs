//! End-to-end coverage of the write path: orchestrated pipelines feeding
//! the metric store, failure isolation, bootstrap ordering, and reactive
//! recomputation.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use terrastat::{
    AnalyticsCore, ComputationError, ConfigurationError, CoreConfig, Direction, ErrorPolicy,
    MemoryReporter, MetricKey, MetricResult, Orchestrator, Pipeline, PipelineOutcome,
    PipelineStep, SchedulerConfig, StepStatus, TerraError,
};

fn fast_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        debounce: Duration::from_millis(50),
        tick: Duration::from_millis(5),
        ..SchedulerConfig::default()
    }
}

fn thermal_config() -> CoreConfig {
    let mut config = CoreConfig::default().with_direction("avg_utci", Direction::LowerIsBetter);
    config.scheduler = fast_scheduler();
    config
}

#[test]
fn failed_step_with_skip_policy_leaves_sibling_effects_in_the_store() {
    let reporter = Arc::new(MemoryReporter::new());
    let orchestrator = Orchestrator::with_reporter(
        &fast_scheduler(),
        Arc::clone(&reporter) as Arc<dyn terrastat::ErrorReporter>,
    );

    let core = AnalyticsCore::new(&thermal_config()).unwrap();
    let metrics = core.metrics();

    let store_for_b = Arc::clone(&metrics);
    orchestrator
        .register_pipeline(Pipeline::new(
            "metrics",
            vec![
                PipelineStep::new("a", ErrorPolicy::Skip, || {
                    Err(ComputationError::recoverable(
                        "thermal",
                        "recompute",
                        "sensor feed offline",
                    ))
                }),
                PipelineStep::new("b", ErrorPolicy::Abort, move || {
                    store_for_b
                        .set_results_batch(vec![
                            (
                                MetricKey::unfiltered("thermal", "avg_utci", "base").unwrap(),
                                MetricResult::new(23.5).unwrap(),
                            ),
                            (
                                MetricKey::unfiltered("thermal", "avg_utci", "variant").unwrap(),
                                MetricResult::new(25.0).unwrap(),
                            ),
                        ])
                        .map(|_| ())
                        .map_err(|e| {
                            ComputationError::fatal("thermal", "store", e.to_string())
                        })
                }),
            ],
        ))
        .unwrap();

    let report = orchestrator.run_pipeline("metrics").unwrap();
    assert_eq!(report.outcome, PipelineOutcome::Succeeded);
    assert_eq!(report.steps[0].status, StepStatus::FailedSkipped);
    assert_eq!(report.steps[1].status, StepStatus::Succeeded);

    // Exactly one structured report for step A.
    let reports = reporter.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].module, "thermal");
    assert_eq!(reports[0].operation, "recompute");

    // Step B's batch landed despite A's failure.
    assert_eq!(metrics.len().unwrap(), 2);
    let stats = metrics.statistics("thermal", "avg_utci").unwrap().unwrap();
    assert_eq!(stats.best.scenario, "base");
}

#[test]
fn aborted_pipeline_leaves_last_known_consistent_state() {
    let orchestrator = Orchestrator::new(&fast_scheduler());
    let core = AnalyticsCore::new(&thermal_config()).unwrap();
    let metrics = core.metrics();

    // Seed a consistent baseline.
    metrics
        .set_result(
            MetricKey::unfiltered("thermal", "avg_utci", "base").unwrap(),
            MetricResult::new(23.5).unwrap(),
        )
        .unwrap();

    let untouched = Arc::clone(&metrics);
    orchestrator
        .register_pipeline(Pipeline::new(
            "reload",
            vec![
                PipelineStep::new("compute", ErrorPolicy::Abort, || {
                    // The failing computation produces no batch at all:
                    // writes are all-or-nothing at step granularity.
                    Err(ComputationError::fatal("thermal", "recompute", "bad geometry"))
                }),
                PipelineStep::new("write", ErrorPolicy::Abort, move || {
                    untouched
                        .set_result(
                            MetricKey::unfiltered("thermal", "avg_utci", "variant").unwrap(),
                            MetricResult::new(99.0).unwrap(),
                        )
                        .map_err(|e| ComputationError::fatal("thermal", "store", e.to_string()))
                }),
            ],
        ))
        .unwrap();

    let report = orchestrator.run_pipeline("reload").unwrap();
    assert_eq!(report.outcome, PipelineOutcome::Failed);
    assert_eq!(report.steps[1].status, StepStatus::NotRun);

    // The store still holds exactly the pre-run state.
    assert_eq!(metrics.len().unwrap(), 1);
    let stats = metrics.statistics("thermal", "avg_utci").unwrap().unwrap();
    assert_eq!(stats.rankings.len(), 1);
}

#[test]
fn reactive_trigger_recomputes_after_entity_changes() {
    let core = Arc::new(AnalyticsCore::new(&thermal_config()).unwrap());
    let metrics = core.metrics();

    let writes = Arc::new(AtomicU32::new(0));
    let store = Arc::clone(&metrics);
    let counter = Arc::clone(&writes);
    core.orchestrator()
        .register_pipeline(Pipeline::new(
            "recompute",
            vec![PipelineStep::new("write", ErrorPolicy::Abort, move || {
                let run = counter.fetch_add(1, Ordering::SeqCst);
                store
                    .set_result(
                        MetricKey::unfiltered("thermal", "avg_utci", "base").unwrap(),
                        MetricResult::new(20.0 + f64::from(run)).unwrap(),
                    )
                    .map_err(|e| ComputationError::fatal("thermal", "store", e.to_string()))
            })],
        ))
        .unwrap();
    core.orchestrator()
        .watch(terrastat::ENTITIES_STATE_KEY, "recompute")
        .unwrap();

    // A burst of entity edits coalesces into one recomputation.
    for _ in 0..10 {
        core.notify_entities_changed();
    }
    thread::sleep(Duration::from_millis(250));
    assert_eq!(writes.load(Ordering::SeqCst), 1);

    let stored = metrics
        .get_result(&MetricKey::unfiltered("thermal", "avg_utci", "base").unwrap())
        .unwrap()
        .unwrap();
    assert_eq!(stored.value, 20.0);
}

#[test]
fn bootstrap_orders_components_and_rejects_cycles() {
    let orchestrator = Orchestrator::new(&fast_scheduler());

    orchestrator
        .register_component("grid", vec![], || Ok(()))
        .unwrap();
    orchestrator
        .register_component("metric-store", vec![], || Ok(()))
        .unwrap();
    orchestrator
        .register_component(
            "calculators",
            vec!["grid".to_string(), "metric-store".to_string()],
            || Ok(()),
        )
        .unwrap();

    let rounds = orchestrator.bootstrap().unwrap();
    assert_eq!(
        rounds,
        vec![
            vec!["grid".to_string(), "metric-store".to_string()],
            vec!["calculators".to_string()],
        ]
    );

    // Introduce a cycle: fatal, never tie-broken arbitrarily.
    orchestrator
        .register_component("grid", vec!["calculators".to_string()], || Ok(()))
        .unwrap();
    let err = orchestrator.bootstrap().unwrap_err();
    assert!(matches!(
        err,
        TerraError::Configuration(ConfigurationError::DependencyCycle { .. })
    ));
}

#[test]
fn statistics_observe_all_writes_of_a_batch() {
    let core = AnalyticsCore::new(&thermal_config()).unwrap();
    let metrics = core.metrics();

    metrics
        .set_results_batch((0..50).map(|i| {
            (
                MetricKey::unfiltered("thermal", "avg_utci", format!("s{i:02}")).unwrap(),
                MetricResult::new(20.0 + f64::from(i)).unwrap(),
            )
        }))
        .unwrap();

    let stats = metrics.statistics("thermal", "avg_utci").unwrap().unwrap();
    assert_eq!(stats.rankings.len(), 50);
    assert_eq!(stats.best.scenario, "s00");
    assert_eq!(stats.worst.scenario, "s49");
    let ranks: Vec<usize> = stats.rankings.iter().map(|r| r.rank).collect();
    assert_eq!(ranks, (1..=50).collect::<Vec<_>>());
}
