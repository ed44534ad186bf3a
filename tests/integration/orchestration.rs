//! Orchestration integration tests.
//!
//! These tests verify stage ordering, joined concurrency and failure
//! handling with recording steps in place of real build work.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};

use kiln::config::Config;
use kiln::core::{BuildMode, Stage, TaskOutcome, TaskRegistry};
use kiln::orchestration::{FailurePolicy, RunEvent, Runner};
use kiln::Error;

use crate::fixtures::{entries, fake_toolchain, journal, position, Journal, RecordingStep};

fn runner(registry: TaskRegistry) -> Runner {
    let dir = std::env::temp_dir();
    Runner::new(
        registry,
        Config::with_root(&dir),
        BuildMode::Development,
        fake_toolchain(),
    )
    .expect("runner")
}

fn record(registry: &mut TaskRegistry, name: &str, journal: &Journal) {
    registry
        .register(name, Arc::new(RecordingStep::new(name, journal)))
        .unwrap();
}

/// Test: Strict sequencing
/// Given a sequence of three steps where the first is slow
/// When the sequence runs
/// Then each step starts only after the previous one ended
#[tokio::test]
async fn test_sequence_runs_stages_in_order() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "compile",
            Arc::new(RecordingStep::new("compile", &log).delayed(Duration::from_millis(50))),
        )
        .unwrap();
    record(&mut registry, "bless", &log);
    record(&mut registry, "inject", &log);
    registry
        .register_sequence(
            "styles",
            "",
            vec!["compile".into(), "bless".into(), "inject".into()],
        )
        .unwrap();

    let report = assert_ok!(runner(registry).run("styles").await);
    assert!(report.outcome.is_success());
    assert_eq!(
        entries(&log),
        vec![
            "start:compile",
            "end:compile",
            "start:bless",
            "end:bless",
            "start:inject",
            "end:inject",
        ]
    );
}

/// Test: Joined concurrency
/// Given a stage of two tasks followed by a third
/// When the composite runs
/// Then both tasks of the stage overlap and the third waits for both
#[tokio::test]
async fn test_parallel_stage_joins_before_next() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "slow",
            Arc::new(RecordingStep::new("slow", &log).delayed(Duration::from_millis(80))),
        )
        .unwrap();
    registry
        .register(
            "fast",
            Arc::new(RecordingStep::new("fast", &log).delayed(Duration::from_millis(10))),
        )
        .unwrap();
    record(&mut registry, "done", &log);
    registry
        .register_sequence(
            "all",
            "",
            vec![Stage::parallel(&["slow", "fast"]), "done".into()],
        )
        .unwrap();

    assert_ok!(runner(registry).run("all").await);

    let log = entries(&log);
    assert!(position(&log, "start:fast") < position(&log, "end:slow"));
    assert!(position(&log, "start:slow") < position(&log, "end:fast"));
    assert!(position(&log, "end:slow") < position(&log, "start:done"));
    assert!(position(&log, "end:fast") < position(&log, "start:done"));
}

/// Test: Nested composites
/// Given `build` running two composites concurrently
/// When it runs
/// Then each composite keeps its internal order
#[tokio::test]
async fn test_nested_composites_keep_their_order() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    for name in ["compile", "bless", "lint", "bundle"] {
        registry
            .register(
                name,
                Arc::new(RecordingStep::new(name, &log).delayed(Duration::from_millis(15))),
            )
            .unwrap();
    }
    registry
        .register_sequence("build-sass", "", vec!["compile".into(), "bless".into()])
        .unwrap();
    registry
        .register_sequence("build-js", "", vec!["lint".into(), "bundle".into()])
        .unwrap();
    registry
        .register_sequence(
            "build",
            "",
            vec![Stage::parallel(&["build-sass", "build-js"])],
        )
        .unwrap();

    assert_ok!(runner(registry).run("build").await);

    let log = entries(&log);
    assert!(position(&log, "end:compile") < position(&log, "start:bless"));
    assert!(position(&log, "end:lint") < position(&log, "start:bundle"));
    // The two pipelines overlap.
    assert!(position(&log, "start:lint") < position(&log, "end:bless"));
}

/// Test: Unknown task
/// Given a registry without `deploy`
/// When `deploy` is requested
/// Then the run fails before any step executes
#[tokio::test]
async fn test_unknown_task_fails_before_any_step() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    record(&mut registry, "compile", &log);

    let err = assert_err!(runner(registry).run("deploy").await);
    assert!(matches!(err, Error::UnknownTask(ref name) if name == "deploy"));
    assert_eq!(err.to_string(), "Task 'deploy' is not in your task registry");
    assert!(entries(&log).is_empty());
}

/// Test: Dangling reference
/// Given a composite naming a task that was never registered
/// When a runner is created
/// Then validation rejects the registry
#[tokio::test]
async fn test_dangling_reference_rejected_up_front() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    record(&mut registry, "compile", &log);
    registry
        .register_sequence("styles", "", vec!["compile".into(), "ghost".into()])
        .unwrap();

    let result = Runner::new(
        registry,
        Config::with_root(&std::env::temp_dir()),
        BuildMode::Development,
        fake_toolchain(),
    );
    assert!(matches!(result, Err(Error::Validation(_))));
}

/// Test: Abort policy
/// Given a sequence whose middle step fails
/// When it runs with the default policy
/// Then the run errors naming the failed step and later stages never start
#[tokio::test]
async fn test_failure_aborts_remaining_stages() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    record(&mut registry, "lint", &log);
    registry
        .register("bundle", Arc::new(RecordingStep::new("bundle", &log).failing()))
        .unwrap();
    record(&mut registry, "inject", &log);
    registry
        .register_sequence(
            "scripts",
            "",
            vec!["lint".into(), "bundle".into(), "inject".into()],
        )
        .unwrap();

    let err = assert_err!(runner(registry).run("scripts").await);
    match err {
        Error::TaskFailed { task, detail } => {
            assert_eq!(task, "bundle");
            assert!(detail.contains("simulated failure"));
        }
        other => panic!("unexpected error: {}", other),
    }
    assert!(!entries(&log).contains(&"start:inject".to_string()));
}

/// Test: Log-and-continue policy
/// Given the same failing sequence
/// When it runs as a watch session would
/// Then the run returns a failed report instead of an error
#[tokio::test]
async fn test_log_and_continue_returns_failed_report() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    registry
        .register("bundle", Arc::new(RecordingStep::new("bundle", &log).failing()))
        .unwrap();
    record(&mut registry, "inject", &log);
    registry
        .register_sequence("scripts", "", vec!["bundle".into(), "inject".into()])
        .unwrap();

    let runner = runner(registry).with_policy(FailurePolicy::LogAndContinue);
    let report = assert_ok!(runner.run("scripts").await);
    assert!(matches!(
        report.outcome,
        TaskOutcome::Failed { ref task, .. } if task == "bundle"
    ));

    // The runner stays usable.
    let again = assert_ok!(runner.run("scripts").await);
    assert!(!again.outcome.is_success());
}

/// Test: First failure in declaration order
/// Given a concurrent stage where both tasks fail
/// When it runs
/// Then the reported failure is the first declared task
#[tokio::test]
async fn test_concurrent_failures_report_first_declared() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    registry
        .register(
            "sass",
            Arc::new(
                RecordingStep::new("sass", &log)
                    .delayed(Duration::from_millis(40))
                    .failing(),
            ),
        )
        .unwrap();
    registry
        .register("js", Arc::new(RecordingStep::new("js", &log).failing()))
        .unwrap();
    registry
        .register_sequence("build", "", vec![Stage::parallel(&["sass", "js"])])
        .unwrap();

    let report = assert_ok!(
        runner(registry)
            .with_policy(FailurePolicy::LogAndContinue)
            .run("build")
            .await
    );
    assert!(matches!(
        report.outcome,
        TaskOutcome::Failed { ref task, .. } if task == "sass"
    ));
}

/// Test: Lifecycle events
/// Given a runner with an event channel
/// When a composite runs
/// Then start and finish events arrive for the composite and its steps
#[tokio::test]
async fn test_run_events() {
    let log = journal();
    let mut registry = TaskRegistry::new();
    record(&mut registry, "a", &log);
    record(&mut registry, "b", &log);
    registry
        .register_sequence("ab", "", vec!["a".into(), "b".into()])
        .unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let runner = runner(registry).with_events(tx);
    assert_ok!(runner.run("ab").await);
    drop(runner);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    assert_eq!(
        events.first(),
        Some(&RunEvent::TaskStarted {
            task: "ab".to_string()
        })
    );
    assert!(matches!(
        events.last(),
        Some(RunEvent::TaskFinished { task, outcome: TaskOutcome::Succeeded, .. }) if task == "ab"
    ));
    assert_eq!(events.len(), 6);
}
