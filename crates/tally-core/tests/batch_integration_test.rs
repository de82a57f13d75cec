//! Integration tests for batch dispatch, retry, timeout and aggregation.

mod common;

use common::{
    AlwaysFails, Crashes, Hangs, SALES_CSV, SYSTEM_LOG, USERS_JSON, scenario_batch, write_fixtures,
};
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tally_core::batch::{BatchConfig, BatchSummary, start_configured_batch, start_unbounded_batch};
use tally_core::handlers::{LogHandler, SalesHandler, UsersHandler};
use tally_core::{
    Coordinator, CoordinatorOptions, ErrorKind, HandlerKind, HandlerRegistry, Metrics,
    ResultEnvelope, Status,
};

fn outcome(envelope: &ResultEnvelope) -> (Status, Option<ErrorKind>, Option<Metrics>) {
    (envelope.status, envelope.error_kind, envelope.metrics.clone())
}

fn fast_config(retries: u32) -> BatchConfig {
    BatchConfig { timeout_ms: 2_000, retries, max_workers: 2, retry_delay_ms: 10, ..Default::default() }
}

#[tokio::test]
async fn test_three_file_scenario() {
    let (_dir, paths) = scenario_batch();
    let results = start_configured_batch(paths.clone(), &fast_config(0)).await.unwrap();

    assert_eq!(results.len(), 3);
    let [sales, users, log] = [&results[0], &results[1], &results[2]];

    assert_eq!(sales.path, paths[0]);
    match &sales.metrics {
        Some(Metrics::Sales(metrics)) => assert_eq!(metrics.valid_records, 2),
        other => panic!("expected sales metrics, got {:?}", other),
    }

    assert_eq!(users.status, Status::Error);
    assert_eq!(users.error_kind, Some(ErrorKind::ParseError));
    assert!(users.reason().unwrap().contains("invalid JSON"));

    match &log.metrics {
        Some(Metrics::Log(metrics)) => {
            assert_eq!(metrics.total_lines, 3);
            assert_eq!(metrics.malformed.len(), 1);
            assert_eq!(metrics.malformed[0].line, 2);
        }
        other => panic!("expected log metrics, got {:?}", other),
    }

    let summary = BatchSummary::from_envelopes(&results);
    assert_eq!(summary.success_count, 2);
    assert_eq!(summary.error_count, 1);
    assert_eq!(summary.errors_by_handler["users"], 1);
}

#[tokio::test]
async fn test_configured_batch_one_result_per_input_in_order() {
    let (dir, mut paths) = write_fixtures(&[("b.csv", SALES_CSV), ("a.log", SYSTEM_LOG)]);
    paths.push(dir.path().join("missing.json"));
    paths.push(dir.path().join("notes.txt"));
    paths.push(paths[0].clone());

    let results = start_configured_batch(paths.clone(), &fast_config(1)).await.unwrap();

    assert_eq!(results.len(), paths.len());
    for (envelope, path) in results.iter().zip(&paths) {
        assert_eq!(&envelope.path, path);
    }
    assert_eq!(results[2].error_kind, Some(ErrorKind::RetryExhausted));
    assert_eq!(results[2].cause, Some(ErrorKind::FileNotFound));
    assert_eq!(results[2].attempts, 2);
    assert_eq!(results[3].error_kind, Some(ErrorKind::UnsupportedType));
    assert!(results[4].is_success());
}

#[tokio::test]
async fn test_unbounded_batch_keys_are_input_paths() {
    let (_dir, mut paths) = write_fixtures(&[
        ("sales.csv", SALES_CSV),
        ("users.json", USERS_JSON),
        ("system.log", SYSTEM_LOG),
    ]);
    let results = start_unbounded_batch(paths.clone()).await;
    assert_eq!(results.len(), 3);
    assert!(results.values().all(ResultEnvelope::is_success));

    paths.push(paths[1].clone());
    let results = start_unbounded_batch(paths.clone()).await;
    assert!(results.len() <= paths.len());
    assert!(results.keys().all(|key| paths.contains(key)));
}

#[tokio::test]
async fn test_always_failing_handler_is_retried() {
    let (_dir, paths) = write_fixtures(&[("flaky.csv", SALES_CSV)]);
    let failing = Arc::new(AlwaysFails::default());
    let registry = HandlerRegistry::empty().with_handler(HandlerKind::Sales, failing.clone());

    let options = CoordinatorOptions::configured(&fast_config(3)).unwrap();
    let results = Coordinator::new(registry, options).run(paths).await;

    assert_eq!(results[0].attempts, 4);
    assert_eq!(results[0].error_kind, Some(ErrorKind::RetryExhausted));
    assert_eq!(results[0].cause, Some(ErrorKind::ParseError));
    assert!(results[0].message.as_deref().unwrap().contains("synthetic failure"));
    assert_eq!(failing.calls.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn test_small_timeout_fails_every_file_without_hanging() {
    let paths: Vec<PathBuf> = (0..6).map(|i| PathBuf::from(format!("slow-{}.log", i))).collect();
    let registry = HandlerRegistry::empty()
        .with_handler(HandlerKind::Log, Arc::new(Hangs(Duration::from_secs(30))));
    let config = BatchConfig {
        timeout_ms: 50,
        retries: 1,
        max_workers: 3,
        retry_delay_ms: 10,
        ..Default::default()
    };

    let started = Instant::now();
    let options = CoordinatorOptions::configured(&config).unwrap();
    let results = Coordinator::new(registry, options).run(paths).await;

    assert_eq!(results.len(), 6);
    for envelope in &results {
        assert_eq!(envelope.error_kind, Some(ErrorKind::Timeout), "{:?}", envelope);
    }
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn test_missing_file_without_retries_keeps_its_kind() {
    let (dir, _) = write_fixtures(&[]);
    let results =
        start_configured_batch(vec![dir.path().join("gone.csv")], &fast_config(0)).await.unwrap();
    assert_eq!(results[0].error_kind, Some(ErrorKind::FileNotFound));
    assert_eq!(results[0].attempts, 1);
}

#[tokio::test]
async fn test_slow_parse_is_cut_off_by_attempt_timeout() {
    let mut csv = String::from("date,product,quantity,price\n");
    for i in 0..500_000 {
        writeln!(csv, "2024-01-01,Item{},{},{}.50", i % 1_000, i % 7 + 1, i % 90).unwrap();
    }
    let (_dir, paths) = write_fixtures(&[("huge.csv", &csv)]);
    let config = BatchConfig { timeout_ms: 5, retries: 0, max_workers: 1, ..Default::default() };

    let results = start_configured_batch(paths, &config).await.unwrap();

    assert_eq!(results[0].error_kind, Some(ErrorKind::Timeout), "{:?}", results[0]);
    assert_eq!(results[0].attempts, 1);
}

#[tokio::test]
async fn test_parse_error_does_not_affect_other_files() {
    let (_dir, paths) = scenario_batch();
    let with_broken = start_configured_batch(paths.clone(), &fast_config(0)).await.unwrap();

    let healthy = vec![paths[0].clone(), paths[2].clone()];
    let without_broken = start_configured_batch(healthy, &fast_config(0)).await.unwrap();

    assert_eq!(outcome(&with_broken[0]), outcome(&without_broken[0]));
    assert_eq!(outcome(&with_broken[2]), outcome(&without_broken[1]));
}

#[tokio::test]
async fn test_panicking_handler_is_isolated() {
    let (_dir, paths) = scenario_batch();
    let registry = HandlerRegistry::empty()
        .with_handler(HandlerKind::Sales, Arc::new(SalesHandler))
        .with_handler(HandlerKind::Users, Arc::new(UsersHandler))
        .with_handler(HandlerKind::Log, Arc::new(Crashes));

    let options = CoordinatorOptions::configured(&fast_config(0)).unwrap();
    let results = Coordinator::new(registry, options).run(paths).await;

    assert!(results[0].is_success());
    assert_eq!(results[1].error_kind, Some(ErrorKind::ParseError));
    assert_eq!(results[2].error_kind, Some(ErrorKind::HandlerPanicked));
    assert!(results[2].message.as_deref().unwrap().contains("cannot handle"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let (_dir, paths) = scenario_batch();
    let registry = HandlerRegistry::empty()
        .with_handler(HandlerKind::Sales, Arc::new(SalesHandler))
        .with_handler(HandlerKind::Users, Arc::new(UsersHandler))
        .with_handler(HandlerKind::Log, Arc::new(LogHandler));
    let coordinator = Coordinator::new(registry, CoordinatorOptions::unbounded());

    let first = coordinator.run(paths.clone()).await;
    let second = coordinator.run(paths).await;

    let first: Vec<_> = first.iter().map(outcome).collect();
    let second: Vec<_> = second.iter().map(outcome).collect();
    assert_eq!(first, second);
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_dispatch() {
    let config = BatchConfig { max_workers: 0, ..Default::default() };
    let err = start_configured_batch(vec![PathBuf::from("sales.csv")], &config).await.unwrap_err();
    assert!(err.to_string().contains("max_workers"));
}
