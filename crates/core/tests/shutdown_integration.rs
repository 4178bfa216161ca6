//! Integration tests for stream isolation and supervisor set shutdown

mod common;

use std::time::{Duration, Instant};

use common::*;
use streamwall_core::graph::{BusEvent, StageRole};
use streamwall_core::scripted::{Attempt, ScriptedBackend, Session};
use streamwall_core::{BackoffPolicy, Error, SupervisorState};

#[tokio::test]
async fn test_fault_in_one_stream_leaves_sibling_untouched() {
    let backend = ScriptedBackend::new();
    let mut set = set_with(&backend, streams(&["a", "b"]), fast_settings());
    let mut a = set.subscribe("a").unwrap();
    let mut b_state = set.watch("b").unwrap();
    set.start();

    let mut seen = Vec::new();
    next_transition(&mut a, &mut seen, is_running).await;
    wait_state(&mut b_state, is_running).await;

    let mut b = set.subscribe("b").unwrap();
    assert!(backend.inject("a", BusEvent::error("a_source", "Connection reset by peer")));
    next_transition(&mut a, &mut seen, is_backoff).await;
    next_transition(&mut a, &mut seen, is_running).await;

    assert!(b.try_recv().is_err(), "stream b must not transition");
    assert_eq!(set.state("b").unwrap(), SupervisorState::Running);
    assert_eq!(backend.stats("b").builds, 1);
    assert_eq!(backend.stats("a").builds, 2);

    set.shutdown().await;
}

#[tokio::test]
async fn test_stream_in_long_backoff_does_not_delay_others() {
    let backend = ScriptedBackend::new();
    backend.script("dead", [Attempt::BuildFails(StageRole::Source)]);

    let settings = fast_settings().with_backoff(BackoffPolicy::new(60_000, 60_000));
    let mut set = set_with(&backend, streams(&["dead", "live"]), settings);
    let mut dead = set.watch("dead").unwrap();
    let mut live = set.watch("live").unwrap();
    set.start();

    wait_state(&mut dead, is_backoff).await;
    let started = Instant::now();
    wait_state(&mut live, is_running).await;
    assert!(started.elapsed() < Duration::from_secs(1));

    set.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_leaves_no_live_graphs() {
    let backend = ScriptedBackend::new();
    backend.script("flaky", [Attempt::BuildFails(StageRole::Decoder)]);
    backend.script(
        "bouncing",
        [Attempt::Session(
            Session::healthy().delay(Duration::from_millis(5)).eos(),
        )],
    );

    let names = ["north", "south", "east", "west", "flaky", "bouncing"];
    let mut set = set_with(&backend, streams(&names), fast_settings());
    let mut watchers: Vec<_> = ["north", "south", "east", "west"]
        .iter()
        .map(|n| set.watch(n).unwrap())
        .collect();
    set.start();

    for rx in &mut watchers {
        wait_state(rx, is_running).await;
    }
    assert!(backend.total_live_graphs() >= 4);

    let report = set.shutdown().await;

    assert_eq!(report.reports.len(), names.len());
    assert!(report.is_clean());
    assert_eq!(backend.total_live_graphs(), 0);
    for rx in &watchers {
        assert_eq!(*rx.borrow(), SupervisorState::Stopped);
    }
    // Last supervisor gone: the runtime shut the backend down exactly once
    assert_eq!(backend.init_calls(), 1);
    assert_eq!(backend.shutdown_calls(), 1);
}

#[tokio::test]
async fn test_stop_during_backoff_is_prompt() {
    let backend = ScriptedBackend::new();
    backend.script("cam", [Attempt::BuildFails(StageRole::Source)]);

    let settings = fast_settings().with_backoff(BackoffPolicy::new(30_000, 30_000));
    let mut set = set_with(&backend, streams(&["cam"]), settings);
    let mut state = set.watch("cam").unwrap();
    set.start();

    let entered = wait_state(&mut state, is_backoff).await;
    assert_eq!(entered, SupervisorState::Backoff { delay_ms: 30_000 });

    let started = Instant::now();
    let report = set.shutdown().await;
    assert!(started.elapsed() < Duration::from_secs(1));
    assert!(report.is_clean());
    assert_eq!(report.reports[0].attempts, 1);
}

#[tokio::test]
async fn test_stop_single_stream() {
    let backend = ScriptedBackend::new();
    let mut set = set_with(&backend, streams(&["a", "b"]), fast_settings());
    let mut a = set.watch("a").unwrap();
    let mut b = set.watch("b").unwrap();
    set.start();

    wait_state(&mut a, is_running).await;
    wait_state(&mut b, is_running).await;

    set.stop_stream("a").unwrap();
    wait_state(&mut a, |s| s.is_terminal()).await;
    assert_eq!(backend.stats("a").live_graphs, 0);
    assert!(!set.handle("a").unwrap().is_running());

    // Stopped means stopped: no reconnect
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.stats("a").builds, 1);
    assert!(set.handle("b").unwrap().is_running());
    assert_eq!(backend.stats("b").live_graphs, 1);

    assert!(matches!(set.stop_stream("nope"), Err(Error::UnknownStream(_))));

    let report = set.shutdown().await;
    assert_eq!(report.reports.len(), 2);
    assert!(!report.any_first_attempt_failed());
}

#[tokio::test]
async fn test_first_attempt_failures_are_reported_per_stream() {
    let backend = ScriptedBackend::new();
    backend.script(
        "late",
        [
            Attempt::BuildFails(StageRole::Sink),
            Attempt::Session(Session::healthy()),
        ],
    );

    let mut set = set_with(&backend, streams(&["late", "ok"]), fast_settings());
    let mut late = set.watch("late").unwrap();
    let mut ok = set.watch("ok").unwrap();
    set.start();

    wait_state(&mut late, is_running).await;
    wait_state(&mut ok, is_running).await;

    let report = set.shutdown().await;
    let first = |name: &str| {
        report
            .reports
            .iter()
            .find(|r| r.name == name)
            .and_then(|r| r.first_attempt_ok)
    };
    assert_eq!(first("late"), Some(false));
    assert_eq!(first("ok"), Some(true));
    assert!(report.any_first_attempt_failed());
}

#[tokio::test]
async fn test_shutdown_before_start() {
    let backend = ScriptedBackend::new();
    let set = set_with(&backend, streams(&["a", "b"]), fast_settings());

    let report = set.shutdown().await;
    assert_eq!(report.reports.len(), 2);
    assert!(report.reports.iter().all(|r| r.attempts == 0 && r.first_attempt_ok.is_none()));
    assert!(!report.any_first_attempt_failed());
    assert_eq!(backend.stats("a").builds, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_blocking_teardown_does_not_stall_sibling() {
    let backend = ScriptedBackend::new();
    backend.script(
        "a",
        [Attempt::Session(
            Session::healthy().slow_teardown(Duration::from_millis(800)),
        )],
    );

    let mut set = set_with(&backend, streams(&["a", "b"]), fast_settings());
    let mut a = set.subscribe("a").unwrap();
    let mut b = set.watch("b").unwrap();
    set.start();

    let mut seen = Vec::new();
    next_transition(&mut a, &mut seen, is_running).await;
    wait_state(&mut b, is_running).await;

    assert!(backend.inject("a", BusEvent::error("a_source", "Connection reset by peer")));
    next_transition(&mut a, &mut seen, |s| {
        matches!(s, SupervisorState::Faulted { .. })
    })
    .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(backend.stats("a").teardowns, 0, "a should still be tearing down");

    // The only worker thread must stay free for b
    let started = Instant::now();
    set.stop_stream("b").unwrap();
    wait_state(&mut b, |s| s.is_terminal()).await;
    assert!(
        started.elapsed() < Duration::from_millis(400),
        "b took {:?} to stop",
        started.elapsed()
    );
    assert_eq!(backend.stats("b").live_graphs, 0);

    set.shutdown().await;
}

#[tokio::test]
async fn test_shutdown_waits_for_graphs_of_aborted_supervisors() {
    let backend = ScriptedBackend::new();
    backend.script(
        "slow",
        [Attempt::Session(
            Session::healthy().slow_teardown(Duration::from_millis(300)),
        )],
    );

    let settings = fast_settings().with_shutdown_timeout(Duration::from_millis(200));
    let mut set = set_with(&backend, streams(&["slow", "quick"]), settings);
    let mut slow = set.watch("slow").unwrap();
    let mut quick = set.watch("quick").unwrap();
    set.start();

    wait_state(&mut slow, is_running).await;
    wait_state(&mut quick, is_running).await;

    let report = set.shutdown().await;

    assert_eq!(report.timed_out, vec!["slow".to_string()]);
    assert_eq!(report.reports.len(), 1);
    assert_eq!(report.live_graphs, 0);
    assert!(!report.is_clean());
    // The aborted supervisor's graph finished tearing down before shutdown returned
    assert_eq!(backend.stats("slow").teardowns, 1);
    assert_eq!(backend.total_live_graphs(), 0);
}

#[tokio::test]
async fn test_start_is_idempotent() {
    let backend = ScriptedBackend::new();
    let mut set = set_with(&backend, streams(&["a", "b"]), fast_settings());
    let mut a = set.watch("a").unwrap();
    let mut b = set.watch("b").unwrap();

    assert_eq!(set.start(), 2);
    assert_eq!(set.start(), 0);

    wait_state(&mut a, is_running).await;
    wait_state(&mut b, is_running).await;
    assert_eq!(backend.stats("a").builds, 1);
    assert_eq!(backend.stats("b").builds, 1);

    assert!(set.shutdown().await.is_clean());
}
