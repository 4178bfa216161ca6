//! Shared helpers for supervisor integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use streamwall_core::scripted::ScriptedBackend;
use streamwall_core::{
    BackoffPolicy, MediaRuntime, StreamConfig, SupervisorSet, SupervisorSettings, SupervisorState,
};
use tokio::sync::{broadcast, watch};

/// Guard for every wait in these tests
pub const WAIT: Duration = Duration::from_secs(5);

/// Fast settings: 10ms polls, 10ms → 80ms backoff
pub fn fast_settings() -> SupervisorSettings {
    SupervisorSettings::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_backoff(BackoffPolicy::new(10, 80))
        .with_shutdown_timeout(Duration::from_secs(2))
}

pub fn streams(names: &[&str]) -> Vec<StreamConfig> {
    names
        .iter()
        .map(|name| StreamConfig::new(*name, format!("rtsp://user:secret@{}.cam.local/live", name)))
        .collect()
}

pub fn set_with(
    backend: &ScriptedBackend,
    configs: Vec<StreamConfig>,
    settings: SupervisorSettings,
) -> SupervisorSet {
    let runtime = MediaRuntime::acquire(Arc::new(backend.clone())).expect("scripted init");
    SupervisorSet::new(runtime, configs, settings).expect("valid set")
}

/// Wait until the current state satisfies `pred`
pub async fn wait_state(
    rx: &mut watch::Receiver<SupervisorState>,
    pred: impl FnMut(&SupervisorState) -> bool,
) -> SupervisorState {
    tokio::time::timeout(WAIT, rx.wait_for(pred))
        .await
        .expect("timed out waiting for state")
        .expect("supervisor dropped")
        .clone()
}

/// Next transition satisfying `pred`; earlier ones are returned in `seen`
pub async fn next_transition(
    rx: &mut broadcast::Receiver<SupervisorState>,
    seen: &mut Vec<SupervisorState>,
    mut pred: impl FnMut(&SupervisorState) -> bool,
) -> SupervisorState {
    tokio::time::timeout(WAIT, async {
        loop {
            let state = rx.recv().await.expect("transition channel closed or lagged");
            seen.push(state.clone());
            if pred(&state) {
                return state;
            }
        }
    })
    .await
    .expect("timed out waiting for transition")
}

/// Backoff delays in the order they were entered
pub fn backoff_delays(seen: &[SupervisorState]) -> Vec<u64> {
    seen.iter()
        .filter_map(|s| match s {
            SupervisorState::Backoff { delay_ms } => Some(*delay_ms),
            _ => None,
        })
        .collect()
}

pub fn is_running(state: &SupervisorState) -> bool {
    *state == SupervisorState::Running
}

pub fn is_backoff(state: &SupervisorState) -> bool {
    matches!(state, SupervisorState::Backoff { .. })
}
