//! Streamwall viewer service
//!
//! Loads a [`ViewerConfig`], starts one supervisor per stream on a shared
//! media runtime and runs until the shutdown future resolves.

pub mod config;

pub use config::{ConfigError, ViewerConfig};

use std::future::Future;
use std::sync::Arc;

use streamwall_core::supervisor::ShutdownReport;
use streamwall_core::{MediaBackend, MediaRuntime, SupervisorSet};
use tracing::{info, warn};

/// Run the wall until `shutdown` resolves, then stop every stream
pub async fn run<F>(
    config: &ViewerConfig,
    backend: Arc<dyn MediaBackend>,
    shutdown: F,
) -> anyhow::Result<ShutdownReport>
where
    F: Future<Output = ()>,
{
    let backend_name = backend.name().to_string();
    let runtime = MediaRuntime::acquire(backend)?;
    let mut set = SupervisorSet::new(runtime, config.stream_configs(), config.settings())?;

    info!(
        backend = %backend_name,
        streams = set.len(),
        "Starting stream supervisors"
    );
    set.start();

    shutdown.await;
    info!("Shutdown signal received, stopping streams");

    let report = set.shutdown().await;
    for stream in &report.reports {
        info!(
            stream = %stream.name,
            attempts = stream.attempts,
            first_attempt_ok = ?stream.first_attempt_ok,
            "Stream stopped"
        );
    }
    if !report.timed_out.is_empty() {
        warn!(streams = ?report.timed_out, "Supervisors did not stop in time and were aborted");
    }

    Ok(report)
}

/// Process exit status for a finished run: 1 when any stream's first attempt failed
pub fn exit_status(report: &ShutdownReport) -> u8 {
    if report.any_first_attempt_failed() {
        1
    } else {
        0
    }
}
