//! Supervisor set
//!
//! Owns one supervisor per configured stream. Supervisors run as independent
//! tasks; a stream stuck in backoff never delays another. Shutdown stops all
//! of them and joins every task, so no graph outlives the set.

use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use super::state::SupervisorState;
use super::stream::{StreamSupervisor, SupervisorHandle, SupervisorReport};
use crate::config::{StreamConfig, SupervisorSettings};
use crate::error::{Error, Result};
use crate::runtime::MediaRuntime;

/// Outcome of [`SupervisorSet::shutdown`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Reports of every supervisor that finished on its own
    pub reports: Vec<SupervisorReport>,
    /// Streams whose supervisor had to be aborted or failed
    pub timed_out: Vec<String>,
    /// Graphs still tearing down when shutdown gave up waiting
    pub live_graphs: usize,
}

impl ShutdownReport {
    /// Whether some stream could not complete its very first attempt
    pub fn any_first_attempt_failed(&self) -> bool {
        self.reports.iter().any(|r| r.first_attempt_ok == Some(false))
    }

    /// Every supervisor stopped in time and no graph is left
    pub fn is_clean(&self) -> bool {
        self.timed_out.is_empty() && self.live_graphs == 0
    }
}

pub struct SupervisorSet {
    runtime: Arc<MediaRuntime>,
    settings: SupervisorSettings,
    handles: Vec<SupervisorHandle>,
}

impl SupervisorSet {
    /// Create one unstarted supervisor per stream
    ///
    /// Fails on duplicate stream names or invalid settings.
    pub fn new(
        runtime: Arc<MediaRuntime>,
        configs: Vec<StreamConfig>,
        settings: SupervisorSettings,
    ) -> Result<Self> {
        settings.validate()?;

        let mut seen = HashSet::new();
        for config in &configs {
            if !seen.insert(config.name.as_str()) {
                return Err(Error::DuplicateStream(config.name.clone()));
            }
        }

        let handles = configs
            .into_iter()
            .map(|config| StreamSupervisor::create(config, Arc::clone(&runtime), &settings))
            .collect();

        Ok(Self {
            runtime,
            settings,
            handles,
        })
    }

    pub fn runtime(&self) -> &Arc<MediaRuntime> {
        &self.runtime
    }

    /// Number of supervised streams
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Stream names in configuration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.handles.iter().map(|h| h.name())
    }

    pub fn handle(&self, name: &str) -> Option<&SupervisorHandle> {
        self.handles.iter().find(|h| h.name() == name)
    }

    fn require(&self, name: &str) -> Result<&SupervisorHandle> {
        self.handle(name)
            .ok_or_else(|| Error::UnknownStream(name.to_string()))
    }

    pub fn state(&self, name: &str) -> Result<SupervisorState> {
        Ok(self.require(name)?.state())
    }

    pub fn watch(&self, name: &str) -> Result<watch::Receiver<SupervisorState>> {
        Ok(self.require(name)?.watch())
    }

    pub fn subscribe(&self, name: &str) -> Result<broadcast::Receiver<SupervisorState>> {
        Ok(self.require(name)?.subscribe())
    }

    /// Start every supervisor that is not running yet; returns how many started
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) -> usize {
        let started = self
            .handles
            .iter_mut()
            .map(|h| h.start())
            .filter(|started| *started)
            .count();
        info!(streams = started, "Supervisors started");
        started
    }

    /// Stop one stream; the others keep running
    pub fn stop_stream(&self, name: &str) -> Result<()> {
        self.require(name)?.stop();
        Ok(())
    }

    /// Stop every supervisor and wait for all of them
    ///
    /// Supervisors still running after the shutdown timeout are aborted and
    /// listed in [`ShutdownReport::timed_out`]. Their graphs may still be
    /// tearing down on the blocking pool; shutdown then waits up to another
    /// shutdown timeout for the runtime to report no live graphs.
    pub async fn shutdown(mut self) -> ShutdownReport {
        info!(streams = self.handles.len(), "Shutting down supervisors");
        for handle in &self.handles {
            handle.stop();
        }

        let timeout = self.settings.shutdown_timeout;
        let deadline = tokio::time::Instant::now() + timeout;
        let results = join_all(
            self.handles
                .iter_mut()
                .map(|h| async move { tokio::time::timeout_at(deadline, h.join()).await }),
        )
        .await;

        let mut report = ShutdownReport::default();
        for (handle, result) in self.handles.iter_mut().zip(results) {
            match result {
                Ok(Some(r)) => report.reports.push(r),
                Ok(None) => report.timed_out.push(handle.name().to_string()),
                Err(_) => {
                    warn!(
                        stream = %handle.name(),
                        timeout_ms = timeout.as_millis() as u64,
                        "Supervisor did not stop in time, aborting"
                    );
                    handle.abort();
                    // Resolves once the cancelled future, and any graph it held, is dropped
                    handle.join().await;
                    report.timed_out.push(handle.name().to_string());
                }
            }
        }

        if tokio::time::timeout(timeout, self.runtime.graphs_released())
            .await
            .is_err()
        {
            report.live_graphs = self.runtime.live_graphs();
            warn!(
                live_graphs = report.live_graphs,
                "Graphs still tearing down after shutdown timeout"
            );
        }

        info!(
            stopped = report.reports.len(),
            aborted = report.timed_out.len(),
            live_graphs = report.live_graphs,
            "Supervisors shut down"
        );
        report
    }
}

impl Drop for SupervisorSet {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.stop();
        }
    }
}

impl std::fmt::Debug for SupervisorSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorSet")
            .field("runtime", &self.runtime)
            .field("handles", &self.handles)
            .finish()
    }
}
