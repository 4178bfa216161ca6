//! Stream supervisor
//!
//! Owns one stream's connect → link → run → fault → backoff cycle. Exactly one
//! graph exists per stream at a time: the previous graph is torn down before
//! the backoff sleep starts, so a rebuild always starts from nothing.
//!
//! Building, starting and tearing down a graph can block inside the media
//! framework, so those calls run on the blocking pool. The supervisor still
//! awaits each of them before moving on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, watch};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::backoff::{Backoff, ResetPolicy};
use super::state::{FaultReason, SupervisorState};
use super::stop::{stop_pair, StopHandle, StopSignal};
use crate::config::{StreamConfig, SupervisorSettings};
use crate::error::BuildError;
use crate::graph::{event_channel, EventSender, Graph, GraphBuilder, GraphPlan};
use crate::linker::{DynamicLinker, JunctionTable, LinkOutcome};
use crate::monitor::{EventMonitor, MonitorSignal};
use crate::runtime::{GraphLease, MediaRuntime};

const TRANSITION_CAPACITY: usize = 256;

/// Summary returned when a supervisor finishes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorReport {
    pub name: String,
    /// Connection attempts made
    pub attempts: u64,
    /// Whether the very first attempt built the graph and started playback.
    /// `None` when the supervisor was stopped before trying.
    pub first_attempt_ok: Option<bool>,
}

/// A graph counted as live on the runtime. Dropping it tears it down.
struct LiveGraph {
    graph: Box<dyn Graph>,
    _lease: GraphLease,
}

impl Drop for LiveGraph {
    fn drop(&mut self) {
        self.graph.teardown();
    }
}

enum CycleEnd {
    /// Graph is gone; sleep and try again
    Retry(FaultReason),
    Stopped,
}

/// Supervises one stream until stopped
pub struct StreamSupervisor {
    config: Arc<StreamConfig>,
    runtime: Arc<MediaRuntime>,
    builder: GraphBuilder,
    poll_interval: Duration,
    backoff: Backoff,
    stop: StopSignal,
    state: watch::Sender<SupervisorState>,
    transitions: broadcast::Sender<SupervisorState>,
    attempts: u64,
    first_attempt_ok: Option<bool>,
}

impl StreamSupervisor {
    /// Create an unstarted supervisor and the handle that controls it
    pub fn create(
        config: StreamConfig,
        runtime: Arc<MediaRuntime>,
        settings: &SupervisorSettings,
    ) -> SupervisorHandle {
        let (stop_handle, stop) = stop_pair();
        let (state, state_rx) = watch::channel(SupervisorState::Idle);
        let (transitions, _) = broadcast::channel(TRANSITION_CAPACITY);
        let name = config.name.clone();

        let supervisor = Self {
            config: Arc::new(config),
            runtime,
            builder: GraphBuilder::new(settings.graph, settings.transport),
            poll_interval: settings.poll_interval,
            backoff: Backoff::new(settings.backoff),
            stop,
            state,
            transitions: transitions.clone(),
            attempts: 0,
            first_attempt_ok: None,
        };

        SupervisorHandle {
            name,
            state: state_rx,
            transitions,
            stop: stop_handle,
            pending: Some(supervisor),
            task: None,
        }
    }

    fn spawn(self) -> JoinHandle<SupervisorReport> {
        let span = info_span!("stream", stream = %self.config.name);
        tokio::spawn(self.run().instrument(span))
    }

    /// Run until stopped
    pub async fn run(mut self) -> SupervisorReport {
        info!(
            url = %self.config.redacted_url(),
            surface = %self.config.surface,
            backend = self.runtime.backend().name(),
            "Supervisor started"
        );

        while !self.stop.is_stopped() {
            match self.attempt().await {
                CycleEnd::Stopped => break,
                CycleEnd::Retry(reason) => {
                    if !self.sleep_backoff(&reason).await {
                        break;
                    }
                }
            }
        }

        self.transition(SupervisorState::Stopped);
        info!(attempts = self.attempts, "Supervisor stopped");

        SupervisorReport {
            name: self.config.name.clone(),
            attempts: self.attempts,
            first_attempt_ok: self.first_attempt_ok,
        }
    }

    /// One connection attempt, from build to teardown
    async fn attempt(&mut self) -> CycleEnd {
        self.attempts += 1;
        let attempt = self.attempts;
        self.transition(SupervisorState::Connecting { attempt });
        info!(attempt, "Connecting");

        let plan = self.builder.plan(&self.config);
        let (events_tx, events_rx) = event_channel();

        let graph = match self.build_graph(&plan, events_tx).await {
            Ok(Ok(graph)) => graph,
            Ok(Err(e)) => {
                error!(attempt, stage = %e.stage, error = %e, "Failed to build graph");
                self.note_first_attempt(false);
                return CycleEnd::Retry(FaultReason::Build(e));
            }
            Err(e) => {
                error!(attempt, error = %e, "Graph build task failed");
                self.note_first_attempt(false);
                return CycleEnd::Retry(FaultReason::Runtime {
                    source: "builder".to_string(),
                    message: e.to_string(),
                });
            }
        };

        self.transition(SupervisorState::Linking);

        let played = tokio::task::spawn_blocking(move || {
            let mut graph = graph;
            let result = graph.graph.play();
            (graph, result)
        })
        .await;

        let mut graph = match played {
            Ok((graph, Ok(()))) => graph,
            Ok((graph, Err(e))) => {
                error!(attempt, error = %e, "Failed to start graph");
                self.note_first_attempt(false);
                return self.fault(graph, FaultReason::Play(e.to_string())).await;
            }
            Err(e) => {
                // The graph was dropped, and torn down, with the failed task
                error!(attempt, error = %e, "Graph start task failed");
                self.note_first_attempt(false);
                let reason = FaultReason::Play(e.to_string());
                self.transition(SupervisorState::Faulted {
                    reason: reason.clone(),
                });
                return CycleEnd::Retry(reason);
            }
        };
        self.note_first_attempt(true);

        let mut linker = DynamicLinker::new(JunctionTable::from_plan(&plan));
        let mut monitor = EventMonitor::new(events_rx, self.poll_interval);
        let mut running_since = None;

        if linker.table().is_fully_linked() {
            running_since = Some(Instant::now());
            self.enter_running();
        }

        loop {
            match monitor.poll(&mut self.stop).await {
                MonitorSignal::Timeout | MonitorSignal::Continue => {}
                MonitorSignal::Stopped => {
                    Self::teardown(graph).await;
                    return CycleEnd::Stopped;
                }
                MonitorSignal::Rebuild(reason) => return self.fault(graph, reason).await,
                MonitorSignal::Track(track) => {
                    match linker.on_track_available(graph.graph.as_mut(), track) {
                        LinkOutcome::Linked {
                            fully_linked: true, ..
                        } => {
                            running_since = Some(Instant::now());
                            self.enter_running();
                        }
                        LinkOutcome::Failed(e) => {
                            return self.fault(graph, FaultReason::Link(e)).await;
                        }
                        _ => {}
                    }
                }
            }

            if let Some(since) = running_since {
                self.check_sustained(since);
            }
        }
    }

    fn enter_running(&mut self) {
        self.transition(SupervisorState::Running);
        info!("Stream running");

        if self.backoff.policy().reset == ResetPolicy::OnRunning && !self.backoff.is_initial() {
            self.backoff.reset();
            debug!(delay_ms = self.backoff.current_ms(), "Backoff reset");
        }
    }

    fn check_sustained(&mut self, since: Instant) {
        if let ResetPolicy::AfterSustained { ms } = self.backoff.policy().reset {
            if !self.backoff.is_initial() && since.elapsed() >= Duration::from_millis(ms) {
                self.backoff.reset();
                debug!(
                    sustained_ms = ms,
                    delay_ms = self.backoff.current_ms(),
                    "Backoff reset after sustained run"
                );
            }
        }
    }

    /// Instantiate `plan` on the blocking pool, leased from the runtime
    async fn build_graph(
        &self,
        plan: &GraphPlan,
        events: EventSender,
    ) -> std::result::Result<std::result::Result<LiveGraph, BuildError>, JoinError> {
        let builder = self.builder.clone();
        let plan = plan.clone();
        let runtime = Arc::clone(&self.runtime);

        tokio::task::spawn_blocking(move || {
            let lease = runtime.lease();
            builder
                .build(&plan, runtime.backend(), events)
                .map(|graph| LiveGraph {
                    graph,
                    _lease: lease,
                })
        })
        .await
    }

    async fn fault(&mut self, graph: LiveGraph, reason: FaultReason) -> CycleEnd {
        self.transition(SupervisorState::Faulted {
            reason: reason.clone(),
        });
        Self::teardown(graph).await;
        CycleEnd::Retry(reason)
    }

    /// Tear the graph down on the blocking pool and wait for it
    ///
    /// If this future is cancelled the teardown still completes, and the
    /// graph's lease is only released once it has.
    async fn teardown(graph: LiveGraph) {
        match tokio::task::spawn_blocking(move || drop(graph)).await {
            Ok(()) => debug!("Graph torn down"),
            Err(e) => error!(error = %e, "Graph teardown failed"),
        }
    }

    /// Sleep the current backoff delay. Returns `false` if stopped meanwhile.
    async fn sleep_backoff(&mut self, reason: &FaultReason) -> bool {
        if self.stop.is_stopped() {
            return false;
        }

        let delay = self.backoff.advance();
        let delay_ms = delay.as_millis() as u64;
        self.transition(SupervisorState::Backoff { delay_ms });
        warn!(delay_ms, %reason, "Reconnecting after backoff");

        tokio::select! {
            biased;
            _ = self.stop.stopped() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    fn note_first_attempt(&mut self, ok: bool) {
        if self.first_attempt_ok.is_none() {
            self.first_attempt_ok = Some(ok);
        }
    }

    fn transition(&mut self, next: SupervisorState) {
        debug!(state = %next, "State transition");
        self.state.send_replace(next.clone());
        // No subscribers is fine
        let _ = self.transitions.send(next);
    }
}

/// Control and observation handle for one supervisor
pub struct SupervisorHandle {
    name: String,
    state: watch::Receiver<SupervisorState>,
    transitions: broadcast::Sender<SupervisorState>,
    stop: StopHandle,
    pending: Option<StreamSupervisor>,
    task: Option<JoinHandle<SupervisorReport>>,
}

impl SupervisorHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state
    pub fn state(&self) -> SupervisorState {
        self.state.borrow().clone()
    }

    /// Watch the current state
    pub fn watch(&self) -> watch::Receiver<SupervisorState> {
        self.state.clone()
    }

    /// Receive every transition from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorState> {
        self.transitions.subscribe()
    }

    pub fn is_started(&self) -> bool {
        self.task.is_some()
    }

    /// Started, not yet stopped
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
            && !self.state.borrow().is_terminal()
    }

    /// Spawn the supervisor task. Returns `false` if it was already started.
    pub fn start(&mut self) -> bool {
        match self.pending.take() {
            Some(supervisor) => {
                self.task = Some(supervisor.spawn());
                true
            }
            None => false,
        }
    }

    /// Ask the supervisor to stop; does not wait
    pub fn stop(&self) {
        self.stop.stop();
    }

    /// Wait for the supervisor task to finish
    ///
    /// A supervisor that was never started is discarded and reports no
    /// attempts. Returns `None` when the task panicked or was aborted, or was
    /// already joined.
    pub async fn join(&mut self) -> Option<SupervisorReport> {
        if self.pending.take().is_some() {
            return Some(SupervisorReport {
                name: self.name.clone(),
                attempts: 0,
                first_attempt_ok: None,
            });
        }

        let task = self.task.as_mut()?;
        let result = task.await;
        self.task = None;

        match result {
            Ok(report) => Some(report),
            Err(e) if e.is_cancelled() => {
                debug!(stream = %self.name, "Supervisor task cancelled");
                None
            }
            Err(e) => {
                error!(stream = %self.name, error = %e, "Supervisor task failed");
                None
            }
        }
    }

    /// Ask tokio to cancel the supervisor task
    ///
    /// Returns immediately. [`join`](Self::join) afterwards waits until the
    /// task, and with it the graph it owned, is gone.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

impl std::fmt::Debug for SupervisorHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupervisorHandle")
            .field("name", &self.name)
            .field("state", &*self.state.borrow())
            .field("started", &self.is_started())
            .finish()
    }
}
