//! Event monitor
//!
//! Waits on one graph's event queue with a bounded timeout and turns what it
//! finds into supervisor signals. Warnings and state changes are logged and
//! otherwise ignored. Errors and end-of-stream end the graph. A stop request
//! ends the wait without asking for a rebuild.

use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, error, info, trace, warn};

use crate::graph::{BusEvent, EventReceiver, GraphEvent, PlaybackState, Track};
use crate::supervisor::{FaultReason, StopSignal};

/// Default bound on a single wait
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Result of one poll
#[derive(Debug)]
pub enum MonitorSignal {
    /// Nothing arrived within the poll interval
    Timeout,
    /// A non-terminal event was handled
    Continue,
    /// A track needs a link decision
    Track(Track),
    /// The graph is finished and must be rebuilt
    Rebuild(FaultReason),
    /// The supervisor was asked to stop
    Stopped,
}

/// Polls the event queue of one graph instance
#[derive(Debug)]
pub struct EventMonitor {
    events: EventReceiver,
    poll_interval: Duration,
}

impl EventMonitor {
    pub fn new(events: EventReceiver, poll_interval: Duration) -> Self {
        Self {
            events,
            poll_interval,
        }
    }

    /// Wait for the next event, at most one poll interval
    pub async fn poll(&mut self, stop: &mut StopSignal) -> MonitorSignal {
        if stop.is_stopped() {
            return MonitorSignal::Stopped;
        }

        let received = tokio::select! {
            biased;
            _ = stop.stopped() => return MonitorSignal::Stopped,
            received = timeout(self.poll_interval, self.events.recv()) => received,
        };

        match received {
            Err(_) => MonitorSignal::Timeout,
            Ok(None) => MonitorSignal::Rebuild(FaultReason::Runtime {
                source: "graph".to_string(),
                message: "event queue closed".to_string(),
            }),
            Ok(Some(GraphEvent::TrackAvailable(track))) => MonitorSignal::Track(track),
            Ok(Some(GraphEvent::Bus(event))) => self.on_bus_event(event),
        }
    }

    fn on_bus_event(&self, event: BusEvent) -> MonitorSignal {
        match event {
            BusEvent::Warning { source, message } => {
                warn!(%source, "{}", message);
                MonitorSignal::Continue
            }
            BusEvent::StateChanged { old, new } => {
                if new == PlaybackState::Playing {
                    info!(%old, %new, "Pipeline playing");
                } else {
                    debug!(%old, %new, "Pipeline state changed");
                }
                MonitorSignal::Continue
            }
            BusEvent::Other(kind) => {
                trace!(%kind, "Bus message");
                MonitorSignal::Continue
            }
            BusEvent::Error {
                source,
                message,
                debug: details,
            } => {
                error!(%source, details = details.as_deref().unwrap_or(""), "{}", message);
                MonitorSignal::Rebuild(FaultReason::Runtime { source, message })
            }
            BusEvent::EndOfStream => {
                warn!("End of stream");
                MonitorSignal::Rebuild(FaultReason::EndOfStream)
            }
        }
    }
}
