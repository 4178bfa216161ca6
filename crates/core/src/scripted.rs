//! Scripted in-memory media backend
//!
//! Plays back per-stream scripts of connection attempts without any media
//! framework. Each stream has a queue of [`Attempt`]s; one is consumed per
//! graph build and the last one repeats forever. Streams without a script
//! get an endless healthy session.
//!
//! Used by the integration tests and by the viewer's `dry-run` backend.
//!
//! ```ignore
//! let backend = ScriptedBackend::new();
//! backend.script("lobby", [
//!     Attempt::BuildFails(StageRole::Decoder),
//!     Attempt::Session(Session::healthy()),
//! ]);
//! ```

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{BuildError, Error, LinkError, Result, SurfaceError};
use crate::graph::{
    BusEvent, EventSender, Graph, GraphEvent, GraphPlan, JunctionId, MediaBackend, PlaybackState,
    StageRole, Track, TrackHandle,
};
use crate::surface::RenderSurface;

/// Caps posted for a video track on the transport junction
pub const RTP_VIDEO_CAPS: &str =
    "application/x-rtp, media=(string)video, clock-rate=(int)90000, encoding-name=(string)H264";
/// Caps posted for an audio track on the transport junction
pub const RTP_AUDIO_CAPS: &str =
    "application/x-rtp, media=(string)audio, clock-rate=(int)8000, encoding-name=(string)PCMA";
/// Caps posted for decoded video
pub const RAW_VIDEO_CAPS: &str = "video/x-raw, format=(string)I420, width=(int)1280, height=(int)720";

/// One scripted connection attempt
#[derive(Debug, Clone)]
pub enum Attempt {
    /// Instantiation fails at this stage
    BuildFails(StageRole),
    /// The graph builds but refuses to play
    PlayFails(String),
    /// The graph plays and posts the session's steps
    Session(Session),
}

#[derive(Debug, Clone)]
enum Step {
    Track { junction: JunctionId, caps: String },
    VideoTracks,
    Bus(BusEvent),
    Delay(Duration),
}

/// Events a playing graph posts, in order
#[derive(Debug, Clone, Default)]
pub struct Session {
    steps: Vec<Step>,
    failing_links: HashSet<JunctionId>,
    teardown_delay: Option<Duration>,
}

impl Session {
    /// A session that posts nothing
    pub fn new() -> Self {
        Self::default()
    }

    /// Plays, announces video on every junction and stays up
    pub fn healthy() -> Self {
        Self::new().playing().video_tracks()
    }

    /// Announce a track on `junction`
    pub fn track(mut self, junction: JunctionId, caps: impl Into<String>) -> Self {
        self.steps.push(Step::Track {
            junction,
            caps: caps.into(),
        });
        self
    }

    /// Announce video on every junction of the graph, upstream first
    pub fn video_tracks(mut self) -> Self {
        self.steps.push(Step::VideoTracks);
        self
    }

    pub fn bus(mut self, event: BusEvent) -> Self {
        self.steps.push(Step::Bus(event));
        self
    }

    pub fn playing(self) -> Self {
        self.bus(BusEvent::StateChanged {
            old: PlaybackState::Paused,
            new: PlaybackState::Playing,
        })
    }

    pub fn warning(self, message: &str) -> Self {
        self.bus(BusEvent::warning("scripted", message))
    }

    pub fn error(self, message: &str) -> Self {
        self.bus(BusEvent::error("scripted", message))
    }

    pub fn eos(self) -> Self {
        self.bus(BusEvent::EndOfStream)
    }

    pub fn delay(mut self, duration: Duration) -> Self {
        self.steps.push(Step::Delay(duration));
        self
    }

    /// Refuse links on `junction`
    pub fn fail_link(mut self, junction: JunctionId) -> Self {
        self.failing_links.insert(junction);
        self
    }

    /// Block the calling thread this long when the graph is torn down
    pub fn slow_teardown(mut self, duration: Duration) -> Self {
        self.teardown_delay = Some(duration);
        self
    }
}

/// Counters for one stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StreamStats {
    /// Instantiate calls, failed ones included
    pub builds: u64,
    /// Graphs currently alive
    pub live_graphs: u64,
    /// Graphs ever alive at the same time
    pub peak_live_graphs: u64,
    pub link_attempts: u64,
    pub links: u64,
    pub surface_binds: u64,
    pub teardowns: u64,
}

#[derive(Default)]
struct Inner {
    scripts: HashMap<String, VecDeque<Attempt>>,
    stats: HashMap<String, StreamStats>,
    live: HashMap<String, EventSender>,
    init_calls: u64,
    shutdown_calls: u64,
}

impl Inner {
    fn next_attempt(&mut self, stream: &str) -> Attempt {
        match self.scripts.get_mut(stream) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_else(default_attempt),
            Some(queue) => queue.front().cloned().unwrap_or_else(default_attempt),
            None => default_attempt(),
        }
    }
}

fn default_attempt() -> Attempt {
    Attempt::Session(Session::healthy())
}

/// Deterministic backend driven by scripts
#[derive(Clone, Default)]
pub struct ScriptedBackend {
    inner: Arc<Mutex<Inner>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the script for `stream`
    pub fn script(&self, stream: &str, attempts: impl IntoIterator<Item = Attempt>) {
        self.inner
            .lock()
            .scripts
            .insert(stream.to_string(), attempts.into_iter().collect());
    }

    pub fn stats(&self, stream: &str) -> StreamStats {
        self.inner
            .lock()
            .stats
            .get(stream)
            .copied()
            .unwrap_or_default()
    }

    /// Live graphs across every stream
    pub fn total_live_graphs(&self) -> u64 {
        self.inner.lock().stats.values().map(|s| s.live_graphs).sum()
    }

    pub fn init_calls(&self) -> u64 {
        self.inner.lock().init_calls
    }

    pub fn shutdown_calls(&self) -> u64 {
        self.inner.lock().shutdown_calls
    }

    /// Post a bus event into the stream's live graph
    ///
    /// Returns `false` when the stream has no live graph.
    pub fn inject(&self, stream: &str, event: BusEvent) -> bool {
        let inner = self.inner.lock();
        match inner.live.get(stream) {
            Some(tx) => tx.send(GraphEvent::Bus(event)).is_ok(),
            None => false,
        }
    }

    /// Post a track into the stream's live graph
    pub fn inject_track(&self, stream: &str, junction: JunctionId, caps: &str) -> bool {
        let inner = self.inner.lock();
        match inner.live.get(stream) {
            Some(tx) => tx
                .send(GraphEvent::TrackAvailable(Track::new(
                    junction,
                    caps,
                    TrackHandle::empty(),
                )))
                .is_ok(),
            None => false,
        }
    }
}

impl MediaBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    fn init(&self) -> Result<()> {
        self.inner.lock().init_calls += 1;
        Ok(())
    }

    fn shutdown(&self) {
        self.inner.lock().shutdown_calls += 1;
    }

    fn instantiate(
        &self,
        plan: &GraphPlan,
        events: EventSender,
    ) -> std::result::Result<Box<dyn Graph>, BuildError> {
        let mut inner = self.inner.lock();
        let attempt = inner.next_attempt(&plan.stream);
        let stats = inner.stats.entry(plan.stream.clone()).or_default();
        stats.builds += 1;

        if let Attempt::BuildFails(role) = attempt {
            let candidates = plan
                .stage(role)
                .map(|s| s.candidates.clone())
                .unwrap_or_default();
            return Err(BuildError::new(role, &candidates, "no such element"));
        }

        stats.live_graphs += 1;
        stats.peak_live_graphs = stats.peak_live_graphs.max(stats.live_graphs);
        inner.live.insert(plan.stream.clone(), events.clone());
        debug!(stream = %plan.stream, "Scripted graph instantiated");

        Ok(Box::new(ScriptedGraph {
            stream: plan.stream.clone(),
            junctions: plan.junctions.iter().map(|j| j.id).collect(),
            attempt,
            events,
            inner: Arc::clone(&self.inner),
            player: None,
            torn_down: false,
        }))
    }
}

struct ScriptedGraph {
    stream: String,
    junctions: Vec<JunctionId>,
    attempt: Attempt,
    events: EventSender,
    inner: Arc<Mutex<Inner>>,
    player: Option<JoinHandle<()>>,
    torn_down: bool,
}

impl ScriptedGraph {
    fn stats<R>(&self, f: impl FnOnce(&mut StreamStats) -> R) -> R {
        let mut inner = self.inner.lock();
        f(inner.stats.entry(self.stream.clone()).or_default())
    }
}

impl Graph for ScriptedGraph {
    fn bind_surface(&mut self, _surface: &RenderSurface) -> std::result::Result<(), SurfaceError> {
        self.stats(|s| s.surface_binds += 1);
        Ok(())
    }

    fn play(&mut self) -> Result<()> {
        let session = match &self.attempt {
            Attempt::PlayFails(reason) => return Err(Error::Play(reason.clone())),
            Attempt::Session(session) => session.clone(),
            Attempt::BuildFails(_) => return Ok(()),
        };

        let events = self.events.clone();
        let junctions = self.junctions.clone();
        self.player = Some(tokio::spawn(async move {
            for step in session.steps {
                let sent = match step {
                    Step::Delay(d) => {
                        tokio::time::sleep(d).await;
                        true
                    }
                    Step::Bus(event) => events.send(GraphEvent::Bus(event)).is_ok(),
                    Step::Track { junction, caps } => events
                        .send(GraphEvent::TrackAvailable(Track::new(
                            junction,
                            caps,
                            TrackHandle::empty(),
                        )))
                        .is_ok(),
                    Step::VideoTracks => junctions.iter().all(|junction| {
                        let caps = match junction {
                            JunctionId::Transport => RTP_VIDEO_CAPS,
                            JunctionId::Decoded => RAW_VIDEO_CAPS,
                        };
                        events
                            .send(GraphEvent::TrackAvailable(Track::new(
                                *junction,
                                caps,
                                TrackHandle::empty(),
                            )))
                            .is_ok()
                    }),
                };
                if !sent {
                    break;
                }
            }
        }));
        Ok(())
    }

    fn link(&mut self, track: Track) -> std::result::Result<(), LinkError> {
        let refuse = match &self.attempt {
            Attempt::Session(session) => session.failing_links.contains(&track.junction),
            _ => false,
        };

        self.stats(|s| {
            s.link_attempts += 1;
            if !refuse {
                s.links += 1;
            }
        });

        if refuse {
            Err(LinkError::new(track.junction, "not-negotiated"))
        } else {
            Ok(())
        }
    }

    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Some(player) = self.player.take() {
            player.abort();
        }
        if let Attempt::Session(Session {
            teardown_delay: Some(delay),
            ..
        }) = &self.attempt
        {
            std::thread::sleep(*delay);
        }

        let mut inner = self.inner.lock();
        if inner
            .live
            .get(&self.stream)
            .is_some_and(|tx| tx.same_channel(&self.events))
        {
            inner.live.remove(&self.stream);
        }
        let stats = inner.stats.entry(self.stream.clone()).or_default();
        stats.live_graphs = stats.live_graphs.saturating_sub(1);
        stats.teardowns += 1;
    }
}

impl Drop for ScriptedGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}
