//! Graph plan and builder
//!
//! [`GraphBuilder::plan`] turns a stream configuration and a [`GraphProfile`]
//! into a backend-neutral [`GraphPlan`]: ordered stages with candidate
//! factories and properties, the static links wired at build time, and the
//! dynamic junctions resolved later by the linker.
//!
//! ```text
//! auto:      source ⇢ auto-decoder ⇢ queue → [scale → filter] → convert → sink
//! explicit:  source ⇢ input-queue → depay → parse → decoder → queue → [scale → filter] → convert → sink
//! ```
//!
//! `⇢` marks a dynamic junction, `→` a static link.

use std::fmt;

use tracing::{debug, warn};

use super::backend::{Graph, MediaBackend};
use super::event::EventSender;
use super::profile::{DecodeMode, GraphProfile, TransportOptions};
use crate::config::StreamConfig;
use crate::error::BuildError;
use crate::surface::RenderSurface;

/// Role a stage plays in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageRole {
    Source,
    InputQueue,
    AutoDecoder,
    Depay,
    Parse,
    Decoder,
    Queue,
    Scale,
    Filter,
    Convert,
    Sink,
}

impl StageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageRole::Source => "source",
            StageRole::InputQueue => "input-queue",
            StageRole::AutoDecoder => "auto-decoder",
            StageRole::Depay => "depay",
            StageRole::Parse => "parse",
            StageRole::Decoder => "decoder",
            StageRole::Queue => "queue",
            StageRole::Scale => "scale",
            StageRole::Filter => "filter",
            StageRole::Convert => "convert",
            StageRole::Sink => "sink",
        }
    }
}

impl fmt::Display for StageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Dynamic junction identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum JunctionId {
    /// Transport source output (RTP payload) into the decode side
    Transport,
    /// Auto-decoder output (raw frames) into the post-processing chain
    Decoded,
}

impl fmt::Display for JunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JunctionId::Transport => write!(f, "transport"),
            JunctionId::Decoded => write!(f, "decoded"),
        }
    }
}

/// One stage to instantiate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub role: StageRole,
    /// Element name, unique within the process (`<stream>_<role>`)
    pub name: String,
    /// Factory names in preference order
    pub candidates: Vec<String>,
    /// Properties applied when the chosen element exposes them
    pub properties: Vec<(String, String)>,
}

impl StageSpec {
    fn new(stream: &str, role: StageRole, candidates: &[&str]) -> Self {
        Self {
            role,
            name: format!("{}_{}", stream, role),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            properties: Vec::new(),
        }
    }

    fn with(mut self, key: &str, value: impl ToString) -> Self {
        self.properties.push((key.to_string(), value.to_string()));
        self
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A link that can only be made once the upstream output appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JunctionSpec {
    pub id: JunctionId,
    pub upstream: StageRole,
    pub downstream: StageRole,
}

/// Backend-neutral description of one stream's graph
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphPlan {
    pub stream: String,
    pub profile: GraphProfile,
    pub stages: Vec<StageSpec>,
    /// Links made eagerly at build time
    pub static_links: Vec<(StageRole, StageRole)>,
    /// Links deferred until the upstream stage announces a track
    pub junctions: Vec<JunctionSpec>,
    pub surface: RenderSurface,
}

impl GraphPlan {
    pub fn stage(&self, role: StageRole) -> Option<&StageSpec> {
        self.stages.iter().find(|s| s.role == role)
    }

    pub fn junction(&self, id: JunctionId) -> Option<&JunctionSpec> {
        self.junctions.iter().find(|j| j.id == id)
    }

    /// Stages that announce tracks at runtime, with the junction they feed
    pub fn dynamic_sources(&self) -> impl Iterator<Item = (StageRole, JunctionId)> + '_ {
        self.junctions.iter().map(|j| (j.upstream, j.id))
    }
}

/// Builds graphs for streams
#[derive(Debug, Clone, Default)]
pub struct GraphBuilder {
    profile: GraphProfile,
    transport: TransportOptions,
}

impl GraphBuilder {
    /// Builder with a default profile; streams may override it
    pub fn new(profile: GraphProfile, transport: TransportOptions) -> Self {
        Self { profile, transport }
    }

    /// Resolve the graph shape for `config`
    pub fn plan(&self, config: &StreamConfig) -> GraphPlan {
        let profile = config.graph.unwrap_or(self.profile);
        let name = config.name.as_str();

        let mut source = StageSpec::new(name, StageRole::Source, &["rtspsrc"])
            .with("location", &config.url)
            .with("latency", self.transport.latency_ms)
            .with("drop-on-latency", true);
        if let Some(protocol) = self.transport.protocol.resolve(&config.url) {
            source = source.with("protocols", protocol);
        }
        if let Some(timeout_ms) = self.transport.timeout_ms {
            // microseconds
            source = source.with("timeout", timeout_ms.saturating_mul(1000));
        }

        let mut stages = vec![source];
        let mut junctions = Vec::new();

        // Statically linked chain, starting at the downstream end of the
        // last dynamic junction
        let mut chain = match profile.decode_mode {
            DecodeMode::Auto => {
                stages.push(StageSpec::new(name, StageRole::AutoDecoder, &["decodebin"]));
                junctions.push(JunctionSpec {
                    id: JunctionId::Transport,
                    upstream: StageRole::Source,
                    downstream: StageRole::AutoDecoder,
                });
                junctions.push(JunctionSpec {
                    id: JunctionId::Decoded,
                    upstream: StageRole::AutoDecoder,
                    downstream: StageRole::Queue,
                });
                Vec::new()
            }
            DecodeMode::Explicit { codec } => {
                junctions.push(JunctionSpec {
                    id: JunctionId::Transport,
                    upstream: StageRole::Source,
                    downstream: StageRole::InputQueue,
                });
                vec![
                    StageSpec::new(name, StageRole::InputQueue, &["queue"]),
                    StageSpec::new(name, StageRole::Depay, &[codec.depayloader()]),
                    StageSpec::new(name, StageRole::Parse, &[codec.parser()]),
                    StageSpec::new(name, StageRole::Decoder, codec.decoder_candidates()),
                ]
            }
        };

        chain.push(
            StageSpec::new(name, StageRole::Queue, &["queue"])
                .with("max-size-buffers", 1)
                .with("max-size-bytes", 0)
                .with("max-size-time", 0)
                .with("leaky", "downstream"),
        );
        if let Some(resolution) = profile.target_resolution {
            chain.push(StageSpec::new(name, StageRole::Scale, &["videoscale"]));
            chain.push(
                StageSpec::new(name, StageRole::Filter, &["capsfilter"])
                    .with("caps", resolution.caps()),
            );
        }
        chain.push(StageSpec::new(name, StageRole::Convert, &["videoconvert"]));
        chain.push(
            StageSpec::new(name, StageRole::Sink, profile.sink_kind.candidates())
                .with("sync", false)
                .with("force-aspect-ratio", true),
        );

        let static_links = chain
            .windows(2)
            .map(|pair| (pair[0].role, pair[1].role))
            .collect();
        stages.extend(chain);

        GraphPlan {
            stream: config.name.clone(),
            profile,
            stages,
            static_links,
            junctions,
            surface: config.surface,
        }
    }

    /// Instantiate `plan` on `backend` and bind its sink to the surface
    ///
    /// A surface that cannot be bound is logged and otherwise ignored; the
    /// graph then runs headless.
    pub fn build(
        &self,
        plan: &GraphPlan,
        backend: &dyn MediaBackend,
        events: EventSender,
    ) -> Result<Box<dyn Graph>, BuildError> {
        debug!(
            backend = backend.name(),
            stages = plan.stages.len(),
            junctions = plan.junctions.len(),
            "Instantiating graph"
        );

        let mut graph = backend.instantiate(plan, events)?;

        if !plan.surface.is_none() {
            if let Err(e) = graph.bind_surface(&plan.surface) {
                warn!(surface = %plan.surface, error = %e, "Failed to bind render surface, running headless");
            }
        }

        Ok(graph)
    }
}
