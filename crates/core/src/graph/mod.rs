//! Graph building: profiles, plans, the event queue and the backend seam

mod backend;
mod event;
mod plan;
mod profile;

pub use backend::{Graph, MediaBackend};
pub use event::{
    event_channel, BusEvent, EventReceiver, EventSender, GraphEvent, PlaybackState, Track,
    TrackHandle,
};
pub use plan::{GraphBuilder, GraphPlan, JunctionId, JunctionSpec, StageRole, StageSpec};
pub use profile::{
    Codec, DecodeMode, GraphProfile, Resolution, SinkKind, TransportOptions, TransportProtocol,
};
