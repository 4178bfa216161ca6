//! Media backend seam
//!
//! The stages themselves (transport, decoders, scalers, sinks) live in an
//! external media framework. The supervisor reaches them only through these
//! two traits.

use super::event::{EventSender, Track};
use super::plan::GraphPlan;
use crate::error::{BuildError, LinkError, Result, SurfaceError};
use crate::surface::RenderSurface;

/// Factory for graphs plus process-wide framework lifecycle
pub trait MediaBackend: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Process-wide one-time initialization. Must be idempotent.
    fn init(&self) -> Result<()>;

    /// Release process-wide framework state after every graph is gone
    fn shutdown(&self);

    /// Create every stage of `plan`, make its static links and register its
    /// dynamic sources to post [`Track`]s into `events`
    ///
    /// Each stage's candidates are tried in order. Properties the chosen
    /// element does not expose are skipped.
    fn instantiate(
        &self,
        plan: &GraphPlan,
        events: EventSender,
    ) -> std::result::Result<Box<dyn Graph>, BuildError>;
}

/// One live graph, owned by exactly one supervisor
///
/// Dropping a graph must tear it down.
pub trait Graph: Send {
    /// Point the sink at an externally owned surface
    fn bind_surface(&mut self, surface: &RenderSurface) -> std::result::Result<(), SurfaceError>;

    /// Start playback
    fn play(&mut self) -> Result<()>;

    /// Resolve the junction named by `track`
    fn link(&mut self, track: Track) -> std::result::Result<(), LinkError>;

    /// Stop every stage and release its resources. Synchronous and idempotent.
    fn teardown(&mut self);
}
