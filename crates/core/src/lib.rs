//! Streamwall Core
//!
//! Keeps many live network video streams on screen at once. Every stream is
//! owned by a [`StreamSupervisor`] that builds its processing graph, links
//! the tracks the transport negotiates, watches the graph for errors and
//! rebuilds it with capped exponential backoff when anything goes wrong.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────── SupervisorSet ───────────────────────────────┐
//! │                                                                               │
//! │  StreamSupervisor (task per stream)                                           │
//! │  ┌────────────┐   plan    ┌──────────────┐  instantiate  ┌──────────────────┐ │
//! │  │ StreamConfig│ ───────▶ │ GraphBuilder │ ────────────▶ │ MediaBackend     │ │
//! │  └────────────┘           └──────────────┘               │  (GStreamer,     │ │
//! │                                                          │   scripted)      │ │
//! │       ┌──────────── per-graph event queue ◀──────────────┤ Graph            │ │
//! │       ▼                                                  └──────────────────┘ │
//! │  EventMonitor ── Track ──▶ DynamicLinker ── probe ──▶ link / ignore          │
//! │       │                                                                       │
//! │       └── Error / EOS ──▶ Faulted ──▶ teardown ──▶ Backoff ──▶ Connecting     │
//! └───────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Streams never share mutable state. The only process-wide resource is the
//! media framework itself, represented by [`MediaRuntime`].
//!
//! # Usage
//!
//! ```
//! use std::sync::Arc;
//! use streamwall_core::{MediaRuntime, StreamConfig, SupervisorSet, SupervisorSettings};
//! use streamwall_core::scripted::ScriptedBackend;
//!
//! # tokio_test::block_on(async {
//! let runtime = MediaRuntime::acquire(Arc::new(ScriptedBackend::new())).unwrap();
//! let mut set = SupervisorSet::new(
//!     runtime,
//!     vec![StreamConfig::new("lobby", "rtsp://10.0.0.5/stream1")],
//!     SupervisorSettings::default(),
//! )
//! .unwrap();
//! set.start();
//! // ...
//! let report = set.shutdown().await;
//! assert_eq!(report.reports.len(), 1);
//! # });
//! ```

pub mod config;
pub mod error;
pub mod graph;
pub mod linker;
pub mod monitor;
pub mod probe;
pub mod runtime;
pub mod supervisor;
pub mod surface;

pub mod backends;

#[cfg(feature = "scripted")]
pub mod scripted;

pub use config::{StreamConfig, SupervisorSettings};
pub use error::{BuildError, Error, LinkError, Result, SurfaceError};
pub use graph::{Graph, GraphBuilder, GraphProfile, MediaBackend};
pub use linker::{DynamicLinker, LinkState};
pub use runtime::MediaRuntime;
pub use supervisor::{
    BackoffPolicy, DeploymentProfile, ResetPolicy, ShutdownReport, StreamSupervisor,
    SupervisorHandle, SupervisorReport, SupervisorSet, SupervisorState,
};
pub use surface::{Rect, RenderSurface};
