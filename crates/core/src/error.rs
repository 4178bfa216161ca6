//! Error types for Streamwall Core

use thiserror::Error;

use crate::graph::{JunctionId, StageRole};

/// Result type alias for Streamwall Core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in Streamwall Core
#[derive(Debug, Error)]
pub enum Error {
    /// A required stage could not be instantiated
    #[error(transparent)]
    Build(#[from] BuildError),

    /// A dynamic junction could not be linked
    #[error(transparent)]
    Link(#[from] LinkError),

    /// The render surface could not be bound
    #[error(transparent)]
    Surface(#[from] SurfaceError),

    /// Media framework initialization failed
    #[error("Media runtime initialization failed: {0}")]
    Init(String),

    /// Graph refused to start playback
    #[error("Failed to start playback: {0}")]
    Play(String),

    /// Two configured streams share a name
    #[error("Duplicate stream name: {0}")]
    DuplicateStream(String),

    /// No stream with that name is supervised
    #[error("Unknown stream: {0}")]
    UnknownStream(String),

    /// Invalid supervisor configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// A required stage could not be created on this host
///
/// Carries every factory that was tried so the log line says exactly which
/// plugins are missing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to build {stage} stage (tried: {}): {reason}", candidates.join(", "))]
pub struct BuildError {
    /// Role of the stage that could not be created
    pub stage: StageRole,
    /// Factory names tried, in preference order
    pub candidates: Vec<String>,
    /// Backend-specific detail
    pub reason: String,
}

impl BuildError {
    /// Failure of `stage` after trying every factory in `candidates`
    pub fn new(stage: StageRole, candidates: &[String], reason: impl Into<String>) -> Self {
        Self {
            stage,
            candidates: candidates.to_vec(),
            reason: reason.into(),
        }
    }
}

/// Negotiated format was incompatible with the downstream stage
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to link {junction} junction: {reason}")]
pub struct LinkError {
    /// Junction the track arrived on
    pub junction: JunctionId,
    /// Backend-specific detail
    pub reason: String,
}

impl LinkError {
    pub fn new(junction: JunctionId, reason: impl Into<String>) -> Self {
        Self {
            junction,
            reason: reason.into(),
        }
    }
}

/// Render surface binding errors
///
/// Never fatal to a graph; the stream keeps running headless.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SurfaceError {
    /// The sink has no way to draw onto this kind of surface
    #[error("Sink '{sink}' does not support {surface} surfaces")]
    Unsupported { sink: String, surface: String },

    /// The surface handle was rejected (destroyed window, bad plane)
    #[error("Surface rejected: {0}")]
    Rejected(String),
}
