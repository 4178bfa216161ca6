//! Stream supervisor states and fault reasons

use std::fmt;

use crate::error::{BuildError, LinkError};

/// Why a connection attempt ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FaultReason {
    /// A required stage could not be created
    Build(BuildError),
    /// The graph refused to start
    Play(String),
    /// A dynamic junction could not be linked
    Link(LinkError),
    /// Transport or decoder reported an error
    Runtime { source: String, message: String },
    /// The peer closed the session
    EndOfStream,
}

impl fmt::Display for FaultReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultReason::Build(e) => write!(f, "{}", e),
            FaultReason::Play(msg) => write!(f, "failed to start playback: {}", msg),
            FaultReason::Link(e) => write!(f, "{}", e),
            FaultReason::Runtime { source, message } => write!(f, "{}: {}", source, message),
            FaultReason::EndOfStream => write!(f, "end of stream"),
        }
    }
}

/// Stream supervisor state
///
/// ```text
/// Idle → Connecting → Linking → Running
///            │           │         │
///            │           └──→ Faulted ←┘
///            │                  │
///            └─────────────→ Backoff → Connecting …
///
/// any → Stopped
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Connecting { attempt: u64 },
    Linking,
    Running,
    Faulted { reason: FaultReason },
    Backoff { delay_ms: u64 },
    Stopped,
}

impl SupervisorState {
    /// State name without payload
    pub fn name(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Connecting { .. } => "connecting",
            SupervisorState::Linking => "linking",
            SupervisorState::Running => "running",
            SupervisorState::Faulted { .. } => "faulted",
            SupervisorState::Backoff { .. } => "backoff",
            SupervisorState::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SupervisorState::Stopped)
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SupervisorState::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            SupervisorState::Faulted { reason } => write!(f, "faulted ({})", reason),
            SupervisorState::Backoff { delay_ms } => write!(f, "backoff ({}ms)", delay_ms),
            other => f.write_str(other.name()),
        }
    }
}
