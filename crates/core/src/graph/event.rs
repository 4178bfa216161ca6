//! Per-graph event queue
//!
//! Both "track available" notifications and bus messages are posted, in
//! order, into one unbounded channel per graph instance. The stream
//! supervisor is the only consumer, so link state never needs a lock.
//! A fresh channel is created for every connection attempt; anything a torn
//! down graph still posts lands in a closed queue and is dropped.

use std::any::Any;
use std::fmt;

use tokio::sync::mpsc;

use super::plan::JunctionId;

pub type EventSender = mpsc::UnboundedSender<GraphEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<GraphEvent>;

/// Create the queue for one graph instance
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Something a graph reports to its supervisor
#[derive(Debug)]
pub enum GraphEvent {
    /// An upstream stage exposed a new output
    TrackAvailable(Track),
    /// A message from the graph's bus
    Bus(BusEvent),
}

/// Pipeline playback state as reported on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Null,
    Ready,
    Paused,
    Playing,
}

impl fmt::Display for PlaybackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaybackState::Null => write!(f, "null"),
            PlaybackState::Ready => write!(f, "ready"),
            PlaybackState::Paused => write!(f, "paused"),
            PlaybackState::Playing => write!(f, "playing"),
        }
    }
}

/// Bus message, already stripped of backend types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    Warning {
        source: String,
        message: String,
    },
    Error {
        source: String,
        message: String,
        debug: Option<String>,
    },
    EndOfStream,
    StateChanged {
        old: PlaybackState,
        new: PlaybackState,
    },
    Other(String),
}

impl BusEvent {
    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        BusEvent::Error {
            source: source.into(),
            message: message.into(),
            debug: None,
        }
    }

    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        BusEvent::Warning {
            source: source.into(),
            message: message.into(),
        }
    }
}

/// Backend-owned token for a pending output (a blocked pad, for instance)
///
/// Dropping the handle releases whatever the backend was holding, which is
/// how ignored and duplicate tracks are discarded.
pub struct TrackHandle(Option<Box<dyn Any + Send>>);

impl TrackHandle {
    pub fn new<T: Any + Send>(inner: T) -> Self {
        Self(Some(Box::new(inner)))
    }

    /// Handle for backends that hold nothing
    pub fn empty() -> Self {
        Self(None)
    }

    /// Take the backend value back out
    pub fn downcast<T: Any + Send>(self) -> Option<T> {
        self.0?.downcast::<T>().ok().map(|b| *b)
    }
}

impl fmt::Debug for TrackHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0.is_some() { "TrackHandle(..)" } else { "TrackHandle(empty)" })
    }
}

/// A newly negotiated output waiting for a link decision
#[derive(Debug)]
pub struct Track {
    /// Junction this output would resolve
    pub junction: JunctionId,
    /// Textual media descriptor (caps)
    pub descriptor: String,
    pub handle: TrackHandle,
}

impl Track {
    pub fn new(junction: JunctionId, descriptor: impl Into<String>, handle: TrackHandle) -> Self {
        Self {
            junction,
            descriptor: descriptor.into(),
            handle,
        }
    }
}
