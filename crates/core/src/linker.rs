//! Dynamic linker
//!
//! Resolves the junctions of a graph as its upstream stages announce tracks.
//! Each junction moves `Unlinked → Linked` at most once per graph instance.
//! Repeated notifications for a linked junction are dropped without touching
//! the graph, and non-video tracks are never linked.
//!
//! The linker runs on the supervisor's side of the per-graph event queue, so
//! check-and-set on [`LinkState`] is serialized by the queue itself.

use std::collections::BTreeMap;
use std::fmt;

use tracing::{debug, error, info};

use crate::error::LinkError;
use crate::graph::{Graph, GraphPlan, JunctionId, Track};
use crate::probe::{self, TrackKind};

/// State of one dynamic junction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Unlinked,
    Linked,
    Failed,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Unlinked => write!(f, "unlinked"),
            LinkState::Linked => write!(f, "linked"),
            LinkState::Failed => write!(f, "failed"),
        }
    }
}

/// Link state of every dynamic junction in one graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JunctionTable {
    states: BTreeMap<JunctionId, LinkState>,
}

impl JunctionTable {
    /// One `Unlinked` entry per junction in the plan
    pub fn from_plan(plan: &GraphPlan) -> Self {
        Self {
            states: plan
                .junctions
                .iter()
                .map(|j| (j.id, LinkState::Unlinked))
                .collect(),
        }
    }

    /// `None` for a junction the plan does not have
    pub fn state(&self, id: JunctionId) -> Option<LinkState> {
        self.states.get(&id).copied()
    }

    /// Every junction needed for the video path is linked
    pub fn is_fully_linked(&self) -> bool {
        self.states.values().all(|s| *s == LinkState::Linked)
    }

    pub fn has_failed(&self) -> bool {
        self.states.values().any(|s| *s == LinkState::Failed)
    }

    pub fn linked_count(&self) -> usize {
        self.states
            .values()
            .filter(|s| **s == LinkState::Linked)
            .count()
    }

    /// Number of junctions tracked
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    fn set(&mut self, id: JunctionId, state: LinkState) {
        self.states.insert(id, state);
    }
}

/// What happened to one track notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    /// The junction is now linked
    Linked {
        junction: JunctionId,
        fully_linked: bool,
    },
    /// Duplicate notification for a linked junction
    AlreadyLinked,
    /// The track is not primary video
    Ignored { kind: TrackKind },
    /// The junction already failed; the graph is about to be rebuilt
    Skipped,
    /// The graph has no such junction
    UnknownJunction(JunctionId),
    /// The link was attempted and refused
    Failed(LinkError),
}

/// Per-graph linker
#[derive(Debug)]
pub struct DynamicLinker {
    table: JunctionTable,
}

impl DynamicLinker {
    pub fn new(table: JunctionTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &JunctionTable {
        &self.table
    }

    /// Decide on and possibly link a newly announced track
    ///
    /// Dropped tracks release their handle when they go out of scope here.
    pub fn on_track_available(&mut self, graph: &mut dyn Graph, track: Track) -> LinkOutcome {
        let junction = track.junction;

        match self.table.state(junction) {
            None => {
                debug!(%junction, "Track for a junction this graph does not have");
                return LinkOutcome::UnknownJunction(junction);
            }
            Some(LinkState::Linked) => {
                debug!(%junction, "Junction already linked, ignoring duplicate track");
                return LinkOutcome::AlreadyLinked;
            }
            Some(LinkState::Failed) => return LinkOutcome::Skipped,
            Some(LinkState::Unlinked) => {}
        }

        let kind = probe::classify(&track.descriptor);
        if kind != TrackKind::Video {
            debug!(%junction, %kind, caps = %track.descriptor, "Ignoring non-video track");
            return LinkOutcome::Ignored { kind };
        }

        let caps = track.descriptor.clone();
        match graph.link(track) {
            Ok(()) => {
                self.table.set(junction, LinkState::Linked);
                let fully_linked = self.table.is_fully_linked();
                info!(%junction, %caps, fully_linked, "Linked video track");
                LinkOutcome::Linked {
                    junction,
                    fully_linked,
                }
            }
            Err(e) => {
                self.table.set(junction, LinkState::Failed);
                error!(%junction, %caps, error = %e, "Failed to link video track");
                LinkOutcome::Failed(e)
            }
        }
    }
}
