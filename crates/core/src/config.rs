//! Stream and supervisor configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Error, Result};
use crate::graph::{GraphProfile, TransportOptions};
use crate::monitor::DEFAULT_POLL_INTERVAL;
use crate::supervisor::{BackoffPolicy, DeploymentProfile};
use crate::surface::RenderSurface;

/// One configured stream
///
/// Immutable once the supervisor set is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Unique stream name; used for element names and log fields
    pub name: String,

    /// Transport URL, credentials included. Passed through untouched.
    pub url: String,

    /// Externally owned drawable target
    #[serde(default)]
    pub surface: RenderSurface,

    /// Per-stream graph shape; the supervisor default when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphProfile>,
}

impl StreamConfig {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            surface: RenderSurface::None,
            graph: None,
        }
    }

    pub fn with_surface(mut self, surface: RenderSurface) -> Self {
        self.surface = surface;
        self
    }

    pub fn with_graph(mut self, graph: GraphProfile) -> Self {
        self.graph = Some(graph);
        self
    }

    /// URL with the password masked, safe for logs
    pub fn redacted_url(&self) -> String {
        redact_url(&self.url)
    }
}

pub fn redact_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            if url.password().is_some() {
                // Only fails for cannot-be-a-base URLs, which carry no password
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        // Unparseable: drop everything up to the last '@' of the authority
        Err(_) => match (raw.find("://"), raw.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***@{}", &raw[..scheme_end], &raw[at + 1..])
            }
            _ => raw.to_string(),
        },
    }
}

/// Settings shared by every supervisor in a set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Bound on a single event queue wait
    pub poll_interval: Duration,
    pub backoff: BackoffPolicy,
    /// Default graph shape
    pub graph: GraphProfile,
    pub transport: TransportOptions,
    /// How long shutdown waits for supervisors before aborting them
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self::for_profile(DeploymentProfile::default())
    }
}

impl SupervisorSettings {
    pub fn for_profile(profile: DeploymentProfile) -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            backoff: profile.backoff(),
            graph: GraphProfile::default(),
            transport: TransportOptions::default(),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_graph(mut self, graph: GraphProfile) -> Self {
        self.graph = graph;
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".into()));
        }
        self.backoff.validate()
    }
}
