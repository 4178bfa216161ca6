//! Process-wide media framework lifecycle
//!
//! A [`MediaRuntime`] is acquired once before any supervisor starts and is
//! shared with every supervisor. When the last reference goes away the
//! backend is shut down, unless the runtime was only borrowed from another
//! embedding context that owns the framework.
//!
//! The runtime also counts live graphs. Every graph holds a [`GraphLease`]
//! until it is torn down, so the framework cannot be shut down under a graph
//! and shutdown can wait for the last one to go.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::error::Result;
use crate::graph::MediaBackend;

pub struct MediaRuntime {
    backend: Arc<dyn MediaBackend>,
    owns: bool,
    shut_down: AtomicBool,
    live: watch::Sender<usize>,
}

impl MediaRuntime {
    /// Initialize the backend and take ownership of its lifecycle
    pub fn acquire(backend: Arc<dyn MediaBackend>) -> Result<Arc<Self>> {
        backend.init()?;
        info!(backend = backend.name(), "Media runtime initialized");
        Ok(Arc::new(Self {
            backend,
            owns: true,
            shut_down: AtomicBool::new(false),
            live: watch::channel(0).0,
        }))
    }

    /// Use a backend someone else initialized; never shuts it down
    pub fn borrowed(backend: Arc<dyn MediaBackend>) -> Arc<Self> {
        Arc::new(Self {
            backend,
            owns: false,
            shut_down: AtomicBool::new(false),
            live: watch::channel(0).0,
        })
    }

    pub fn backend(&self) -> &dyn MediaBackend {
        self.backend.as_ref()
    }

    pub fn owns_runtime(&self) -> bool {
        self.owns
    }

    /// Graphs currently holding a lease
    pub fn live_graphs(&self) -> usize {
        *self.live.borrow()
    }

    /// Count one more live graph until the lease is dropped
    pub fn lease(self: &Arc<Self>) -> GraphLease {
        self.live.send_modify(|n| *n += 1);
        GraphLease {
            runtime: Arc::clone(self),
        }
    }

    /// Resolve once no graph holds a lease
    pub async fn graphs_released(&self) {
        let mut rx = self.live.subscribe();
        // The sender lives in `self`, so the wait cannot fail
        let _ = rx.wait_for(|n| *n == 0).await;
    }

    fn shutdown(&self) {
        if !self.owns {
            debug!(backend = self.backend.name(), "Borrowed media runtime released");
            return;
        }
        if !self.shut_down.swap(true, Ordering::SeqCst) {
            self.backend.shutdown();
            info!(backend = self.backend.name(), "Media runtime shut down");
        }
    }
}

impl std::fmt::Debug for MediaRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaRuntime")
            .field("backend", &self.backend.name())
            .field("owns", &self.owns)
            .field("live_graphs", &self.live_graphs())
            .finish()
    }
}

impl Drop for MediaRuntime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Marks one graph as alive on its [`MediaRuntime`]
///
/// Keeps the runtime itself alive too, so the backend is never shut down
/// while a graph still exists.
#[derive(Debug)]
pub struct GraphLease {
    runtime: Arc<MediaRuntime>,
}

impl Drop for GraphLease {
    fn drop(&mut self) {
        self.runtime.live.send_modify(|n| *n = n.saturating_sub(1));
    }
}

#[cfg(all(test, feature = "scripted"))]
mod tests {
    use super::*;
    use crate::scripted::ScriptedBackend;

    #[test]
    fn test_owned_runtime_shuts_down_once() {
        let backend = ScriptedBackend::new();
        let runtime = MediaRuntime::acquire(Arc::new(backend.clone())).unwrap();
        assert!(runtime.owns_runtime());
        assert_eq!(backend.init_calls(), 1);

        let shared = Arc::clone(&runtime);
        drop(runtime);
        assert_eq!(backend.shutdown_calls(), 0);
        drop(shared);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[test]
    fn test_lease_keeps_backend_alive() {
        let backend = ScriptedBackend::new();
        let runtime = MediaRuntime::acquire(Arc::new(backend.clone())).unwrap();

        let lease = runtime.lease();
        assert_eq!(runtime.live_graphs(), 1);
        drop(runtime);
        assert_eq!(backend.shutdown_calls(), 0);

        drop(lease);
        assert_eq!(backend.shutdown_calls(), 1);
    }

    #[tokio::test]
    async fn test_graphs_released_waits_for_last_lease() {
        let runtime = MediaRuntime::acquire(Arc::new(ScriptedBackend::new())).unwrap();
        runtime.graphs_released().await;

        let first = runtime.lease();
        let second = runtime.lease();
        assert_eq!(runtime.live_graphs(), 2);

        let releaser = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            drop(first);
            drop(second);
        });

        tokio::time::timeout(std::time::Duration::from_secs(2), runtime.graphs_released())
            .await
            .expect("leases should be released");
        assert_eq!(runtime.live_graphs(), 0);
        releaser.await.unwrap();
    }

    #[test]
    fn test_borrowed_runtime_never_shuts_down() {
        let backend = ScriptedBackend::new();
        let runtime = MediaRuntime::borrowed(Arc::new(backend.clone()));
        assert!(!runtime.owns_runtime());
        drop(runtime);
        assert_eq!(backend.init_calls(), 0);
        assert_eq!(backend.shutdown_calls(), 0);
    }
}
