//! Stream supervision: backoff policy, per-stream state machine and the set
//! that runs them side by side

mod backoff;
mod set;
mod state;
mod stop;
mod stream;

pub use backoff::{Backoff, BackoffPolicy, DeploymentProfile, ResetPolicy};
pub use set::{ShutdownReport, SupervisorSet};
pub use state::{FaultReason, SupervisorState};
pub use stop::{stop_pair, StopHandle, StopSignal};
pub use stream::{StreamSupervisor, SupervisorHandle, SupervisorReport};
