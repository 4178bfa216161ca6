//! Reconnect backoff
//!
//! Delays double after every failed attempt, capped at `max_ms`, and return to
//! `initial_ms` once a stream is running again. The doubling factor is fixed;
//! only the bounds and the reset rule are configurable.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// When a running stream earns a fresh backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Reset as soon as the graph is fully linked and playing
    #[default]
    OnRunning,

    /// Reset only after the stream has stayed running for `ms`
    AfterSustained { ms: u64 },
}

/// Preset bounds for known deployment targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentProfile {
    /// Desktop wall with overlay windows (2s → 30s)
    Desktop,
    /// Single-board device (0.5s → 5s)
    #[default]
    Embedded,
    /// Single-board device with tuned decode chain (0.5s → 10s)
    EmbeddedTuned,
}

impl DeploymentProfile {
    pub fn backoff(&self) -> BackoffPolicy {
        match self {
            DeploymentProfile::Desktop => BackoffPolicy::new(2_000, 30_000),
            DeploymentProfile::Embedded => BackoffPolicy::new(500, 5_000),
            DeploymentProfile::EmbeddedTuned => BackoffPolicy::new(500, 10_000),
        }
    }
}

/// Backoff bounds and reset rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// First delay after a failure (milliseconds)
    pub initial_ms: u64,

    /// Upper bound for the delay (milliseconds)
    pub max_ms: u64,

    #[serde(default)]
    pub reset: ResetPolicy,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        DeploymentProfile::default().backoff()
    }
}

impl BackoffPolicy {
    pub fn new(initial_ms: u64, max_ms: u64) -> Self {
        Self {
            initial_ms,
            max_ms,
            reset: ResetPolicy::OnRunning,
        }
    }

    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.initial_ms == 0 {
            return Err(Error::Config("backoff initial delay must be positive".into()));
        }
        if self.initial_ms > self.max_ms {
            return Err(Error::Config(format!(
                "backoff initial delay {}ms exceeds maximum {}ms",
                self.initial_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

/// Current backoff delay for one supervisor
///
/// Survives graph rebuilds for the lifetime of the supervisor.
#[derive(Debug, Clone)]
pub struct Backoff {
    policy: BackoffPolicy,
    current_ms: u64,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current_ms: policy.initial_ms,
            policy,
        }
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    pub fn current_ms(&self) -> u64 {
        self.current_ms
    }

    pub fn is_initial(&self) -> bool {
        self.current_ms == self.policy.initial_ms
    }

    /// Take the delay to sleep now and double the next one
    pub fn advance(&mut self) -> Duration {
        let delay = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.policy.max_ms);
        Duration::from_millis(delay)
    }

    pub fn reset(&mut self) {
        self.current_ms = self.policy.initial_ms;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doubles_up_to_cap() {
        let mut backoff = Backoff::new(BackoffPolicy::new(500, 5_000));
        let delays: Vec<u64> = (0..7).map(|_| backoff.advance().as_millis() as u64).collect();
        assert_eq!(delays, vec![500, 1_000, 2_000, 4_000, 5_000, 5_000, 5_000]);
    }

    #[test]
    fn test_reset_returns_to_initial() {
        let mut backoff = Backoff::new(BackoffPolicy::new(2_000, 30_000));
        backoff.advance();
        backoff.advance();
        assert_eq!(backoff.current_ms(), 8_000);
        assert!(!backoff.is_initial());

        backoff.reset();
        assert!(backoff.is_initial());
        assert_eq!(backoff.advance(), Duration::from_millis(2_000));
    }

    #[test]
    fn test_non_power_of_two_cap() {
        let mut backoff = Backoff::new(BackoffPolicy::new(3, 10));
        let delays: Vec<u64> = (0..4).map(|_| backoff.advance().as_millis() as u64).collect();
        assert_eq!(delays, vec![3, 6, 10, 10]);
    }

    #[test]
    fn test_presets() {
        assert_eq!(DeploymentProfile::Desktop.backoff(), BackoffPolicy::new(2_000, 30_000));
        assert_eq!(DeploymentProfile::Embedded.backoff(), BackoffPolicy::new(500, 5_000));
        assert_eq!(DeploymentProfile::EmbeddedTuned.backoff(), BackoffPolicy::new(500, 10_000));
        assert_eq!(BackoffPolicy::default(), BackoffPolicy::new(500, 5_000));
    }

    #[test]
    fn test_validate() {
        assert!(BackoffPolicy::new(500, 5_000).validate().is_ok());
        assert!(BackoffPolicy::new(500, 500).validate().is_ok());
        assert!(BackoffPolicy::new(0, 5_000).validate().is_err());
        assert!(BackoffPolicy::new(6_000, 5_000).validate().is_err());
    }

    #[test]
    fn test_reset_policy_serde() {
        let policy: BackoffPolicy = toml::from_str(
            r#"
            initial_ms = 500
            max_ms = 10000
            reset = { policy = "after_sustained", ms = 3000 }
            "#,
        )
        .unwrap();
        assert_eq!(policy.reset, ResetPolicy::AfterSustained { ms: 3_000 });

        let policy: BackoffPolicy = toml::from_str("initial_ms = 1\nmax_ms = 2").unwrap();
        assert_eq!(policy.reset, ResetPolicy::OnRunning);
    }
}
