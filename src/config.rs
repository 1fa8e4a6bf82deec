//! Simulation configuration.
//!
//! None of these settings affect simulated behavior; they control
//! diagnostics and how responsive `wait_until_done` is in wall-clock time.

use std::time::Duration;

#[cfg(feature = "serialize")]
use crate::error::{DesError, DesResult};

/// Knobs for a [`Simulation`](crate::Simulation).
///
/// ```toml
/// verbose = true
/// poll_interval_ms = 5
/// record_trace = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serialize", serde(default))]
pub struct SimulationConfig {
    /// Emit progress tracing (dispatches, waiting, completion).
    pub verbose: bool,
    /// How often `wait_until_done` re-checks the active flag while it
    /// waits for the completion signal. Wall-clock milliseconds.
    pub poll_interval_ms: u64,
    /// Keep a [`DispatchRecord`](crate::DispatchRecord) for every activation.
    pub record_trace: bool,
}

impl SimulationConfig {
    /// Default wall-clock polling interval.
    pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

    /// Enable progress tracing.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Enable the dispatch trace.
    pub fn with_trace(mut self) -> Self {
        self.record_trace = true;
        self
    }

    /// Polling interval as a `Duration`. Never zero.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Parse a configuration from TOML. Missing keys take their defaults.
    #[cfg(feature = "serialize")]
    pub fn from_toml_str(s: &str) -> DesResult<Self> {
        toml::from_str(s).map_err(|e| DesError::InvalidConfig(e.to_string()))
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            verbose: false,
            poll_interval_ms: Self::DEFAULT_POLL_INTERVAL_MS,
            record_trace: false,
        }
    }
}
