//! DispatchRecord — records every activation handed out by the control loop.

use crate::time::VirtualTime;

use super::id::ProcessId;

/// A record of a single dispatch.
///
/// Appended by the scheduler whenever a process receives the activation
/// token, when tracing is enabled in the configuration. Useful for test
/// assertions and post-mortem debugging.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct DispatchRecord {
    /// Position of this dispatch in the run (0-based).
    pub seq: u64,
    /// Virtual time at which the process was activated.
    pub time: VirtualTime,
    /// The process that received the token.
    pub process: ProcessId,
}

impl std::fmt::Display for DispatchRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[#{} {}] {}", self.seq, self.time, self.process)
    }
}
