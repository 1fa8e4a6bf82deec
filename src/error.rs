//! Error types for procsim.
//!
//! Two tiers:
//! - [`DesError`] for recoverable operational errors (empty queue, bad
//!   configuration). Fallible public APIs return `DesResult<T>`.
//! - [`Fault`] for contract violations by the model author. A fault is
//!   never returned to the caller; it halts the run and is raised as a
//!   panic carrying its diagnostic.

use thiserror::Error;

use crate::process::{ProcessId, ProcessState};
use crate::time::VirtualTime;

/// Recoverable errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DesError {
    /// `get` was called on a queue holding no entities.
    #[error("queue '{queue}' is empty")]
    QueueEmpty { queue: String },

    /// A configuration document could not be parsed.
    #[error("invalid simulation config: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, DesError>`.
pub type DesResult<T> = Result<T, DesError>;

/// An unrecoverable scheduler invariant violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Fault {
    /// `wait_until_done` was called by a process other than the top-level one.
    #[error("wait_until_done called by {caller}; only the top-level process P0 may block until completion")]
    NotTopLevel { caller: ProcessId },

    /// Only scheduled processes can be interrupted.
    #[error("cannot interrupt {process}: it is {state}, not scheduled")]
    InterruptNotScheduled { process: ProcessId, state: ProcessState },

    /// Only interrupted processes can be resumed.
    #[error("cannot resume {process}: it is {state}, not interrupted")]
    ResumeNotInterrupted { process: ProcessId, state: ProcessState },

    /// An operation that acts on behalf of the active process found none.
    #[error("{operation} requires an active process, but none holds the activation token")]
    NoActiveProcess { operation: &'static str },

    /// A process context was used while another process held the token.
    #[error("{operation} issued by {caller} while {active} holds the activation token")]
    ForeignContext {
        operation: &'static str,
        caller: ProcessId,
        active: ProcessId,
    },

    /// The control loop would move the clock backward.
    #[error("virtual time would move backward from {now} to {requested}")]
    TimeWentBackward { now: VirtualTime, requested: VirtualTime },

    /// A time interval was negative or not finite.
    #[error("invalid time interval {interval} for {operation}: must be finite and non-negative")]
    InvalidInterval { operation: &'static str, interval: f64 },

    /// A process ID was referenced but never registered.
    #[error("process {0} is not registered")]
    UnknownProcess(ProcessId),

    /// `register` was called after the control loop finished.
    #[error("cannot register a process: the simulation has finished")]
    SimulationFinished,

    /// The OS refused to create an execution context.
    #[error("failed to spawn execution context for {process}: {reason}")]
    SpawnFailed { process: ProcessId, reason: String },

    /// The run ended while the top-level process was still blocked.
    #[error("simulation finished while {process} was still blocked")]
    Stranded { process: ProcessId },

    /// A process body panicked.
    #[error("process {process} panicked: {message}")]
    ProcessPanicked { process: ProcessId, message: String },
}
