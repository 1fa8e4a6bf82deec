//! # procsim — Process-Oriented Discrete-Event Simulation
//!
//! A simulation kernel where each simulated activity is written as
//! ordinary sequential code. Processes run on their own execution
//! contexts, but a cooperative scheduler hands out a single activation
//! token, so exactly one process executes at any instant while a shared
//! virtual clock jumps forward between events.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────┐
//! │            Simulation              │ ← context handle, control loop
//! │  ┌──────────────────────────────┐  │
//! │  │          Scheduler           │  │ ← clock + four collections
//! │  │  runnable │ scheduled        │  │
//! │  │  waiting  │ interrupted      │  │
//! │  └──────────────────────────────┘  │
//! │  ┌────────────┐ ┌───────────────┐  │
//! │  │  Process   │ │ BooleanControl│  │ ← bodies + predicate waits
//! │  └────────────┘ └───────────────┘  │
//! └────────────────────────────────────┘
//!   Queue ← FIFO/LIFO lines, owned by the model
//! ```
//!
//! ## Example
//!
//! ```rust
//! use procsim::Simulation;
//!
//! let sim = Simulation::new();
//! sim.register(|ctx| {
//!     ctx.advance(10.0);
//!     assert_eq!(ctx.now().as_f64(), 10.0);
//! });
//! sim.wait_until_done();
//! assert_eq!(sim.now().as_f64(), 10.0);
//! ```

pub mod config;
pub mod control;
pub mod error;
pub mod process;
pub mod queue;
pub mod scheduler;
pub mod simulation;
pub mod time;

// Re-exports for convenience.
pub use config::SimulationConfig;
pub use control::BooleanControl;
pub use error::{DesError, DesResult, Fault};
pub use process::{DispatchRecord, ProcessContext, ProcessId, ProcessState};
pub use queue::{Discipline, Queue};
pub use scheduler::SchedulerStats;
pub use simulation::Simulation;
pub use time::VirtualTime;
