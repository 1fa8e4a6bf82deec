//! Processes — sequential simulated activities driven by the scheduler.
//!
//! A process is a closure run on its own execution context. It only
//! executes while it holds the activation token; every suspension
//! operation on its [`ProcessContext`] hands the token back to the
//! control loop and blocks until the loop hands it out again.
//!
//! # Module structure
//!
//! | Sub-module | Contents |
//! |---|---|
//! | [`id`] | [`ProcessId`] newtype |
//! | [`state`] | [`ProcessState`] and its transition table |
//! | [`context`] | [`ProcessContext`] handed to process bodies |
//! | [`trace`] | [`DispatchRecord`] struct |

pub mod context;
pub mod id;
pub mod state;
pub mod trace;

pub use context::ProcessContext;
pub use id::ProcessId;
pub use state::ProcessState;
pub use trace::DispatchRecord;
