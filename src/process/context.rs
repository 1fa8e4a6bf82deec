//! `ProcessContext` — the handle a process body uses to talk to the scheduler.

use crate::control::BooleanControl;
use crate::error::Fault;
use crate::simulation::Simulation;
use crate::time::VirtualTime;

use super::id::ProcessId;

/// Handle passed to every process body.
///
/// Each suspending operation first checks that this process holds the
/// activation token; using a context from the wrong execution context is
/// a fault.
///
/// # Example
///
/// ```rust
/// use procsim::{BooleanControl, Simulation};
///
/// let sim = Simulation::new();
/// let door = BooleanControl::new(false);
///
/// let d = door.clone();
/// sim.register(move |ctx| {
///     ctx.wait(&d, true);
///     assert_eq!(ctx.now().as_f64(), 3.0);
/// });
/// sim.register(move |ctx| {
///     ctx.advance(3.0);
///     door.store(true);
///     ctx.notify(&door);
/// });
///
/// sim.wait_until_done();
/// ```
#[derive(Debug, Clone)]
pub struct ProcessContext {
    sim: Simulation,
    id: ProcessId,
}

impl ProcessContext {
    pub(crate) fn new(sim: Simulation, id: ProcessId) -> Self {
        ProcessContext { sim, id }
    }

    /// This process's identity.
    #[inline]
    pub fn id(&self) -> ProcessId {
        self.id
    }

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.sim.now()
    }

    /// The simulation this process belongs to.
    #[inline]
    pub fn simulation(&self) -> &Simulation {
        &self.sim
    }

    fn ensure_active(&self, operation: &'static str) {
        match self.sim.active_process() {
            Some(active) if active == self.id => {}
            Some(active) => self.sim.abort(Fault::ForeignContext {
                operation,
                caller: self.id,
                active,
            }),
            None => self.sim.abort(Fault::NoActiveProcess { operation }),
        }
    }

    /// Suspend for `interval` units of virtual time.
    pub fn advance(&self, interval: f64) {
        self.ensure_active("advance");
        self.sim.advance(interval);
    }

    /// Block until `control` holds `desired`.
    pub fn wait(&self, control: &BooleanControl, desired: bool) {
        self.ensure_active("wait");
        self.sim.boolean_control_wait(control, desired);
    }

    /// Block until `control` holds `desired` or `timeout` units elapse.
    /// Returns whether the predicate held on resumption.
    pub fn wait_with_timeout(&self, control: &BooleanControl, desired: bool, timeout: f64) -> bool {
        self.ensure_active("wait_with_timeout");
        self.sim
            .boolean_control_wait_with_timeout(control, desired, timeout)
    }

    /// Trigger one waiter re-evaluation pass for `control`.
    pub fn notify(&self, control: &BooleanControl) {
        self.ensure_active("notify");
        self.sim.boolean_control_set(control);
    }

    /// Register a child process. It runs once this process suspends.
    pub fn register<F>(&self, body: F) -> ProcessId
    where
        F: FnOnce(&mut ProcessContext) + Send + 'static,
    {
        self.ensure_active("register");
        self.sim.register(body)
    }

    /// Interrupt a scheduled process.
    pub fn interrupt(&self, process: ProcessId) {
        self.ensure_active("interrupt");
        self.sim.interrupt(process);
    }

    /// Resume an interrupted process `shift` units after its interruption.
    pub fn resume(&self, process: ProcessId, shift: f64) -> VirtualTime {
        self.ensure_active("resume");
        self.sim.resume(process, shift)
    }
}
