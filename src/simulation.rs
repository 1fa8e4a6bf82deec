/// Simulation context and control loop.
///
/// A `Simulation` is a cheap, cloneable handle to one independent run:
/// its scheduler, its control-loop thread, and one thread per registered
/// process. Only the process holding the activation token executes; all
/// other contexts are parked on their private channel.
///
/// Hand-off protocol:
/// 1. The active process records its suspension in the scheduler (under
///    the lock), then sends `Wake` to the control loop and blocks on its
///    own receiver.
/// 2. The control loop releases at most one condition waiter, selects the
///    next process, and sends on that process's channel.
///
/// The lock is never held across a blocking receive.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use tracing::{debug, error, trace};

use crate::config::SimulationConfig;
use crate::control::BooleanControl;
use crate::error::Fault;
use crate::process::{DispatchRecord, ProcessContext, ProcessId, ProcessState};
use crate::scheduler::{Scheduler, SchedulerStats};
use crate::time::VirtualTime;

// ── Internals ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlSignal {
    Wake,
    Halt,
}

/// Unwind payload for contexts released at shutdown.
struct Abandoned;

struct Shared {
    config: SimulationConfig,
    scheduler: Mutex<Scheduler>,
    control_tx: Sender<ControlSignal>,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
    running: AtomicBool,
    fault: Mutex<Option<Fault>>,
    contexts: Mutex<Vec<JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

// ── Simulation ────────────────────────────────────────────────────────

/// Handle to one simulation run.
///
/// The thread that creates the simulation is the top-level process
/// (`P0`) and holds the activation token from the start. It registers
/// processes, may itself `advance` or wait, and finally calls
/// [`wait_until_done`](Self::wait_until_done) to drive the run to
/// completion.
///
/// Operations that suspend (`advance`, waits, `boolean_control_set`)
/// act on behalf of whichever process currently holds the token.
/// Process bodies should prefer the identity-checked forwarding methods
/// on [`ProcessContext`].
///
/// The handle returned by [`new`](Self::new) owns the run. Clones share
/// the same run but do not own it. Dropping the owning handle before the
/// run finishes halts it and releases every parked context.
pub struct Simulation {
    shared: Arc<Shared>,
    owner: bool,
}

impl Simulation {
    /// Start a simulation with the default configuration.
    pub fn new() -> Self {
        Self::with_config(SimulationConfig::default())
    }

    /// Start a simulation: clock at zero, top-level process active,
    /// control loop parked waiting for the first hand-off.
    pub fn with_config(config: SimulationConfig) -> Self {
        let (top_tx, top_rx) = unbounded();
        let (control_tx, control_rx) = unbounded();
        let (done_tx, done_rx) = bounded(1);

        let sim = Simulation {
            owner: true,
            shared: Arc::new(Shared {
                scheduler: Mutex::new(Scheduler::new(config.record_trace, top_tx, top_rx)),
                config,
                control_tx,
                done_tx,
                done_rx,
                running: AtomicBool::new(true),
                fault: Mutex::new(None),
                contexts: Mutex::new(Vec::new()),
            }),
        };

        let looper = sim.clone();
        let spawned = thread::Builder::new()
            .name("procsim-control".into())
            .spawn(move || looper.control_loop(control_rx));
        match spawned {
            Ok(handle) => lock(&sim.shared.contexts).push(handle),
            Err(e) => sim.abort(Fault::SpawnFailed {
                process: ProcessId::TOP_LEVEL,
                reason: e.to_string(),
            }),
        }
        if sim.verbose() {
            debug!("simulation started");
        }
        sim
    }

    fn scheduler(&self) -> MutexGuard<'_, Scheduler> {
        lock(&self.shared.scheduler)
    }

    fn verbose(&self) -> bool {
        self.config().verbose
    }

    /// Run `op` under the lock; abort on fault. The guard is released
    /// before aborting.
    fn with_scheduler<T>(&self, op: impl FnOnce(&mut Scheduler) -> Result<T, Fault>) -> T {
        let result = {
            let mut sched = self.scheduler();
            op(&mut *sched)
        };
        result.unwrap_or_else(|fault| self.abort(fault))
    }

    fn wake_loop(&self) {
        let _ = self.shared.control_tx.send(ControlSignal::Wake);
    }

    // ── Fault handling ────────────────────────────────────────────

    fn record_fault(&self, fault: Fault) {
        let mut slot = lock(&self.shared.fault);
        if slot.is_none() {
            *slot = Some(fault);
        }
    }

    /// The fault that aborted this run, if any.
    pub fn fault(&self) -> Option<Fault> {
        lock(&self.shared.fault).clone()
    }

    /// Stop the control loop and release every parked context.
    fn halt(&self) {
        let _ = self.shared.control_tx.send(ControlSignal::Halt);
        self.finish();
    }

    /// Record `fault`, halt the run, and panic with its diagnostic.
    pub(crate) fn abort(&self, fault: Fault) -> ! {
        error!(%fault, "simulation aborted");
        self.record_fault(fault.clone());
        self.halt();
        panic!("{fault}");
    }

    fn finish(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            let now = {
                let mut sched = self.scheduler();
                sched.shutdown();
                sched.now()
            };
            let _ = self.shared.done_tx.try_send(());
            if self.verbose() {
                debug!(%now, "simulation finished");
            }
        }
    }

    /// Park the calling context until it is dispatched again.
    fn block_on(&self, id: ProcessId, wakeup: Receiver<()>) {
        if wakeup.recv().is_ok() {
            return;
        }
        if id.is_top_level() {
            let fault = self.fault().unwrap_or(Fault::Stranded { process: id });
            panic!("simulation aborted: {fault}");
        }
        panic::resume_unwind(Box::new(Abandoned));
    }

    // ── Control loop ──────────────────────────────────────────────

    fn control_loop(&self, control_rx: Receiver<ControlSignal>) {
        while let Ok(ControlSignal::Wake) = control_rx.recv() {
            let step = {
                let mut sched = self.scheduler();
                sched.release_one_waiter().and_then(|released| {
                    if let Some(id) = released {
                        trace!(process = %id, "condition satisfied");
                    }
                    sched.dispatch_next()
                })
            };
            match step {
                Ok(Some(dispatch)) => {
                    if self.verbose() {
                        debug!(process = %dispatch.process, time = %dispatch.time, "dispatch");
                    }
                    match dispatch.signal {
                        Some(signal) => {
                            let _ = signal.send(());
                        }
                        None => break,
                    }
                }
                Ok(None) => break,
                Err(fault) => {
                    error!(%fault, "simulation aborted");
                    self.record_fault(fault);
                    break;
                }
            }
        }
        self.finish();
    }

    // ── Lifecycle ─────────────────────────────────────────────────

    /// Register a process. It is `Ready` immediately and first runs once
    /// the active process suspends and everything ahead of it in
    /// runnable-now has run.
    pub fn register<F>(&self, body: F) -> ProcessId
    where
        F: FnOnce(&mut ProcessContext) + Send + 'static,
    {
        self.spawn_process(None, 0, body)
    }

    /// Register a process with a diagnostic name and an informational
    /// priority.
    pub fn register_named<F>(&self, name: impl Into<String>, priority: i32, body: F) -> ProcessId
    where
        F: FnOnce(&mut ProcessContext) + Send + 'static,
    {
        self.spawn_process(Some(name.into()), priority, body)
    }

    fn spawn_process<F>(&self, name: Option<String>, priority: i32, body: F) -> ProcessId
    where
        F: FnOnce(&mut ProcessContext) + Send + 'static,
    {
        if !self.is_running() {
            self.abort(Fault::SimulationFinished);
        }
        let (signal, wakeup) = unbounded();
        let id = self
            .scheduler()
            .admit(name, priority, signal, wakeup.clone());

        let sim = self.clone();
        let spawned = thread::Builder::new()
            .name(format!("procsim-{id}"))
            .spawn(move || sim.run_process(id, wakeup, body));
        match spawned {
            Ok(handle) => lock(&self.shared.contexts).push(handle),
            Err(e) => self.abort(Fault::SpawnFailed {
                process: id,
                reason: e.to_string(),
            }),
        }
        trace!(process = %id, "registered");
        id
    }

    fn run_process<F>(self, id: ProcessId, wakeup: Receiver<()>, body: F)
    where
        F: FnOnce(&mut ProcessContext),
    {
        if wakeup.recv().is_err() {
            return;
        }
        let ctx_sim = self.clone();
        let outcome = panic::catch_unwind(AssertUnwindSafe(move || {
            let mut ctx = ProcessContext::new(ctx_sim, id);
            body(&mut ctx);
        }));

        match outcome {
            Ok(()) => {
                self.with_scheduler(|s| s.terminate(id));
                trace!(process = %id, "terminated");
                self.wake_loop();
            }
            Err(payload) => {
                if payload.is::<Abandoned>() {
                    return;
                }
                if self.fault().is_none() {
                    let fault = Fault::ProcessPanicked {
                        process: id,
                        message: panic_message(payload.as_ref()),
                    };
                    error!(%fault, "simulation aborted");
                    self.record_fault(fault);
                }
                self.halt();
            }
        }
    }

    /// Drive the run to completion. Top-level process only.
    ///
    /// Retires the top-level process, hands the token to the control
    /// loop, and blocks until both runnable-now and scheduled are empty.
    /// Every execution context is joined before returning.
    ///
    /// # Panics
    /// Panics if called by any other process, or if the run was aborted
    /// by a fault (the panic carries the fault's diagnostic).
    pub fn wait_until_done(&self) {
        self.with_scheduler(|s| s.retire_top_level());
        self.wake_loop();

        let poll = self.config().poll_interval();
        loop {
            match self.shared.done_rx.recv_timeout(poll) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    if !self.is_running() {
                        break;
                    }
                    if self.verbose() {
                        let stats = self.stats();
                        debug!(
                            runnable = stats.runnable,
                            scheduled = stats.scheduled,
                            waiting = stats.waiting,
                            "waiting"
                        );
                    }
                }
            }
        }

        let contexts = std::mem::take(&mut *lock(&self.shared.contexts));
        for handle in contexts {
            let _ = handle.join();
        }

        if let Some(fault) = self.fault() {
            panic!("simulation aborted: {fault}");
        }
    }

    // ── Operations on behalf of the active process ────────────────

    /// Suspend the active process for `interval` units of virtual time.
    ///
    /// # Panics
    /// Faults on a negative or non-finite interval, or if no process is
    /// active.
    pub fn advance(&self, interval: f64) {
        let (id, wakeup) = self.with_scheduler(|s| s.suspend_for(interval));
        trace!(process = %id, interval, "advance");
        self.wake_loop();
        self.block_on(id, wakeup);
    }

    /// Remove a scheduled process from the time line.
    ///
    /// # Panics
    /// Faults if `process` is not `Scheduled`.
    pub fn interrupt(&self, process: ProcessId) {
        self.with_scheduler(|s| s.interrupt(process));
        trace!(%process, "interrupted");
    }

    /// Put an interrupted process back on the time line at its
    /// interruption time plus `shift`. Returns the new moving-time.
    ///
    /// # Panics
    /// Faults if `process` is not `Interrupted`.
    pub fn resume(&self, process: ProcessId, shift: f64) -> VirtualTime {
        let at = self.with_scheduler(|s| s.resume(process, shift));
        trace!(%process, %at, "resumed");
        at
    }

    /// Block the active process until `control` equals `desired`.
    pub fn boolean_control_wait(&self, control: &BooleanControl, desired: bool) {
        let (id, wakeup) = self.with_scheduler(|s| s.enter_wait(control, desired, None));
        trace!(process = %id, desired, "waiting on control");
        self.wake_loop();
        self.block_on(id, wakeup);
    }

    /// Block the active process until `control` equals `desired` or
    /// `timeout` units elapse. Returns whether the predicate held on
    /// resumption.
    ///
    /// Arms an auxiliary timeout process that advances `timeout` and then
    /// forces the waiter back to `Ready` if it is still blocked on this
    /// wait. The timeout process runs to its deadline even when the
    /// predicate releases the waiter first.
    pub fn boolean_control_wait_with_timeout(
        &self,
        control: &BooleanControl,
        desired: bool,
        timeout: f64,
    ) -> bool {
        if !timeout.is_finite() || timeout < 0.0 {
            self.abort(Fault::InvalidInterval {
                operation: "wait_with_timeout",
                interval: timeout,
            });
        }
        let waiter = self.with_scheduler(|s| s.require_active("wait_with_timeout"));
        let timer = self.spawn_process(Some(format!("timeout-{waiter}")), 0, move |ctx| {
            ctx.advance(timeout);
            let timer = ctx.id();
            if ctx.simulation().with_scheduler(|s| s.expire_wait(waiter, timer)) {
                trace!(process = %waiter, %timer, "wait timed out");
            }
        });

        let (id, wakeup) = self.with_scheduler(|s| s.enter_wait(control, desired, Some(timer)));
        trace!(process = %id, desired, timeout, "waiting on control with timeout");
        self.wake_loop();
        self.block_on(id, wakeup);
        control.get() == desired
    }

    /// Run one waiter re-evaluation pass and re-dispatch the caller.
    ///
    /// Does not change `control`'s value. Releases at most one waiter.
    pub fn boolean_control_set(&self, control: &BooleanControl) {
        let (id, wakeup) = self.with_scheduler(|s| s.hold_for_notify());
        trace!(process = %id, value = control.get(), "notify");
        self.wake_loop();
        self.block_on(id, wakeup);
    }

    // ── Inspection ────────────────────────────────────────────────

    /// Current virtual time.
    pub fn now(&self) -> VirtualTime {
        self.scheduler().now()
    }

    /// `true` until the control loop finds nothing left to run.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// The process holding the activation token.
    pub fn active_process(&self) -> Option<ProcessId> {
        self.scheduler().active()
    }

    /// State of `process`, or `None` if it was never registered.
    pub fn process_state(&self, process: ProcessId) -> Option<ProcessState> {
        self.scheduler().record(process).ok().map(|r| r.state)
    }

    /// Virtual time at which `process` becomes (or became) eligible.
    pub fn moving_time(&self, process: ProcessId) -> Option<VirtualTime> {
        self.scheduler().record(process).ok().map(|r| r.moving_time)
    }

    /// Informational priority of `process`.
    pub fn process_priority(&self, process: ProcessId) -> Option<i32> {
        self.scheduler().record(process).ok().map(|r| r.priority)
    }

    /// Diagnostic name of `process`.
    pub fn process_name(&self, process: ProcessId) -> Option<String> {
        self.scheduler().record(process).ok().map(|r| r.name.clone())
    }

    /// Snapshot of the scheduler's collections.
    pub fn stats(&self) -> SchedulerStats {
        self.scheduler().stats()
    }

    /// Every dispatch so far, if tracing is enabled in the configuration.
    pub fn trace(&self) -> Vec<DispatchRecord> {
        self.scheduler().trace()
    }

    /// The configuration this run was started with.
    pub fn config(&self) -> &SimulationConfig {
        &self.shared.config
    }
}

impl Clone for Simulation {
    fn clone(&self) -> Self {
        Simulation {
            shared: Arc::clone(&self.shared),
            owner: false,
        }
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        if self.owner && self.is_running() {
            debug!(now = %self.now(), "simulation dropped before completion; halting");
            self.halt();
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Simulation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Simulation")
            .field("now", &self.now())
            .field("running", &self.is_running())
            .field("active", &self.active_process())
            .finish()
    }
}
