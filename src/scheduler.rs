/// Process scheduler: the virtual clock, the four process collections,
/// and every state transition.
///
/// This module holds no threads. It is the bookkeeping half of the
/// control loop; `simulation.rs` owns the execution contexts and calls in
/// here with the lock held. Every method either completes a transition
/// or reports the violated invariant as a [`Fault`].
///
/// Ordering guarantees:
/// - runnable-now is FIFO by insertion; the active process sits at its
///   front until it suspends.
/// - scheduled is keyed by `(moving_time, insertion_seq)`, so
///   same-instant processes dispatch in insertion order.
/// - waiting-on-condition is scanned in registration (`ProcessId`) order.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crossbeam_channel::{Receiver, Sender};

use crate::control::BooleanControl;
use crate::error::Fault;
use crate::process::id::ProcessIdGen;
use crate::process::{DispatchRecord, ProcessId, ProcessState};
use crate::time::VirtualTime;

type ScheduleKey = (VirtualTime, u64);

// ── Process record ────────────────────────────────────────────────────

/// What a process is blocked on while in `WaitingCond`.
#[derive(Debug, Clone)]
pub(crate) struct ConditionWait {
    pub(crate) control: BooleanControl,
    pub(crate) desired: bool,
    /// Timeout process armed for this wait, if any.
    pub(crate) timeout: Option<ProcessId>,
}

impl ConditionWait {
    fn satisfied(&self) -> bool {
        self.control.get() == self.desired
    }
}

/// Scheduler-side view of one process.
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub(crate) name: String,
    pub(crate) priority: i32,
    pub(crate) state: ProcessState,
    pub(crate) moving_time: VirtualTime,
    interrupted_at: Option<VirtualTime>,
    wait: Option<ConditionWait>,
    schedule_key: Option<ScheduleKey>,
    /// Activation sender. Dropped on termination and at shutdown.
    signal: Option<Sender<()>>,
    wakeup: Receiver<()>,
}

impl ProcessRecord {
    fn new(
        name: String,
        priority: i32,
        at: VirtualTime,
        signal: Sender<()>,
        wakeup: Receiver<()>,
    ) -> Self {
        ProcessRecord {
            name,
            priority,
            state: ProcessState::Ready,
            moving_time: at,
            interrupted_at: None,
            wait: None,
            schedule_key: None,
            signal: Some(signal),
            wakeup,
        }
    }
}

// ── Stats ─────────────────────────────────────────────────────────────

/// A point-in-time summary of the scheduler's collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SchedulerStats {
    /// Current virtual time.
    pub now: VirtualTime,
    /// Processes in runnable-now, including the active one.
    pub runnable: usize,
    /// Processes waiting for their moving-time.
    pub scheduled: usize,
    /// Processes blocked on a boolean control.
    pub waiting: usize,
    /// Processes removed from the time line by `interrupt`.
    pub interrupted: usize,
    /// Processes whose bodies have returned.
    pub terminated: usize,
    /// Processes currently holding the activation token (0 or 1).
    pub active: usize,
    /// Total activations handed out so far.
    pub dispatches: u64,
}

// ── Scheduler ─────────────────────────────────────────────────────────

/// A process handed the token by [`Scheduler::dispatch_next`].
#[derive(Debug)]
pub(crate) struct Dispatch {
    pub(crate) process: ProcessId,
    pub(crate) time: VirtualTime,
    pub(crate) signal: Option<Sender<()>>,
}

/// Owns the clock, the process table, and the four collections.
#[derive(Debug)]
pub(crate) struct Scheduler {
    clock: VirtualTime,
    processes: BTreeMap<ProcessId, ProcessRecord>,
    runnable: VecDeque<ProcessId>,
    scheduled: BTreeMap<ScheduleKey, ProcessId>,
    waiting: BTreeSet<ProcessId>,
    interrupted: BTreeSet<ProcessId>,
    active: Option<ProcessId>,
    id_gen: ProcessIdGen,
    next_seq: u64,
    dispatches: u64,
    terminated: usize,
    trace: Option<Vec<DispatchRecord>>,
}

impl Scheduler {
    /// Create a scheduler at time zero whose top-level process already
    /// holds the token (it bypasses `Ready`).
    pub(crate) fn new(record_trace: bool, signal: Sender<()>, wakeup: Receiver<()>) -> Self {
        let top = ProcessId::TOP_LEVEL;
        let mut record = ProcessRecord::new("main".into(), 100, VirtualTime::ZERO, signal, wakeup);
        record.state = ProcessState::Active;

        let mut processes = BTreeMap::new();
        processes.insert(top, record);

        Scheduler {
            clock: VirtualTime::ZERO,
            processes,
            runnable: VecDeque::from([top]),
            scheduled: BTreeMap::new(),
            waiting: BTreeSet::new(),
            interrupted: BTreeSet::new(),
            active: Some(top),
            id_gen: ProcessIdGen::new(),
            next_seq: 0,
            dispatches: 0,
            terminated: 0,
            trace: record_trace.then(Vec::new),
        }
    }

    /// Current virtual time.
    #[inline]
    pub(crate) fn now(&self) -> VirtualTime {
        self.clock
    }

    /// The process holding the activation token, if any.
    #[inline]
    pub(crate) fn active(&self) -> Option<ProcessId> {
        self.active
    }

    pub(crate) fn record(&self, id: ProcessId) -> Result<&ProcessRecord, Fault> {
        self.processes.get(&id).ok_or(Fault::UnknownProcess(id))
    }

    fn record_mut(&mut self, id: ProcessId) -> Result<&mut ProcessRecord, Fault> {
        self.processes.get_mut(&id).ok_or(Fault::UnknownProcess(id))
    }

    fn transition(&mut self, id: ProcessId, next: ProcessState) -> Result<(), Fault> {
        let record = self.record_mut(id)?;
        debug_assert!(
            record.state.can_transition_to(next),
            "illegal transition for {}: {} -> {}",
            id,
            record.state,
            next
        );
        record.state = next;
        Ok(())
    }

    fn wakeup_of(&self, id: ProcessId) -> Result<Receiver<()>, Fault> {
        Ok(self.record(id)?.wakeup.clone())
    }

    fn unlink_runnable(&mut self, id: ProcessId) {
        if let Some(pos) = self.runnable.iter().position(|p| *p == id) {
            self.runnable.remove(pos);
        }
    }

    fn enqueue_scheduled(&mut self, id: ProcessId, at: VirtualTime) -> Result<(), Fault> {
        let key = (at, self.next_seq);
        self.next_seq += 1;
        let record = self.record_mut(id)?;
        record.moving_time = at;
        record.schedule_key = Some(key);
        self.scheduled.insert(key, id);
        Ok(())
    }

    /// The active process, or the fault naming `operation`.
    pub(crate) fn require_active(&self, operation: &'static str) -> Result<ProcessId, Fault> {
        self.active.ok_or(Fault::NoActiveProcess { operation })
    }

    // ── Registration / termination ────────────────────────────────

    /// Register a new process: next identity, `Ready`, back of runnable-now.
    pub(crate) fn admit(
        &mut self,
        name: Option<String>,
        priority: i32,
        signal: Sender<()>,
        wakeup: Receiver<()>,
    ) -> ProcessId {
        let id = self.id_gen.next_id();
        let name = name.unwrap_or_else(|| format!("process-{}", id.raw()));
        self.processes
            .insert(id, ProcessRecord::new(name, priority, self.clock, signal, wakeup));
        self.runnable.push_back(id);
        id
    }

    /// Body of `id` returned. `id` must hold the token.
    pub(crate) fn terminate(&mut self, id: ProcessId) -> Result<(), Fault> {
        let active = self.require_active("terminate")?;
        if active != id {
            return Err(Fault::ForeignContext {
                operation: "terminate",
                caller: id,
                active,
            });
        }
        self.retire(id)
    }

    /// The top-level process leaves the run so the loop can drain it.
    pub(crate) fn retire_top_level(&mut self) -> Result<(), Fault> {
        let active = self.require_active("wait_until_done")?;
        if !active.is_top_level() {
            return Err(Fault::NotTopLevel { caller: active });
        }
        self.retire(active)
    }

    fn retire(&mut self, id: ProcessId) -> Result<(), Fault> {
        self.unlink_runnable(id);
        self.transition(id, ProcessState::Terminated)?;
        let record = self.record_mut(id)?;
        record.wait = None;
        record.signal = None;
        self.active = None;
        self.terminated += 1;
        Ok(())
    }

    // ── Suspension requests from the active process ───────────────

    /// `Active -> Scheduled` at `now + interval`.
    pub(crate) fn suspend_for(&mut self, interval: f64) -> Result<(ProcessId, Receiver<()>), Fault> {
        let id = self.require_active("advance")?;
        let at = self.clock.advance(interval).ok_or(Fault::InvalidInterval {
            operation: "advance",
            interval,
        })?;
        self.unlink_runnable(id);
        self.transition(id, ProcessState::Scheduled)?;
        self.enqueue_scheduled(id, at)?;
        self.active = None;
        Ok((id, self.wakeup_of(id)?))
    }

    /// `Active -> WaitingCond` on `control == desired`.
    pub(crate) fn enter_wait(
        &mut self,
        control: &BooleanControl,
        desired: bool,
        timeout: Option<ProcessId>,
    ) -> Result<(ProcessId, Receiver<()>), Fault> {
        let id = self.require_active("boolean_control_wait")?;
        self.unlink_runnable(id);
        self.transition(id, ProcessState::WaitingCond)?;
        self.record_mut(id)?.wait = Some(ConditionWait {
            control: control.clone(),
            desired,
            timeout,
        });
        self.waiting.insert(id);
        self.active = None;
        Ok((id, self.wakeup_of(id)?))
    }

    /// The active process keeps its place in runnable-now while the loop
    /// runs one condition check.
    pub(crate) fn hold_for_notify(&self) -> Result<(ProcessId, Receiver<()>), Fault> {
        let id = self.require_active("boolean_control_set")?;
        Ok((id, self.wakeup_of(id)?))
    }

    // ── Interrupt / resume ────────────────────────────────────────

    /// `Scheduled -> Interrupted`, remembering the interruption time.
    pub(crate) fn interrupt(&mut self, id: ProcessId) -> Result<(), Fault> {
        let record = self.record(id)?;
        if record.state != ProcessState::Scheduled {
            return Err(Fault::InterruptNotScheduled {
                process: id,
                state: record.state,
            });
        }
        if let Some(key) = record.schedule_key {
            self.scheduled.remove(&key);
        }
        let now = self.clock;
        let record = self.record_mut(id)?;
        record.schedule_key = None;
        record.interrupted_at = Some(now);
        self.transition(id, ProcessState::Interrupted)?;
        self.interrupted.insert(id);
        Ok(())
    }

    /// `Interrupted -> Scheduled` at interruption time + `shift`.
    pub(crate) fn resume(&mut self, id: ProcessId, shift: f64) -> Result<VirtualTime, Fault> {
        let record = self.record(id)?;
        if record.state != ProcessState::Interrupted {
            return Err(Fault::ResumeNotInterrupted {
                process: id,
                state: record.state,
            });
        }
        let base = record.interrupted_at.unwrap_or(self.clock);
        let at = base.shifted(shift).ok_or(Fault::InvalidInterval {
            operation: "resume",
            interval: shift,
        })?;
        self.interrupted.remove(&id);
        self.record_mut(id)?.interrupted_at = None;
        self.transition(id, ProcessState::Scheduled)?;
        self.enqueue_scheduled(id, at)?;
        Ok(at)
    }

    // ── Condition handling ────────────────────────────────────────

    fn make_ready(&mut self, id: ProcessId) -> Result<(), Fault> {
        self.waiting.remove(&id);
        self.transition(id, ProcessState::Ready)?;
        self.record_mut(id)?.wait = None;
        self.runnable.push_back(id);
        Ok(())
    }

    /// Release the first waiter (by registration order) whose predicate
    /// holds. At most one per call.
    pub(crate) fn release_one_waiter(&mut self) -> Result<Option<ProcessId>, Fault> {
        let released = self.waiting.iter().copied().find(|id| {
            self.processes
                .get(id)
                .and_then(|r| r.wait.as_ref())
                .is_some_and(ConditionWait::satisfied)
        });
        if let Some(id) = released {
            self.make_ready(id)?;
        }
        Ok(released)
    }

    /// Force `waiter` back to `Ready` if it is still blocked on the wait
    /// that armed `timer`. Returns whether it was released.
    pub(crate) fn expire_wait(&mut self, waiter: ProcessId, timer: ProcessId) -> Result<bool, Fault> {
        let record = self.record(waiter)?;
        let armed = record.state == ProcessState::WaitingCond
            && record.wait.as_ref().and_then(|w| w.timeout) == Some(timer);
        if armed {
            self.make_ready(waiter)?;
        }
        Ok(armed)
    }

    // ── Selection / dispatch ──────────────────────────────────────

    fn pop_scheduled(&mut self) -> Result<Option<ProcessId>, Fault> {
        let Some((key, id)) = self.scheduled.first_key_value().map(|(k, v)| (*k, *v)) else {
            return Ok(None);
        };
        let (at, _) = key;
        if at.is_before(self.clock) {
            return Err(Fault::TimeWentBackward {
                now: self.clock,
                requested: at,
            });
        }
        self.scheduled.remove(&key);
        self.clock = at;
        self.record_mut(id)?.schedule_key = None;
        self.runnable.push_back(id);
        Ok(Some(id))
    }

    /// Choose the next process and hand it the token.
    ///
    /// Returns `None` when both runnable-now and scheduled are empty:
    /// the simulation is over.
    pub(crate) fn dispatch_next(&mut self) -> Result<Option<Dispatch>, Fault> {
        let id = match self.runnable.front() {
            Some(&id) => id,
            None => match self.pop_scheduled()? {
                Some(id) => id,
                None => return Ok(None),
            },
        };

        self.transition(id, ProcessState::Active)?;
        let record = self.record_mut(id)?;
        record.wait = None;
        let signal = record.signal.clone();
        self.active = Some(id);

        // Only runnable-now entries can hold the token.
        debug_assert!(
            self.runnable
                .iter()
                .filter(|p| self.processes.get(p).map(|r| r.state) == Some(ProcessState::Active))
                .count()
                == 1,
            "more than one process holds the activation token"
        );

        let seq = self.dispatches;
        self.dispatches += 1;
        if let Some(trace) = self.trace.as_mut() {
            trace.push(DispatchRecord {
                seq,
                time: self.clock,
                process: id,
            });
        }

        Ok(Some(Dispatch {
            process: id,
            time: self.clock,
            signal,
        }))
    }

    /// Drop every activation sender so blocked contexts observe a
    /// disconnected channel.
    pub(crate) fn shutdown(&mut self) {
        self.active = None;
        for record in self.processes.values_mut().filter(|r| r.state.is_live()) {
            record.signal = None;
        }
    }

    // ── Inspection ────────────────────────────────────────────────

    pub(crate) fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            now: self.clock,
            runnable: self.runnable.len(),
            scheduled: self.scheduled.len(),
            waiting: self.waiting.len(),
            interrupted: self.interrupted.len(),
            terminated: self.terminated,
            active: usize::from(self.active.is_some()),
            dispatches: self.dispatches,
        }
    }

    pub(crate) fn trace(&self) -> Vec<DispatchRecord> {
        self.trace.clone().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn scheduler() -> Scheduler {
        let (tx, rx) = unbounded();
        Scheduler::new(true, tx, rx)
    }

    fn admit(s: &mut Scheduler) -> ProcessId {
        let (tx, rx) = unbounded();
        s.admit(None, 0, tx, rx)
    }

    fn dispatched(s: &mut Scheduler) -> Option<ProcessId> {
        s.dispatch_next().unwrap().map(|d| d.process)
    }

    fn state(s: &Scheduler, id: ProcessId) -> ProcessState {
        s.record(id).unwrap().state
    }

    #[test]
    fn test_top_level_starts_active() {
        let s = scheduler();
        assert_eq!(s.active(), Some(ProcessId::TOP_LEVEL));
        assert_eq!(state(&s, ProcessId::TOP_LEVEL), ProcessState::Active);
        let stats = s.stats();
        assert_eq!(stats.runnable, 1);
        assert_eq!(stats.active, 1);
    }

    #[test]
    fn test_admit_is_fifo() {
        let mut s = scheduler();
        let a = admit(&mut s);
        let b = admit(&mut s);
        assert_eq!(state(&s, a), ProcessState::Ready);
        s.retire_top_level().unwrap();

        assert_eq!(dispatched(&mut s), Some(a));
        s.terminate(a).unwrap();
        assert_eq!(dispatched(&mut s), Some(b));
        s.terminate(b).unwrap();
        assert_eq!(dispatched(&mut s), None);
        assert_eq!(s.stats().terminated, 3);
    }

    #[test]
    fn test_advance_moves_clock_to_earliest() {
        let mut s = scheduler();
        let a = admit(&mut s);
        let b = admit(&mut s);
        s.retire_top_level().unwrap();

        assert_eq!(dispatched(&mut s), Some(a));
        s.suspend_for(30.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(b));
        s.suspend_for(10.0).unwrap();
        assert_eq!(state(&s, b), ProcessState::Scheduled);

        assert_eq!(dispatched(&mut s), Some(b));
        assert_eq!(s.now(), VirtualTime::new(10.0));
        s.terminate(b).unwrap();
        assert_eq!(dispatched(&mut s), Some(a));
        assert_eq!(s.now(), VirtualTime::new(30.0));
    }

    #[test]
    fn test_same_instant_dispatches_in_insertion_order() {
        let mut s = scheduler();
        let ids: Vec<_> = (0..3).map(|_| admit(&mut s)).collect();
        s.retire_top_level().unwrap();
        for id in &ids {
            assert_eq!(dispatched(&mut s), Some(*id));
            s.suspend_for(5.0).unwrap();
        }
        for id in &ids {
            assert_eq!(dispatched(&mut s), Some(*id));
            s.terminate(*id).unwrap();
        }
    }

    #[test]
    fn test_negative_interval_rejected() {
        let mut s = scheduler();
        let err = s.suspend_for(-1.0).unwrap_err();
        assert!(matches!(err, Fault::InvalidInterval { operation: "advance", .. }));
        assert_eq!(s.active(), Some(ProcessId::TOP_LEVEL));
    }

    #[test]
    fn test_release_one_waiter_per_call() {
        let mut s = scheduler();
        let flag = BooleanControl::new(false);
        let a = admit(&mut s);
        let b = admit(&mut s);
        s.retire_top_level().unwrap();
        for id in [a, b] {
            assert_eq!(dispatched(&mut s), Some(id));
            s.enter_wait(&flag, true, None).unwrap();
        }
        assert_eq!(s.release_one_waiter().unwrap(), None);

        flag.store(true);
        assert_eq!(s.release_one_waiter().unwrap(), Some(a));
        assert_eq!(state(&s, a), ProcessState::Ready);
        assert_eq!(state(&s, b), ProcessState::WaitingCond);
        assert_eq!(s.release_one_waiter().unwrap(), Some(b));
        assert_eq!(s.release_one_waiter().unwrap(), None);
    }

    #[test]
    fn test_expire_wait_only_for_matching_timer() {
        let mut s = scheduler();
        let flag = BooleanControl::new(false);
        let waiter = admit(&mut s);
        let timer = admit(&mut s);
        s.retire_top_level().unwrap();

        assert_eq!(dispatched(&mut s), Some(waiter));
        s.enter_wait(&flag, true, Some(timer)).unwrap();
        assert!(!s.expire_wait(waiter, ProcessId::new(99)).unwrap());
        assert!(s.expire_wait(waiter, timer).unwrap());
        assert_eq!(state(&s, waiter), ProcessState::Ready);
        assert!(!s.expire_wait(waiter, timer).unwrap());
    }

    #[test]
    fn test_interrupt_and_resume_shift_from_interruption_time() {
        let mut s = scheduler();
        let sleeper = admit(&mut s);
        s.retire_top_level().unwrap();
        let waker = admit(&mut s);

        assert_eq!(dispatched(&mut s), Some(sleeper));
        s.suspend_for(10.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(waker));
        s.suspend_for(2.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(waker));
        assert_eq!(s.now(), VirtualTime::new(2.0));

        s.interrupt(sleeper).unwrap();
        assert_eq!(state(&s, sleeper), ProcessState::Interrupted);
        assert_eq!(s.stats().scheduled, 0);
        assert_eq!(s.stats().interrupted, 1);

        let at = s.resume(sleeper, 4.0).unwrap();
        assert_eq!(at, VirtualTime::new(6.0));
        assert_eq!(state(&s, sleeper), ProcessState::Scheduled);
        s.terminate(waker).unwrap();
        assert_eq!(dispatched(&mut s), Some(sleeper));
        assert_eq!(s.now(), VirtualTime::new(6.0));
    }

    #[test]
    fn test_interrupt_requires_scheduled() {
        let mut s = scheduler();
        let p = admit(&mut s);
        let err = s.interrupt(p).unwrap_err();
        assert_eq!(
            err,
            Fault::InterruptNotScheduled {
                process: p,
                state: ProcessState::Ready
            }
        );
    }

    #[test]
    fn test_resume_requires_interrupted() {
        let mut s = scheduler();
        let p = admit(&mut s);
        assert!(matches!(
            s.resume(p, 1.0),
            Err(Fault::ResumeNotInterrupted { .. })
        ));
    }

    #[test]
    fn test_backward_resume_detected_at_selection() {
        let mut s = scheduler();
        let p = admit(&mut s);
        s.retire_top_level().unwrap();
        let q = admit(&mut s);

        assert_eq!(dispatched(&mut s), Some(p));
        s.suspend_for(10.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(q));
        s.suspend_for(5.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(q));
        s.interrupt(p).unwrap();
        s.resume(p, -3.0).unwrap();
        s.terminate(q).unwrap();

        let err = s.dispatch_next().unwrap_err();
        assert!(matches!(err, Fault::TimeWentBackward { .. }));
    }

    #[test]
    fn test_wait_until_done_only_for_top_level() {
        let mut s = scheduler();
        let p = admit(&mut s);
        s.retire_top_level().unwrap();
        assert_eq!(dispatched(&mut s), Some(p));
        assert_eq!(
            s.retire_top_level().unwrap_err(),
            Fault::NotTopLevel { caller: p }
        );
    }

    #[test]
    fn test_no_active_after_suspension() {
        let mut s = scheduler();
        s.suspend_for(1.0).unwrap();
        assert_eq!(s.active(), None);
        assert!(matches!(
            s.hold_for_notify(),
            Err(Fault::NoActiveProcess { .. })
        ));
    }

    #[test]
    fn test_shutdown_disconnects_live_processes() {
        let mut s = scheduler();
        let (tx, parked) = unbounded();
        let p = s.admit(None, 0, tx, parked.clone());
        s.retire_top_level().unwrap();
        assert_eq!(dispatched(&mut s), Some(p));
        assert_eq!(s.stats().active, 1);
        s.suspend_for(4.0).unwrap();
        assert_eq!(s.stats().active, 0);

        s.shutdown();
        assert!(parked.recv().is_err());
        assert_eq!(s.stats().active, 0);
    }

    #[test]
    fn test_trace_records_each_dispatch() {
        let mut s = scheduler();
        let p = admit(&mut s);
        s.retire_top_level().unwrap();
        assert_eq!(dispatched(&mut s), Some(p));
        s.suspend_for(3.0).unwrap();
        assert_eq!(dispatched(&mut s), Some(p));

        let trace = s.trace();
        assert_eq!(trace.len(), 2);
        assert_eq!(trace[0].time, VirtualTime::ZERO);
        assert_eq!(trace[1].time, VirtualTime::new(3.0));
        assert_eq!(trace[1].seq, 1);
        assert_eq!(s.stats().dispatches, 2);
    }
}
