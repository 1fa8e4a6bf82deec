//! Boolean controls — shared predicate flags processes can block on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::simulation::Simulation;

/// A shared boolean that processes wait on until it holds a desired value.
///
/// Cloning yields another handle to the same flag. Waiters are tracked by
/// the scheduler, not by the control itself, and are re-evaluated by the
/// control loop on every wake-up: at most one waiter is released per
/// wake-up, in registration order.
///
/// Changing the value with [`store`](Self::store) does not notify anyone.
/// Call [`set`](Self::set) afterwards (or use [`assign`](Self::assign)) to
/// trigger a re-evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct BooleanControl {
    value: Arc<AtomicBool>,
}

impl BooleanControl {
    /// Create a control holding `initial`.
    pub fn new(initial: bool) -> Self {
        BooleanControl {
            value: Arc::new(AtomicBool::new(initial)),
        }
    }

    /// Current value.
    #[inline]
    pub fn get(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }

    /// Overwrite the value without waking the control loop.
    #[inline]
    pub fn store(&self, value: bool) {
        self.value.store(value, Ordering::Release);
    }

    /// Block the active process until the value equals `desired`.
    ///
    /// Returns immediately after one control-loop pass if the value
    /// already matches.
    pub fn wait(&self, sim: &Simulation, desired: bool) {
        sim.boolean_control_wait(self, desired);
    }

    /// Like [`wait`](Self::wait), but give up after `timeout` units of
    /// virtual time.
    ///
    /// Returns `true` if the value equals `desired` when the process
    /// resumes, `false` if it resumed because the timeout fired first.
    pub fn wait_with_timeout(&self, sim: &Simulation, desired: bool, timeout: f64) -> bool {
        sim.boolean_control_wait_with_timeout(self, desired, timeout)
    }

    /// Ask the control loop to re-evaluate waiters once.
    ///
    /// Releases at most one waiter; it is not a broadcast. The caller is
    /// re-dispatched first and the released waiter runs once the caller
    /// next suspends.
    pub fn set(&self, sim: &Simulation) {
        sim.boolean_control_set(self);
    }

    /// `store(value)` followed by `set(sim)`.
    pub fn assign(&self, sim: &Simulation, value: bool) {
        self.store(value);
        self.set(sim);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_and_get() {
        let c = BooleanControl::new(false);
        assert!(!c.get());
        c.store(true);
        assert!(c.get());
    }

    #[test]
    fn test_clones_share_value() {
        let a = BooleanControl::new(false);
        let b = a.clone();
        b.store(true);
        assert!(a.get());
        assert!(!BooleanControl::new(false).get());
    }

    #[test]
    fn test_default_is_false() {
        assert!(!BooleanControl::default().get());
    }
}
