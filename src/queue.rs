/// FIFO/LIFO waiting lines with latency bookkeeping.
///
/// A queue stamps each entity with the virtual time it entered and, on
/// removal, adds the time it spent waiting to a running total. Queues
/// are plain data: the scheduler never owns them. Share one between
/// processes with `Arc<Mutex<Queue<T>>>`.

use std::collections::VecDeque;

use crate::error::{DesError, DesResult};
use crate::simulation::Simulation;
use crate::time::VirtualTime;

/// Which end `get` removes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum Discipline {
    /// First in, first out.
    Fifo,
    /// Last in, first out.
    Lifo,
}

/// A waiting line of `T` with enqueue-time bookkeeping.
#[derive(Debug, Clone)]
pub struct Queue<T> {
    id: String,
    discipline: Discipline,
    entries: VecDeque<(T, VirtualTime)>,
    total_wait: f64,
    removed: u64,
}

impl<T> Queue<T> {
    /// Create an empty queue.
    pub fn new(id: impl Into<String>, discipline: Discipline) -> Self {
        Queue {
            id: id.into(),
            discipline,
            entries: VecDeque::new(),
            total_wait: 0.0,
            removed: 0,
        }
    }

    /// Create an empty FIFO queue.
    pub fn fifo(id: impl Into<String>) -> Self {
        Self::new(id, Discipline::Fifo)
    }

    /// Create an empty LIFO queue.
    pub fn lifo(id: impl Into<String>) -> Self {
        Self::new(id, Discipline::Lifo)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Append `entity`, stamped with the simulation's current time.
    pub fn place(&mut self, sim: &Simulation, entity: T) {
        self.place_at(sim.now(), entity);
    }

    /// Append `entity`, stamped with `now`.
    pub fn place_at(&mut self, now: VirtualTime, entity: T) {
        self.entries.push_back((entity, now));
    }

    /// Remove the next entity according to the discipline, charging its
    /// wait against the simulation's current time.
    pub fn get(&mut self, sim: &Simulation) -> DesResult<T> {
        self.get_at(sim.now())
    }

    /// Remove the next entity, charging its wait against `now`.
    ///
    /// # Errors
    /// [`DesError::QueueEmpty`] if there is nothing to remove. Statistics
    /// are left untouched in that case.
    pub fn get_at(&mut self, now: VirtualTime) -> DesResult<T> {
        let next = match self.discipline {
            Discipline::Fifo => self.entries.pop_front(),
            Discipline::Lifo => self.entries.pop_back(),
        };
        let (entity, entered) = next.ok_or_else(|| DesError::QueueEmpty {
            queue: self.id.clone(),
        })?;
        // A stamp later than `now` can only come from `place_at`; count it as zero wait.
        self.total_wait += now.duration_since(entered).unwrap_or(0.0);
        self.removed += 1;
        Ok(entity)
    }

    /// Number of entities waiting.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of waits of every removed entity since the last `clear`.
    pub fn total_wait(&self) -> f64 {
        self.total_wait
    }

    /// Number of removals since the last `clear`.
    pub fn removed(&self) -> u64 {
        self.removed
    }

    /// Mean wait per removed entity.
    ///
    /// Returns `None` when nothing has been removed yet, rather than a
    /// NaN or a clamped zero.
    pub fn average_time(&self) -> Option<f64> {
        (self.removed > 0).then(|| self.total_wait / self.removed as f64)
    }

    /// Drop every waiting entity and reset the statistics.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_wait = 0.0;
        self.removed = 0;
    }
}

impl<T> std::fmt::Display for Queue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.average_time() {
            Some(avg) => write!(f, "{}: Average Time={:6.3}", self.id, avg),
            None => write!(f, "{}: Average Time=n/a", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(units: f64) -> VirtualTime {
        VirtualTime::new(units)
    }

    #[test]
    fn test_fifo_order() {
        let mut q = Queue::fifo("line");
        q.place_at(t(0.0), 'a');
        q.place_at(t(0.0), 'b');
        assert_eq!(q.get_at(t(0.0)), Ok('a'));
        assert_eq!(q.get_at(t(0.0)), Ok('b'));
    }

    #[test]
    fn test_lifo_order() {
        let mut q = Queue::lifo("stack");
        q.place_at(t(0.0), 'a');
        q.place_at(t(0.0), 'b');
        assert_eq!(q.get_at(t(0.0)), Ok('b'));
        assert_eq!(q.get_at(t(0.0)), Ok('a'));
    }

    #[test]
    fn test_average_time() {
        let mut q = Queue::fifo("line");
        q.place_at(t(0.0), 1);
        q.get_at(t(5.0)).unwrap();
        assert_eq!(q.average_time(), Some(5.0));

        q.place_at(t(6.0), 2);
        q.get_at(t(7.0)).unwrap();
        assert_eq!(q.total_wait(), 6.0);
        assert_eq!(q.removed(), 2);
        assert_eq!(q.average_time(), Some(3.0));
    }

    #[test]
    fn test_lifo_charges_newest_entry() {
        let mut q = Queue::lifo("stack");
        q.place_at(t(0.0), "old");
        q.place_at(t(4.0), "new");
        assert_eq!(q.get_at(t(10.0)), Ok("new"));
        assert_eq!(q.total_wait(), 6.0);
    }

    #[test]
    fn test_empty_get_is_error() {
        let mut q: Queue<u32> = Queue::fifo("idle");
        assert_eq!(
            q.get_at(t(1.0)),
            Err(DesError::QueueEmpty { queue: "idle".into() })
        );
        assert_eq!(q.removed(), 0);
    }

    #[test]
    fn test_average_with_no_removals() {
        let mut q = Queue::fifo("line");
        assert_eq!(q.average_time(), None);
        q.place_at(t(0.0), ());
        assert_eq!(q.average_time(), None);
    }

    #[test]
    fn test_len_and_clear() {
        let mut q = Queue::fifo("line");
        q.place_at(t(0.0), 1);
        q.place_at(t(1.0), 2);
        q.get_at(t(3.0)).unwrap();
        assert_eq!(q.len(), 1);
        assert!(!q.is_empty());

        q.clear();
        assert_eq!(q.len(), 0);
        assert!(q.is_empty());
        assert_eq!(q.removed(), 0);
        assert_eq!(q.total_wait(), 0.0);
        assert_eq!(q.average_time(), None);
        assert_eq!(q.id(), "line");
        assert_eq!(q.discipline(), Discipline::Fifo);
    }

    #[test]
    fn test_display() {
        let mut q = Queue::fifo("line");
        assert_eq!(q.to_string(), "line: Average Time=n/a");
        q.place_at(t(0.0), 1);
        q.get_at(t(2.5)).unwrap();
        assert_eq!(q.to_string(), "line: Average Time= 2.500");
    }

    #[test]
    fn test_place_uses_simulation_clock() {
        let sim = Simulation::new();
        let mut q = Queue::fifo("line");
        q.place(&sim, 'x');
        sim.advance(5.0);
        assert_eq!(q.get(&sim), Ok('x'));
        assert_eq!(q.average_time(), Some(5.0));
        sim.wait_until_done();
    }
}
