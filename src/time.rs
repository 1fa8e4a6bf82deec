/// Virtual time for the process-oriented simulation.
///
/// Represents a logical timestamp with no dependency on `std::time`.
/// Time advances only when the control loop selects a scheduled process,
/// never from wall-clock observation.

use std::cmp::Ordering;

/// A point on the simulation clock, in floating-point time units.
///
/// Always finite. Ordering is total (via `f64::total_cmp`) so the value
/// can key ordered collections directly.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct VirtualTime(f64);

impl VirtualTime {
    /// The zero-point of simulation time.
    pub const ZERO: VirtualTime = VirtualTime(0.0);

    /// Create a new `VirtualTime` from a raw value.
    ///
    /// # Panics
    /// Panics if `units` is NaN or infinite.
    #[inline]
    pub fn new(units: f64) -> Self {
        Self::try_new(units).expect("virtual time must be finite")
    }

    /// Create a `VirtualTime`, returning `None` for NaN or infinite input.
    #[inline]
    pub fn try_new(units: f64) -> Option<Self> {
        // Adding 0.0 folds -0.0 into 0.0.
        units.is_finite().then_some(VirtualTime(units + 0.0))
    }

    /// Return the raw value.
    #[inline]
    pub fn as_f64(self) -> f64 {
        self.0
    }

    /// Advance time by `delta` units.
    ///
    /// Returns `None` if `delta` is negative, NaN, or the result is not
    /// finite. Time may only move forward.
    #[inline]
    pub fn advance(self, delta: f64) -> Option<VirtualTime> {
        if delta.is_nan() || delta < 0.0 {
            return None;
        }
        Self::try_new(self.0 + delta)
    }

    /// Shift by a signed offset. Used when resuming an interrupted
    /// process, where the result is validated later at selection.
    #[inline]
    pub fn shifted(self, offset: f64) -> Option<VirtualTime> {
        Self::try_new(self.0 + offset)
    }

    /// Returns `true` if `self` is strictly before `other`.
    #[inline]
    pub fn is_before(self, other: VirtualTime) -> bool {
        self < other
    }

    /// Returns the elapsed units between `other` and `self`.
    /// Returns `None` if `self` is before `other`.
    #[inline]
    pub fn duration_since(self, other: VirtualTime) -> Option<f64> {
        (self >= other).then(|| self.0 - other.0)
    }
}

impl Default for VirtualTime {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for VirtualTime {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for VirtualTime {}

impl PartialOrd for VirtualTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtualTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl std::fmt::Display for VirtualTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "T={}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(VirtualTime::ZERO.as_f64(), 0.0);
        assert_eq!(VirtualTime::default(), VirtualTime::ZERO);
    }

    #[test]
    fn test_ordering() {
        let t1 = VirtualTime::new(1.5);
        let t2 = VirtualTime::new(2.0);
        assert!(t1 < t2);
        assert!(t1.is_before(t2));
        assert!(!t2.is_before(t1));
    }

    #[test]
    fn test_advance() {
        let t = VirtualTime::new(10.0);
        assert_eq!(t.advance(2.5), Some(VirtualTime::new(12.5)));
        assert_eq!(t.advance(0.0), Some(t));
    }

    #[test]
    fn test_advance_rejects_backward_and_nan() {
        let t = VirtualTime::new(10.0);
        assert!(t.advance(-0.5).is_none());
        assert!(t.advance(f64::NAN).is_none());
        assert!(t.advance(f64::INFINITY).is_none());
    }

    #[test]
    fn test_shifted_allows_negative() {
        let t = VirtualTime::new(10.0);
        assert_eq!(t.shifted(-4.0), Some(VirtualTime::new(6.0)));
    }

    #[test]
    fn test_try_new_rejects_non_finite() {
        assert!(VirtualTime::try_new(f64::NAN).is_none());
        assert!(VirtualTime::try_new(f64::NEG_INFINITY).is_none());
        assert!(VirtualTime::try_new(3.0).is_some());
    }

    #[test]
    fn test_negative_zero_equals_zero() {
        assert_eq!(VirtualTime::new(-0.0), VirtualTime::ZERO);
    }

    #[test]
    fn test_duration_since() {
        let t1 = VirtualTime::new(1.0);
        let t2 = VirtualTime::new(6.0);
        assert_eq!(t2.duration_since(t1), Some(5.0));
        assert_eq!(t1.duration_since(t2), None);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", VirtualTime::new(42.0)), "T=42");
        assert_eq!(format!("{}", VirtualTime::new(2.5)), "T=2.5");
    }
}
