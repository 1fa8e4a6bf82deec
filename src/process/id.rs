//! Process ID — a lightweight, ordered, copyable process identifier.

/// A unique identifier for a simulated process.
///
/// Identities are handed out in registration order, so ordering by
/// `ProcessId` is ordering by registration. `0` is reserved for the
/// top-level process that owns the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct ProcessId(u64);

impl ProcessId {
    /// The top-level process.
    pub const TOP_LEVEL: ProcessId = ProcessId(0);

    /// Create a process ID from a raw integer.
    #[inline]
    pub fn new(id: u64) -> Self {
        ProcessId(id)
    }

    /// Return the underlying integer.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }

    /// Returns `true` for the reserved top-level identity.
    #[inline]
    pub fn is_top_level(self) -> bool {
        self == Self::TOP_LEVEL
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "P{}", self.0)
    }
}

/// Strictly-increasing identity generator.
///
/// Each scheduler owns exactly one. The top-level process takes `0`,
/// so registered processes start at `1`.
#[derive(Debug, Clone)]
pub(crate) struct ProcessIdGen {
    next: u64,
}

impl ProcessIdGen {
    /// Generator whose first registered identity is `1`.
    pub(crate) fn new() -> Self {
        ProcessIdGen { next: 1 }
    }

    /// Mint the next identity.
    pub(crate) fn next_id(&mut self) -> ProcessId {
        let id = ProcessId(self.next);
        self.next += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_gen_skips_top_level() {
        let mut gen = ProcessIdGen::new();
        let a = gen.next_id();
        let b = gen.next_id();
        assert_eq!(a.raw(), 1);
        assert_eq!(b.raw(), 2);
        assert!(a < b);
        assert!(!a.is_top_level());
        assert!(ProcessId::TOP_LEVEL.is_top_level());
    }

    #[test]
    fn test_display() {
        assert_eq!(ProcessId::new(7).to_string(), "P7");
    }
}
