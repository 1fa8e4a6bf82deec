//! Process lifecycle states and the legal transitions between them.

/// Where a process is in its lifecycle.
///
/// Only the scheduler changes a process's state; a process merely
/// requests a transition by calling a suspension operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum ProcessState {
    /// Registered or released from a wait; queued in runnable-now.
    Ready,
    /// Holds the activation token.
    Active,
    /// Parked until its moving-time.
    Scheduled,
    /// Blocked on a boolean control.
    WaitingCond,
    /// Removed from the time line by an explicit interrupt.
    Interrupted,
    /// Body has returned. Never revisited.
    Terminated,
}

impl ProcessState {
    /// Returns `true` if the transition `self -> next` is legal.
    ///
    /// `Active -> Active` covers a process that notified a control and
    /// is dispatched again without leaving runnable-now.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Ready, Active)
                | (Scheduled, Active)
                | (Active, Active)
                | (Active, Scheduled)
                | (Active, WaitingCond)
                | (Active, Terminated)
                | (Scheduled, Interrupted)
                | (Interrupted, Scheduled)
                | (WaitingCond, Ready)
        )
    }

    /// Returns `true` for every state except `Terminated`.
    pub fn is_live(self) -> bool {
        self != ProcessState::Terminated
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcessState::Ready => "ready",
            ProcessState::Active => "active",
            ProcessState::Scheduled => "scheduled",
            ProcessState::WaitingCond => "waiting on condition",
            ProcessState::Interrupted => "interrupted",
            ProcessState::Terminated => "terminated",
        };
        f.write_str(s)
    }
}
