//! Process-local election state published by each elector.

use std::fmt;

/// Phase of a single lease elector.
///
/// ```text
/// Observing --absent/unheld/expired--> Acquiring --won--> Leading <--> Renewing
///     ^  ^-------------lost race---------'                              |
///     |  '--------------held by us----------------> Renewing            |
///     '--------------------lost leadership------------------------------'
/// any phase --cancelled--> Releasing --> Stopped
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElectionPhase {
    /// Reading the record and waiting for it to become available.
    Observing,
    /// Conditional write claiming the lease is in flight.
    Acquiring,
    /// Holding the lease, waiting for the next renewal.
    Leading,
    /// Conditional write refreshing (or resuming) our claim is in flight.
    Renewing,
    /// Cancelled; best-effort release in progress.
    Releasing,
    /// Finished.
    Stopped,
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElectionPhase::Observing => "observing",
            ElectionPhase::Acquiring => "acquiring",
            ElectionPhase::Leading => "leading",
            ElectionPhase::Renewing => "renewing",
            ElectionPhase::Releasing => "releasing",
            ElectionPhase::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Snapshot of one elector's local view. Only the elector task writes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalElectionState {
    /// Current phase.
    pub phase: ElectionPhase,
    /// Term of the last record read or written.
    pub last_observed_term: u64,
    /// Holder named by the last record read or written. Empty if unheld.
    pub observed_holder: String,
    /// Whether this process currently considers itself the leader.
    pub is_leading_locally: bool,
    /// Clock reading at which the elector next acts.
    pub next_action_deadline_ms: u64,
}

impl Default for LocalElectionState {
    fn default() -> Self {
        Self {
            phase: ElectionPhase::Observing,
            last_observed_term: 0,
            observed_holder: String::new(),
            is_leading_locally: false,
            next_action_deadline_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_state_is_observing() {
        let state = LocalElectionState::default();
        assert_eq!(state.phase, ElectionPhase::Observing);
        assert!(!state.is_leading_locally);
    }

    #[test]
    fn phase_display() {
        assert_eq!(ElectionPhase::Renewing.to_string(), "renewing");
        assert_eq!(ElectionPhase::Stopped.to_string(), "stopped");
    }
}
