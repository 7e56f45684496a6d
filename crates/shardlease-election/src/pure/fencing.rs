//! Stale-activation filtering by fencing term.
//!
//! Terms order successive holders of one lease. A downstream workload keeps
//! the highest term it has seen and whether that term is currently active;
//! anything older is a message from a superseded leader.

/// Per-lease fencing state kept by a downstream consumer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FenceState {
    /// Highest term admitted so far.
    pub latest_term: u64,
    /// Whether the workload for `latest_term` is running.
    pub active: bool,
}

/// State after an activation for `term`, or `None` if it is stale.
///
/// The same term may be re-activated: one holder owns a term for its whole
/// tenure, including a resume after a failed renewal.
#[inline]
pub fn admit_start(state: FenceState, term: u64) -> Option<FenceState> {
    if term < state.latest_term || (term == state.latest_term && state.active) {
        return None;
    }
    Some(FenceState {
        latest_term: term,
        active: true,
    })
}

/// State after a deactivation for `term`, or `None` if it is stale or redundant.
#[inline]
pub fn admit_stop(state: FenceState, term: u64) -> Option<FenceState> {
    if term != state.latest_term || !state.active {
        return None;
    }
    Some(FenceState {
        latest_term: term,
        active: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_start_is_admitted() {
        let state = admit_start(FenceState::default(), 1).unwrap();
        assert_eq!(state, FenceState {
            latest_term: 1,
            active: true
        });
    }

    #[test]
    fn older_start_is_stale() {
        let state = FenceState {
            latest_term: 3,
            active: false,
        };
        assert_eq!(admit_start(state, 2), None);
    }

    #[test]
    fn duplicate_start_is_redundant() {
        let state = FenceState {
            latest_term: 3,
            active: true,
        };
        assert_eq!(admit_start(state, 3), None);
    }

    #[test]
    fn same_term_can_restart_after_stop() {
        let state = FenceState {
            latest_term: 3,
            active: false,
        };
        assert!(admit_start(state, 3).is_some_and(|s| s.active));
    }

    #[test]
    fn newer_start_supersedes_active_term() {
        let state = FenceState {
            latest_term: 3,
            active: true,
        };
        assert_eq!(admit_start(state, 4).unwrap().latest_term, 4);
    }

    #[test]
    fn stop_for_older_term_is_ignored() {
        let state = FenceState {
            latest_term: 4,
            active: true,
        };
        assert_eq!(admit_stop(state, 3), None);
    }

    #[test]
    fn stop_for_current_term_deactivates() {
        let state = FenceState {
            latest_term: 4,
            active: true,
        };
        assert!(!admit_stop(state, 4).unwrap().active);
        assert_eq!(
            admit_stop(
                FenceState {
                    latest_term: 4,
                    active: false
                },
                4
            ),
            None
        );
    }
}
