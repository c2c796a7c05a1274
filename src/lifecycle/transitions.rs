//! Memory status state machine
//!
//! Transitions are driven exclusively by the lifecycle manager.
//! `superseded` and `archived` are terminal; anything leaving them is
//! rejected.

use crate::error::{ContinuityError, Result};
use crate::types::MemoryStatus;

/// Whether `from -> to` is a legal status transition
pub fn can_transition(from: MemoryStatus, to: MemoryStatus) -> bool {
    use MemoryStatus::*;
    if from == to {
        return true;
    }
    match from {
        Active => matches!(to, Pending | Superseded | Deprecated | Archived),
        Pending => matches!(to, Active | Superseded),
        Deprecated => matches!(to, Archived),
        Superseded | Archived => false,
    }
}

/// Validate a transition, returning the lifecycle error on violation
pub fn validate_transition(from: MemoryStatus, to: MemoryStatus) -> Result<()> {
    if can_transition(from, to) {
        Ok(())
    } else {
        Err(ContinuityError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use MemoryStatus::*;

    #[test]
    fn test_active_fans_out() {
        for to in [Pending, Superseded, Deprecated, Archived] {
            assert!(can_transition(Active, to));
        }
    }

    #[test]
    fn test_pending_paths() {
        assert!(can_transition(Pending, Active));
        assert!(can_transition(Pending, Superseded));
        assert!(!can_transition(Pending, Archived));
        assert!(!can_transition(Pending, Deprecated));
    }

    #[test]
    fn test_deprecated_only_archives() {
        assert!(can_transition(Deprecated, Archived));
        assert!(!can_transition(Deprecated, Active));
        assert!(!can_transition(Deprecated, Superseded));
    }

    #[test]
    fn test_terminal_states_reject_everything() {
        for from in [Superseded, Archived] {
            for to in [Active, Pending, Deprecated] {
                assert!(!can_transition(from, to), "{} -> {}", from, to);
            }
        }
        // superseded -> active is the canonical invalid transition
        let err = validate_transition(Superseded, Active).unwrap_err();
        assert_eq!(err.kind(), "lifecycle_invalid_transition");
    }

    #[test]
    fn test_self_transition_is_noop() {
        assert!(can_transition(Archived, Archived));
        assert!(validate_transition(Active, Active).is_ok());
    }
}
