//! Precondition gate: lifecycle state and random source availability.

use tracing::warn;

use crate::error::PreconditionError;
use crate::lifecycle::LifecycleState;

/// Validate that personalization may run. Pure; no side effects.
pub fn check_preconditions(
    lifecycle_state: LifecycleState,
    random_source_available: bool,
) -> Result<(), PreconditionError> {
    if !lifecycle_state.is_personalizable() {
        warn!(lifecycle = %lifecycle_state, "Personalization refused in this lifecycle state");
        return Err(PreconditionError::InvalidLifecycleState(lifecycle_state));
    }

    if !random_source_available {
        warn!("Personalization refused: no software access to the random source");
        return Err(PreconditionError::RandomSourceUnavailable);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_mission_states() {
        for state in LifecycleState::PERSONALIZABLE {
            assert_eq!(check_preconditions(state, true), Ok(()));
        }
    }

    #[test]
    fn test_rejects_other_states() {
        assert_eq!(
            check_preconditions(LifecycleState::TestUnlocked(1), true),
            Err(PreconditionError::InvalidLifecycleState(
                LifecycleState::TestUnlocked(1)
            ))
        );
        assert_eq!(
            check_preconditions(LifecycleState::Invalid, true),
            Err(PreconditionError::InvalidLifecycleState(LifecycleState::Invalid))
        );
    }

    #[test]
    fn test_lifecycle_checked_before_entropy() {
        assert_eq!(
            check_preconditions(LifecycleState::Rma, false),
            Err(PreconditionError::InvalidLifecycleState(LifecycleState::Rma))
        );
    }

    #[test]
    fn test_rejects_missing_random_source() {
        assert_eq!(
            check_preconditions(LifecycleState::Prod, false),
            Err(PreconditionError::RandomSourceUnavailable)
        );
    }
}
