//! Compensation state machine.

use serde::{Deserialize, Serialize};

/// The state of a journaled compensation.
///
/// State transitions:
/// ```text
/// Pending ──┬──► Applied
///           ├──► Skipped
///           └──► Escalated ──┬──► Applied
///                 ▲    │     └──► Skipped
///                 └────┘
/// ```
///
/// `Skipped` means the compensated step turned out to have taken effect
/// (the booking exists, or was never cancelled), so giving capacity back
/// would oversell the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CompensationState {
    /// Recorded, not yet applied.
    #[default]
    Pending,

    /// Capacity was given back (terminal state).
    Applied,

    /// Retries were exhausted; capacity and ledger disagree.
    Escalated,

    /// Nothing to undo (terminal state).
    Skipped,
}

impl CompensationState {
    /// Returns true if the compensation still has to run.
    pub fn is_open(&self) -> bool {
        matches!(self, CompensationState::Pending | CompensationState::Escalated)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CompensationState::Applied | CompensationState::Skipped)
    }

    /// Returns true if the state machine allows moving to `to`.
    pub fn can_transition_to(&self, to: CompensationState) -> bool {
        self.is_open() && to != CompensationState::Pending
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompensationState::Pending => "Pending",
            CompensationState::Applied => "Applied",
            CompensationState::Escalated => "Escalated",
            CompensationState::Skipped => "Skipped",
        }
    }
}

impl std::fmt::Display for CompensationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for CompensationState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Pending" => Ok(CompensationState::Pending),
            "Applied" => Ok(CompensationState::Applied),
            "Escalated" => Ok(CompensationState::Escalated),
            "Skipped" => Ok(CompensationState::Skipped),
            other => Err(format!("unknown compensation state: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_is_pending() {
        assert_eq!(CompensationState::default(), CompensationState::Pending);
    }

    #[test]
    fn open_states() {
        assert!(CompensationState::Pending.is_open());
        assert!(CompensationState::Escalated.is_open());
        assert!(!CompensationState::Applied.is_open());
        assert!(!CompensationState::Skipped.is_open());
    }

    #[test]
    fn terminal_states_never_move() {
        for to in [
            CompensationState::Pending,
            CompensationState::Applied,
            CompensationState::Escalated,
            CompensationState::Skipped,
        ] {
            assert!(!CompensationState::Applied.can_transition_to(to));
            assert!(!CompensationState::Skipped.can_transition_to(to));
        }
    }

    #[test]
    fn escalated_can_be_retried() {
        assert!(CompensationState::Escalated.can_transition_to(CompensationState::Escalated));
        assert!(CompensationState::Escalated.can_transition_to(CompensationState::Applied));
        assert!(!CompensationState::Escalated.can_transition_to(CompensationState::Pending));
    }

    #[test]
    fn string_round_trip() {
        for state in [
            CompensationState::Pending,
            CompensationState::Applied,
            CompensationState::Escalated,
            CompensationState::Skipped,
        ] {
            assert_eq!(state.to_string().parse::<CompensationState>(), Ok(state));
        }
        assert!("Done".parse::<CompensationState>().is_err());
    }

    #[test]
    fn serialization() {
        let json = serde_json::to_string(&CompensationState::Escalated).unwrap();
        assert_eq!(json, "\"Escalated\"");
    }
}
