//! Booking state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// The status of a booking in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Confirmed ──► Completed
///    │            │
///    └────────────┴──► Cancelled
/// ```
///
/// Confirmation and completion are driven by the provider workflow;
/// cancellation by the patient. `Completed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Capacity is held, awaiting provider confirmation.
    #[default]
    Pending,

    /// Provider confirmed the appointment.
    Confirmed,

    /// Appointment took place (terminal state).
    Completed,

    /// Booking was cancelled and its capacity returned (terminal state).
    Cancelled,
}

impl BookingStatus {
    /// Returns true if moving from this status to `to` is allowed.
    pub fn can_transition_to(&self, to: BookingStatus) -> bool {
        matches!(
            (self, to),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
                | (BookingStatus::Confirmed, BookingStatus::Cancelled)
        )
    }

    /// Returns true if the booking can be cancelled in this status.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(BookingStatus::Cancelled)
    }

    /// Returns true if the booking holds a unit of slot capacity.
    pub fn is_active(&self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }

    /// Returns true if this is a terminal status (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    /// Returns the stored name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
            BookingStatus::Cancelled => "CANCELLED",
        }
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(BookingStatus::Pending),
            "CONFIRMED" => Ok(BookingStatus::Confirmed),
            "COMPLETED" => Ok(BookingStatus::Completed),
            "CANCELLED" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [BookingStatus; 4] = [
        BookingStatus::Pending,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
        BookingStatus::Cancelled,
    ];

    #[test]
    fn test_default_status_is_pending() {
        assert_eq!(BookingStatus::default(), BookingStatus::Pending);
    }

    #[test]
    fn test_allowed_transitions() {
        let allowed: Vec<_> = ALL
            .iter()
            .flat_map(|from| ALL.iter().map(move |to| (*from, *to)))
            .filter(|(from, to)| from.can_transition_to(*to))
            .collect();

        assert_eq!(
            allowed,
            vec![
                (BookingStatus::Pending, BookingStatus::Confirmed),
                (BookingStatus::Pending, BookingStatus::Cancelled),
                (BookingStatus::Confirmed, BookingStatus::Completed),
                (BookingStatus::Confirmed, BookingStatus::Cancelled),
            ]
        );
    }

    #[test]
    fn test_terminal_states_have_no_exits() {
        for from in ALL.iter().filter(|s| s.is_terminal()) {
            assert!(ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn test_active_states() {
        assert!(BookingStatus::Pending.is_active());
        assert!(BookingStatus::Confirmed.is_active());
        assert!(!BookingStatus::Completed.is_active());
        assert!(!BookingStatus::Cancelled.is_active());
    }

    #[test]
    fn test_can_cancel() {
        assert!(BookingStatus::Pending.can_cancel());
        assert!(BookingStatus::Confirmed.can_cancel());
        assert!(!BookingStatus::Completed.can_cancel());
        assert!(!BookingStatus::Cancelled.can_cancel());
    }

    #[test]
    fn test_display_and_parse() {
        for status in ALL {
            assert_eq!(status.to_string().parse::<BookingStatus>(), Ok(status));
        }
        assert!("REFUNDED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_serialization_uses_stored_names() {
        let json = serde_json::to_string(&BookingStatus::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        let deserialized: BookingStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, BookingStatus::Cancelled);
    }
}
