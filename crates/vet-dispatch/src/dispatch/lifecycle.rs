use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of an emergency request.
///
/// `Pending → Assigned → EnRoute → Attended`, with `Cancelled` reachable from any
/// non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyStatus {
    Pending,
    Assigned,
    EnRoute,
    Attended,
    Cancelled,
}

impl EmergencyStatus {
    pub const fn label(self) -> &'static str {
        match self {
            EmergencyStatus::Pending => "pending",
            EmergencyStatus::Assigned => "assigned",
            EmergencyStatus::EnRoute => "en_route",
            EmergencyStatus::Attended => "attended",
            EmergencyStatus::Cancelled => "cancelled",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, EmergencyStatus::Attended | EmergencyStatus::Cancelled)
    }

    pub const fn can_transition_to(self, next: EmergencyStatus) -> bool {
        use EmergencyStatus::*;
        matches!(
            (self, next),
            (Pending, Assigned)
                | (Assigned, EnRoute)
                | (EnRoute, Attended)
                | (Pending, Cancelled)
                | (Assigned, Cancelled)
                | (EnRoute, Cancelled)
        )
    }

    /// True when `statuses` starts at `Pending` and every step is a listed transition.
    pub fn is_valid_path(statuses: &[EmergencyStatus]) -> bool {
        match statuses.first() {
            Some(EmergencyStatus::Pending) => statuses
                .windows(2)
                .all(|pair| pair[0].can_transition_to(pair[1])),
            _ => false,
        }
    }
}

impl fmt::Display for EmergencyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of a request's status history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: EmergencyStatus,
    pub at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub note: Option<String>,
}
