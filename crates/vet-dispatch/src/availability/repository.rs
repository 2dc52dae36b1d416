use serde::Serialize;

use super::domain::{Day, TimeOfDay, WeeklySchedule};
use crate::shared::{ProviderId, RepositoryError};

/// Persistence contract for provider schedules.
///
/// Saves replace the whole schedule. Concurrent saves for the same provider resolve as
/// last-write-wins; there is no per-day merge.
pub trait ScheduleRepository: Send + Sync {
    fn load(&self, provider: &ProviderId) -> Result<Option<WeeklySchedule>, RepositoryError>;
    fn save(&self, provider: &ProviderId, schedule: &WeeklySchedule)
        -> Result<(), RepositoryError>;
}

/// Seven-row rendering of a schedule, Sunday first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleView {
    pub provider_id: ProviderId,
    pub days: Vec<DayAvailabilityView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailabilityView {
    pub day: u8,
    pub label: &'static str,
    pub open: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub opens_at: Option<TimeOfDay>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub closes_at: Option<TimeOfDay>,
}

impl ScheduleView {
    pub fn new(provider_id: ProviderId, schedule: &WeeklySchedule) -> Self {
        let days = Day::ordered()
            .into_iter()
            .map(|day| {
                let window = schedule.window(day);
                DayAvailabilityView {
                    day: day.index(),
                    label: day.label(),
                    open: window.is_some(),
                    opens_at: window.map(|window| window.opens_at()),
                    closes_at: window.map(|window| window.closes_at()),
                }
            })
            .collect();

        Self { provider_id, days }
    }
}
