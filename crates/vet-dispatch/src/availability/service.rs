use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::{info, warn};

use super::domain::{ScheduleValidationError, TimeOfDay, WeeklySchedule};
use super::manager::ScheduleManager;
use super::repository::{ScheduleRepository, ScheduleView};
use crate::shared::{ProviderId, RepositoryError};

/// Applies [`ScheduleManager`] edits to stored schedules.
///
/// Each edit loads the current schedule, transforms it, and saves the whole result. Two
/// concurrent edits to the same provider race at whole-schedule granularity and the later
/// save wins.
pub struct AvailabilityService<R> {
    repository: Arc<R>,
    manager: ScheduleManager,
}

impl<R> AvailabilityService<R>
where
    R: ScheduleRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            manager: ScheduleManager::new(),
        }
    }

    pub fn manager(&self) -> &ScheduleManager {
        &self.manager
    }

    /// Stored schedule, or the Monday–Friday default when the provider has none.
    pub fn load(&self, provider: &ProviderId) -> Result<WeeklySchedule, AvailabilityError> {
        let stored = self.repository.load(provider).map_err(|err| {
            warn!(%provider, error = %err, "schedule load failed");
            AvailabilityError::Upstream(err)
        })?;
        Ok(stored.unwrap_or_else(|| self.manager.default_schedule()))
    }

    pub fn replace(
        &self,
        provider: &ProviderId,
        schedule: WeeklySchedule,
    ) -> Result<WeeklySchedule, AvailabilityError> {
        self.persist(provider, &schedule)?;
        Ok(schedule)
    }

    pub fn set_day(
        &self,
        provider: &ProviderId,
        day: u8,
        opens_at: TimeOfDay,
        closes_at: TimeOfDay,
    ) -> Result<WeeklySchedule, AvailabilityError> {
        let current = self.load(provider)?;
        let updated = self
            .manager
            .set_day(&current, day, opens_at.minutes(), closes_at.minutes())?;
        self.persist(provider, &updated)?;
        Ok(updated)
    }

    pub fn clear_day(
        &self,
        provider: &ProviderId,
        day: u8,
    ) -> Result<WeeklySchedule, AvailabilityError> {
        let current = self.load(provider)?;
        let updated = self.manager.clear_day(&current, day)?;
        self.persist(provider, &updated)?;
        Ok(updated)
    }

    pub fn is_open(
        &self,
        provider: &ProviderId,
        instant: NaiveDateTime,
    ) -> Result<bool, AvailabilityError> {
        let schedule = self.load(provider)?;
        Ok(self.manager.is_open_on(&schedule, instant))
    }

    pub fn view(&self, provider: &ProviderId) -> Result<ScheduleView, AvailabilityError> {
        let schedule = self.load(provider)?;
        Ok(ScheduleView::new(provider.clone(), &schedule))
    }

    fn persist(
        &self,
        provider: &ProviderId,
        schedule: &WeeklySchedule,
    ) -> Result<(), AvailabilityError> {
        self.repository.save(provider, schedule).map_err(|err| {
            warn!(%provider, error = %err, "schedule save failed");
            AvailabilityError::Upstream(err)
        })?;
        info!(%provider, open_days = schedule.len(), "schedule saved");
        Ok(())
    }
}

/// Error raised by the availability service.
#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error(transparent)]
    Validation(#[from] ScheduleValidationError),
    #[error("schedule store unavailable")]
    Upstream(#[source] RepositoryError),
}

impl AvailabilityError {
    pub const fn kind(&self) -> &'static str {
        match self {
            AvailabilityError::Validation(_) => "validation",
            AvailabilityError::Upstream(_) => "upstream_unavailable",
        }
    }

    pub fn user_message(&self) -> String {
        match self {
            AvailabilityError::Validation(err) => err.to_string(),
            AvailabilityError::Upstream(_) => {
                "Schedules are temporarily unavailable, please try again.".to_string()
            }
        }
    }
}
