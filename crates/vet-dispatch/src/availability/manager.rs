use chrono::{Datelike, NaiveDateTime, Timelike};

use super::domain::{
    Day, ScheduleValidationError, TimeOfDay, TimeWindow, WeeklySchedule, MINUTES_PER_DAY,
    SLOT_MINUTES,
};

/// Pure editing and lookup rules over a [`WeeklySchedule`].
///
/// Every edit returns a new schedule; the input is never touched, so a rejected edit
/// leaves the caller's schedule exactly as it was. Persisting the result is the caller's job.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScheduleManager;

impl ScheduleManager {
    pub const fn new() -> Self {
        Self
    }

    /// Monday to Friday, 09:00 to 18:00. Used when a provider has never saved a schedule.
    pub fn default_schedule(&self) -> WeeklySchedule {
        let windows = [
            Day::Monday,
            Day::Tuesday,
            Day::Wednesday,
            Day::Thursday,
            Day::Friday,
        ]
        .into_iter()
        .map(|day| TimeWindow::new(day, TimeOfDay(9 * 60), TimeOfDay(18 * 60)));

        let windows: Result<Vec<_>, _> = windows.collect();
        windows
            .and_then(WeeklySchedule::from_windows)
            .unwrap_or_default()
    }

    /// Replaces the window for `day`; an existing window is overwritten, not merged.
    pub fn set_day(
        &self,
        schedule: &WeeklySchedule,
        day: u8,
        opens_at: u16,
        closes_at: u16,
    ) -> Result<WeeklySchedule, ScheduleValidationError> {
        let day = Day::from_index(day)?;
        let window = TimeWindow::new(
            day,
            TimeOfDay::from_minutes(opens_at)?,
            TimeOfDay::from_minutes(closes_at)?,
        )?;
        Ok(schedule.with_window(window))
    }

    /// Removes the window for `day`. Clearing an already-closed day is a no-op.
    pub fn clear_day(
        &self,
        schedule: &WeeklySchedule,
        day: u8,
    ) -> Result<WeeklySchedule, ScheduleValidationError> {
        let day = Day::from_index(day)?;
        Ok(schedule.without_day(day))
    }

    pub fn is_open_at(&self, schedule: &WeeklySchedule, day: u8, time_of_day: u16) -> bool {
        let Ok(day) = Day::from_index(day) else {
            return false;
        };
        schedule
            .window(day)
            .is_some_and(|window| window.contains(time_of_day))
    }

    /// Open check for a local wall-clock instant.
    pub fn is_open_on(&self, schedule: &WeeklySchedule, instant: NaiveDateTime) -> bool {
        let day = Day::from(instant.date().weekday());
        let minutes = instant.hour() * 60 + instant.minute();
        // hour/minute come from a valid clock time, so this always fits.
        let minutes = u16::try_from(minutes).unwrap_or(MINUTES_PER_DAY);
        self.is_open_at(schedule, day.index(), minutes)
    }

    /// Every selectable time across the day at `granularity` minutes (00:00, 00:15, … 23:45).
    pub fn list_time_options(
        &self,
        granularity: u16,
    ) -> Result<Vec<TimeOfDay>, ScheduleValidationError> {
        if granularity == 0 || MINUTES_PER_DAY % granularity != 0 {
            return Err(ScheduleValidationError::InvalidGranularity { granularity });
        }
        Ok((0..MINUTES_PER_DAY)
            .step_by(usize::from(granularity))
            .map(TimeOfDay)
            .collect())
    }

    pub fn time_options(&self) -> Vec<TimeOfDay> {
        (0..MINUTES_PER_DAY)
            .step_by(usize::from(SLOT_MINUTES))
            .map(TimeOfDay)
            .collect()
    }
}
