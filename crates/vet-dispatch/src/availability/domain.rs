use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Minutes in one day; valid times of day are strictly below this.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// Quantum that schedule boundaries must align to.
pub const SLOT_MINUTES: u16 = 15;

/// Weekday indexed the way persisted schedules store it (0 = Sunday … 6 = Saturday).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Day {
    Sunday,
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
}

impl Day {
    pub const fn ordered() -> [Self; 7] {
        [
            Self::Sunday,
            Self::Monday,
            Self::Tuesday,
            Self::Wednesday,
            Self::Thursday,
            Self::Friday,
            Self::Saturday,
        ]
    }

    pub fn from_index(index: u8) -> Result<Self, ScheduleValidationError> {
        Self::ordered()
            .get(usize::from(index))
            .copied()
            .ok_or(ScheduleValidationError::DayOutOfRange { day: index })
    }

    pub const fn index(self) -> u8 {
        match self {
            Self::Sunday => 0,
            Self::Monday => 1,
            Self::Tuesday => 2,
            Self::Wednesday => 3,
            Self::Thursday => 4,
            Self::Friday => 5,
            Self::Saturday => 6,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Sunday => "Sunday",
            Self::Monday => "Monday",
            Self::Tuesday => "Tuesday",
            Self::Wednesday => "Wednesday",
            Self::Thursday => "Thursday",
            Self::Friday => "Friday",
            Self::Saturday => "Saturday",
        }
    }
}

impl From<chrono::Weekday> for Day {
    fn from(value: chrono::Weekday) -> Self {
        // num_days_from_sunday is always 0..=6.
        Self::ordered()[value.num_days_from_sunday() as usize]
    }
}

impl TryFrom<u8> for Day {
    type Error = ScheduleValidationError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_index(value)
    }
}

impl From<Day> for u8 {
    fn from(value: Day) -> Self {
        value.index()
    }
}

/// Time of day as minutes since midnight, rendered as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(pub(crate) u16);

impl TimeOfDay {
    pub const MIDNIGHT: Self = Self(0);

    pub fn from_minutes(minutes: u16) -> Result<Self, ScheduleValidationError> {
        if minutes >= MINUTES_PER_DAY {
            return Err(ScheduleValidationError::TimeOutOfRange { minutes });
        }
        Ok(Self(minutes))
    }

    pub fn hm(hour: u16, minute: u16) -> Result<Self, ScheduleValidationError> {
        if minute >= 60 {
            return Err(ScheduleValidationError::MalformedTime {
                raw: format!("{hour:02}:{minute:02}"),
            });
        }
        Self::from_minutes(hour.saturating_mul(60).saturating_add(minute))
    }

    /// Parses `HH:MM` (24-hour clock).
    pub fn parse(raw: &str) -> Result<Self, ScheduleValidationError> {
        let malformed = || ScheduleValidationError::MalformedTime {
            raw: raw.to_string(),
        };
        let (hour, minute) = raw.trim().split_once(':').ok_or_else(malformed)?;
        if hour.is_empty() || minute.len() != 2 {
            return Err(malformed());
        }
        let hour: u16 = hour.parse().map_err(|_| malformed())?;
        let minute: u16 = minute.parse().map_err(|_| malformed())?;
        if hour >= 24 || minute >= 60 {
            return Err(malformed());
        }
        Ok(Self(hour * 60 + minute))
    }

    pub const fn minutes(self) -> u16 {
        self.0
    }

    pub const fn is_aligned(self, granularity: u16) -> bool {
        granularity != 0 && self.0 % granularity == 0
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ScheduleValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TimeOfDay> for String {
    fn from(value: TimeOfDay) -> Self {
        value.to_string()
    }
}

/// One open interval `[opens_at, closes_at)` on a weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TimeWindowRecord")]
pub struct TimeWindow {
    day: Day,
    opens_at: TimeOfDay,
    closes_at: TimeOfDay,
}

impl TimeWindow {
    pub fn new(
        day: Day,
        opens_at: TimeOfDay,
        closes_at: TimeOfDay,
    ) -> Result<Self, ScheduleValidationError> {
        for time in [opens_at, closes_at] {
            if !time.is_aligned(SLOT_MINUTES) {
                return Err(ScheduleValidationError::Unaligned {
                    minutes: time.minutes(),
                    granularity: SLOT_MINUTES,
                });
            }
        }
        if opens_at >= closes_at {
            return Err(ScheduleValidationError::EmptyWindow {
                opens_at,
                closes_at,
            });
        }
        Ok(Self {
            day,
            opens_at,
            closes_at,
        })
    }

    pub const fn day(&self) -> Day {
        self.day
    }

    pub const fn opens_at(&self) -> TimeOfDay {
        self.opens_at
    }

    pub const fn closes_at(&self) -> TimeOfDay {
        self.closes_at
    }

    pub fn contains(&self, minutes: u16) -> bool {
        self.opens_at.minutes() <= minutes && minutes < self.closes_at.minutes()
    }
}

/// Wire shape of a window: `{ "day": 1, "opens_at": "09:00", "closes_at": "18:00" }`.
#[derive(Debug, Clone, Copy, Deserialize)]
struct TimeWindowRecord {
    day: Day,
    opens_at: TimeOfDay,
    closes_at: TimeOfDay,
}

impl TryFrom<TimeWindowRecord> for TimeWindow {
    type Error = ScheduleValidationError;

    fn try_from(record: TimeWindowRecord) -> Result<Self, Self::Error> {
        Self::new(record.day, record.opens_at, record.closes_at)
    }
}

/// A provider's recurring availability: at most one window per weekday.
///
/// Serializes as a day-ordered list of windows; a missing day means closed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<TimeWindow>", into = "Vec<TimeWindow>")]
pub struct WeeklySchedule {
    entries: BTreeMap<Day, TimeWindow>,
}

impl WeeklySchedule {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a schedule from a window list, rejecting duplicate days.
    pub fn from_windows(
        windows: impl IntoIterator<Item = TimeWindow>,
    ) -> Result<Self, ScheduleValidationError> {
        let mut entries = BTreeMap::new();
        for window in windows {
            if entries.insert(window.day(), window).is_some() {
                return Err(ScheduleValidationError::DuplicateDay {
                    day: window.day().index(),
                });
            }
        }
        Ok(Self { entries })
    }

    pub fn window(&self, day: Day) -> Option<&TimeWindow> {
        self.entries.get(&day)
    }

    pub fn windows(&self) -> impl Iterator<Item = &TimeWindow> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub(crate) fn with_window(&self, window: TimeWindow) -> Self {
        let mut entries = self.entries.clone();
        entries.insert(window.day(), window);
        Self { entries }
    }

    pub(crate) fn without_day(&self, day: Day) -> Self {
        let mut entries = self.entries.clone();
        entries.remove(&day);
        Self { entries }
    }
}

impl TryFrom<Vec<TimeWindow>> for WeeklySchedule {
    type Error = ScheduleValidationError;

    fn try_from(value: Vec<TimeWindow>) -> Result<Self, Self::Error> {
        Self::from_windows(value)
    }
}

impl From<WeeklySchedule> for Vec<TimeWindow> {
    fn from(value: WeeklySchedule) -> Self {
        value.entries.into_values().collect()
    }
}

/// Rejections raised while building or editing a schedule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleValidationError {
    #[error("day {day} is outside 0 (Sunday) to 6 (Saturday)")]
    DayOutOfRange { day: u8 },
    #[error("{minutes} minutes is not a time of day")]
    TimeOutOfRange { minutes: u16 },
    #[error("'{raw}' is not a valid HH:MM time")]
    MalformedTime { raw: String },
    #[error("{minutes} minutes is not aligned to {granularity}-minute slots")]
    Unaligned { minutes: u16, granularity: u16 },
    #[error("opening time {opens_at} must be before closing time {closes_at}")]
    EmptyWindow {
        opens_at: TimeOfDay,
        closes_at: TimeOfDay,
    },
    #[error("day {day} has more than one time window")]
    DuplicateDay { day: u8 },
    #[error("granularity of {granularity} minutes does not evenly divide a day")]
    InvalidGranularity { granularity: u16 },
}
