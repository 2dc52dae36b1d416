//! Provider weekly availability: validated time windows and open-at lookups.

pub mod domain;
pub mod manager;
pub mod repository;
pub mod router;
pub mod service;

#[cfg(test)]
mod tests;

pub use domain::{
    Day, ScheduleValidationError, TimeOfDay, TimeWindow, WeeklySchedule, SLOT_MINUTES,
};
pub use manager::ScheduleManager;
pub use repository::{DayAvailabilityView, ScheduleRepository, ScheduleView};
pub use router::availability_router;
pub use service::{AvailabilityError, AvailabilityService};
