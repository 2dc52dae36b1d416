//! Provider weekly availability and emergency dispatch for veterinary services.

pub mod availability;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod shared;
pub mod telemetry;
