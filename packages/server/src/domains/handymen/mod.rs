//! Handymen, their coverage areas, weekly hours and time off.

pub mod actions;
pub mod models;

pub use models::{
    AvailabilityStatus, CoverageArea, CoverageType, DayAvailability, Handyman, TimeOff,
    TimeOffStatus, WeeklyAvailability,
};
