pub mod availability;
pub mod coverage_area;
pub mod handyman;
pub mod time_off;

pub use availability::{day_index, DayAvailability, WeeklyAvailability};
pub use coverage_area::{CoverageArea, CoverageType};
pub use handyman::{AvailabilityStatus, Handyman};
pub use time_off::{TimeOff, TimeOffStatus};
