//! Typed ID definitions for all domain entities.
//!
//! ```rust
//! use dispatch_core::common::{DispatchAssignmentId, IssueId};
//!
//! let issue_id: IssueId = IssueId::new();
//! let assignment_id: DispatchAssignmentId = DispatchAssignmentId::new();
//! // let wrong: IssueId = assignment_id; // does not compile
//! # let _ = (issue_id, assignment_id);
//! ```

pub use super::id::{Id, V7};

// ============================================================================
// Entity marker types
// ============================================================================

/// Marker type for maintenance issues.
pub struct Issue;

/// Marker type for managed properties.
pub struct Property;

/// Marker type for handymen.
pub struct Handyman;

/// Marker type for a handyman's declared service area.
pub struct CoverageArea;

/// Marker type for one day of a handyman's weekly schedule.
pub struct WeeklyAvailability;

/// Marker type for time-off requests.
pub struct TimeOff;

/// Marker type for dispatch assignments (one offer of one issue to one handyman).
pub struct DispatchAssignment;

// ============================================================================
// Type aliases - the primary API
// ============================================================================

pub type IssueId = Id<Issue>;

pub type PropertyId = Id<Property>;

pub type HandymanId = Id<Handyman>;

pub type CoverageAreaId = Id<CoverageArea>;

pub type AvailabilityId = Id<WeeklyAvailability>;

pub type TimeOffId = Id<TimeOff>;

pub type DispatchAssignmentId = Id<DispatchAssignment>;
