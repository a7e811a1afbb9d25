//! Issues and the properties they are raised against.

pub mod models;

pub use models::{Issue, IssuePriority, IssueStatus, Property};
