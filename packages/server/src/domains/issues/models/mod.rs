pub mod issue;
pub mod property;

pub use issue::{Issue, IssuePriority, IssueStatus};
pub use property::Property;
