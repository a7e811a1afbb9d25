pub mod assignment;
pub mod settings;

pub use assignment::{DispatchAssignment, DispatchStatus};
pub use settings::DispatchSettings;
