// Common types and utilities shared across the application

pub mod entity_ids;
pub mod errors;
pub mod id;
pub mod phone;

pub use entity_ids::*;
pub use errors::DispatchError;
pub use id::{Id, V7};
pub use phone::normalize_phone;
