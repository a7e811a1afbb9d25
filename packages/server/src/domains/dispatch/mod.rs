//! Dispatch domain: offering issues to handymen over WhatsApp and tracking
//! each offer until it is accepted, declined, canceled or escalated.

pub mod events;
pub mod machine;
pub mod metrics;
pub mod models;
pub mod orchestrator;
pub mod template;
pub mod webhook;

pub use events::DispatchEvent;
pub use machine::{DispatchTrigger, SweepAction};
pub use metrics::{compute_metrics, HandymanMetrics};
pub use models::{DispatchAssignment, DispatchSettings, DispatchStatus};
pub use orchestrator::{DispatchOrchestrator, DispatchOutcome, SweepReport};
