// Handyman Dispatch - core library
//
// Offers maintenance issues to handymen over WhatsApp, tracks each offer through
// replies, follow-ups and escalation, and ranks property/handyman pairings.
//
// Domain logic lives in domains/*, infrastructure traits and adapters in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
