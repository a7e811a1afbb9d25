// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only. Dispatch rules live in the domains and
// call through these traits.
//
// Naming convention: Base* for trait names (e.g., BaseMessageGateway, BaseDispatchStore)

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::common::{
    CoverageAreaId, DispatchAssignmentId, HandymanId, IssueId, PropertyId, TimeOffId,
};
use crate::domains::dispatch::models::{DispatchAssignment, DispatchStatus};
use crate::domains::handymen::models::{
    CoverageArea, Handyman, TimeOff, TimeOffStatus, WeeklyAvailability,
};
use crate::domains::issues::{Issue, Property};

// =============================================================================
// Message Gateway Trait (Infrastructure - WhatsApp/SMS)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendReceipt {
    /// Gateway-assigned id (Twilio message SID).
    pub message_id: String,
}

#[async_trait]
pub trait BaseMessageGateway: Send + Sync {
    /// Send a text message. Fire-and-forget: no retries at this layer.
    async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<SendReceipt>;
}

// =============================================================================
// Availability & Coverage Store Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseAvailabilityStore: Send + Sync {
    async fn weekly_availability(&self, handyman_id: HandymanId) -> Result<Vec<WeeklyAvailability>>;

    /// Replace the handyman's week atomically. Either every row lands or none do.
    async fn replace_week(
        &self,
        handyman_id: HandymanId,
        rows: Vec<WeeklyAvailability>,
    ) -> Result<Vec<WeeklyAvailability>>;

    async fn time_off_for(&self, handyman_id: HandymanId) -> Result<Vec<TimeOff>>;

    async fn find_time_off(&self, id: TimeOffId) -> Result<Option<TimeOff>>;

    async fn insert_time_off(&self, time_off: TimeOff) -> Result<TimeOff>;

    /// Decide a `requested` entry. `None` when the entry was already decided.
    async fn decide_time_off(&self, id: TimeOffId, decision: TimeOffStatus) -> Result<Option<TimeOff>>;

    async fn coverage_for(&self, handyman_id: HandymanId) -> Result<Vec<CoverageArea>>;

    async fn insert_coverage(&self, area: CoverageArea) -> Result<CoverageArea>;

    async fn delete_coverage(&self, id: CoverageAreaId) -> Result<bool>;
}

// =============================================================================
// Dispatch Store Trait (Infrastructure)
// =============================================================================

#[async_trait]
pub trait BaseDispatchStore: BaseAvailabilityStore {
    async fn find_issue(&self, id: IssueId) -> Result<Option<Issue>>;

    async fn find_property(&self, id: PropertyId) -> Result<Option<Property>>;

    async fn find_handyman(&self, id: HandymanId) -> Result<Option<Handyman>>;

    /// Look up by E.164 number, tolerant of how the stored number is formatted.
    async fn find_handyman_by_phone(&self, e164: &str) -> Result<Option<Handyman>>;

    async fn list_handymen(&self) -> Result<Vec<Handyman>>;

    /// Resolved issues per property that the handyman completed.
    async fn completed_jobs_by_property(&self, handyman_id: HandymanId) -> Result<HashMap<PropertyId, u32>>;

    /// Properties the handyman is not yet attached to.
    async fn unassigned_properties_for(&self, handyman_id: HandymanId) -> Result<Vec<Property>>;

    /// Raw key/value rows from the settings table.
    async fn settings_entries(&self) -> Result<HashMap<String, Value>>;

    async fn find_assignment(&self, id: DispatchAssignmentId) -> Result<Option<DispatchAssignment>>;

    async fn assignments_for_issue(&self, issue_id: IssueId) -> Result<Vec<DispatchAssignment>>;

    async fn assignments_for_handyman(&self, handyman_id: HandymanId) -> Result<Vec<DispatchAssignment>>;

    async fn pending_assignments(&self) -> Result<Vec<DispatchAssignment>>;

    /// The row an inbound reply with this gateway id already resolved, if any.
    async fn find_by_inbound_sid(&self, inbound_message_sid: &str) -> Result<Option<DispatchAssignment>>;

    /// Conditional insert. `None` when a pending row already exists for the pair.
    async fn insert_pending(&self, assignment: DispatchAssignment) -> Result<Option<DispatchAssignment>>;

    /// `UPDATE .. WHERE status = 'pending'`, recording the reply's gateway id.
    /// Accepting also assigns the issue, atomically with the status change.
    /// `None` when the row already left pending or the reply id was already used.
    async fn transition_from_pending(
        &self,
        id: DispatchAssignmentId,
        to: DispatchStatus,
        response_time: Option<DateTime<Utc>>,
        inbound_message_sid: Option<&str>,
    ) -> Result<Option<DispatchAssignment>>;

    /// Bump `follow_up_count` from `expected`. `None` when another sweep got there first.
    async fn claim_follow_up(
        &self,
        id: DispatchAssignmentId,
        expected: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchAssignment>>;

    async fn record_message_sid(&self, id: DispatchAssignmentId, message_sid: &str) -> Result<()>;
}
