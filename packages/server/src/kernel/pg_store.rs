//! Postgres-backed stores. Thin delegation to the model query methods.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::collections::HashMap;

use super::traits::{BaseAvailabilityStore, BaseDispatchStore};
use crate::common::{
    CoverageAreaId, DispatchAssignmentId, HandymanId, IssueId, PropertyId, TimeOffId,
};
use crate::domains::dispatch::models::{DispatchAssignment, DispatchSettings, DispatchStatus};
use crate::domains::handymen::models::{
    CoverageArea, Handyman, TimeOff, TimeOffStatus, WeeklyAvailability,
};
use crate::domains::issues::{Issue, Property};

#[derive(Clone)]
pub struct PgDispatchStore {
    pool: PgPool,
}

impl PgDispatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseAvailabilityStore for PgDispatchStore {
    async fn weekly_availability(&self, handyman_id: HandymanId) -> Result<Vec<WeeklyAvailability>> {
        WeeklyAvailability::find_for_handyman(handyman_id, &self.pool).await
    }

    async fn replace_week(
        &self,
        handyman_id: HandymanId,
        rows: Vec<WeeklyAvailability>,
    ) -> Result<Vec<WeeklyAvailability>> {
        WeeklyAvailability::replace_week(handyman_id, &rows, &self.pool).await
    }

    async fn time_off_for(&self, handyman_id: HandymanId) -> Result<Vec<TimeOff>> {
        TimeOff::find_for_handyman(handyman_id, &self.pool).await
    }

    async fn find_time_off(&self, id: TimeOffId) -> Result<Option<TimeOff>> {
        TimeOff::find_by_id(id, &self.pool).await
    }

    async fn insert_time_off(&self, time_off: TimeOff) -> Result<TimeOff> {
        time_off.insert(&self.pool).await
    }

    async fn decide_time_off(&self, id: TimeOffId, decision: TimeOffStatus) -> Result<Option<TimeOff>> {
        TimeOff::decide(id, decision, &self.pool).await
    }

    async fn coverage_for(&self, handyman_id: HandymanId) -> Result<Vec<CoverageArea>> {
        CoverageArea::find_for_handyman(handyman_id, &self.pool).await
    }

    async fn insert_coverage(&self, area: CoverageArea) -> Result<CoverageArea> {
        area.insert(&self.pool).await
    }

    async fn delete_coverage(&self, id: CoverageAreaId) -> Result<bool> {
        CoverageArea::delete(id, &self.pool).await
    }
}

#[async_trait]
impl BaseDispatchStore for PgDispatchStore {
    async fn find_issue(&self, id: IssueId) -> Result<Option<Issue>> {
        Issue::find_by_id(id, &self.pool).await
    }

    async fn find_property(&self, id: PropertyId) -> Result<Option<Property>> {
        Property::find_by_id(id, &self.pool).await
    }

    async fn find_handyman(&self, id: HandymanId) -> Result<Option<Handyman>> {
        Handyman::find_by_id(id, &self.pool).await
    }

    async fn find_handyman_by_phone(&self, e164: &str) -> Result<Option<Handyman>> {
        Handyman::find_by_phone(e164, &self.pool).await
    }

    async fn list_handymen(&self) -> Result<Vec<Handyman>> {
        Handyman::find_all(&self.pool).await
    }

    async fn completed_jobs_by_property(&self, handyman_id: HandymanId) -> Result<HashMap<PropertyId, u32>> {
        let counts = Issue::completed_counts_by_property(handyman_id, &self.pool).await?;
        Ok(counts
            .into_iter()
            .map(|(property_id, count)| (property_id, u32::try_from(count).unwrap_or(u32::MAX)))
            .collect())
    }

    async fn unassigned_properties_for(&self, handyman_id: HandymanId) -> Result<Vec<Property>> {
        Property::find_unassigned_to(handyman_id, &self.pool).await
    }

    async fn settings_entries(&self) -> Result<HashMap<String, Value>> {
        DispatchSettings::load_entries(&self.pool).await
    }

    async fn find_assignment(&self, id: DispatchAssignmentId) -> Result<Option<DispatchAssignment>> {
        DispatchAssignment::find_by_id(id, &self.pool).await
    }

    async fn assignments_for_issue(&self, issue_id: IssueId) -> Result<Vec<DispatchAssignment>> {
        DispatchAssignment::find_for_issue(issue_id, &self.pool).await
    }

    async fn assignments_for_handyman(&self, handyman_id: HandymanId) -> Result<Vec<DispatchAssignment>> {
        DispatchAssignment::find_for_handyman(handyman_id, &self.pool).await
    }

    async fn pending_assignments(&self) -> Result<Vec<DispatchAssignment>> {
        DispatchAssignment::find_pending(&self.pool).await
    }

    async fn find_by_inbound_sid(&self, inbound_message_sid: &str) -> Result<Option<DispatchAssignment>> {
        DispatchAssignment::find_by_inbound_sid(inbound_message_sid, &self.pool).await
    }

    async fn insert_pending(&self, assignment: DispatchAssignment) -> Result<Option<DispatchAssignment>> {
        assignment.insert_pending(&self.pool).await
    }

    async fn transition_from_pending(
        &self,
        id: DispatchAssignmentId,
        to: DispatchStatus,
        response_time: Option<DateTime<Utc>>,
        inbound_message_sid: Option<&str>,
    ) -> Result<Option<DispatchAssignment>> {
        DispatchAssignment::transition_from_pending(id, to, response_time, inbound_message_sid, &self.pool)
            .await
    }

    async fn claim_follow_up(
        &self,
        id: DispatchAssignmentId,
        expected: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchAssignment>> {
        DispatchAssignment::claim_follow_up(id, expected, now, &self.pool).await
    }

    async fn record_message_sid(&self, id: DispatchAssignmentId, message_sid: &str) -> Result<()> {
        DispatchAssignment::record_message_sid(id, message_sid, &self.pool).await
    }
}
