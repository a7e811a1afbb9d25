// Test dependencies - in-process implementations of the kernel traits
//
// InMemoryDispatchStore mirrors the compare-and-swap semantics of the Postgres
// store (conditional insert on pending pairs, UPDATE .. WHERE status = 'pending')
// under a single lock, so orchestrator races can be exercised without a database.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use super::{BaseAvailabilityStore, BaseDispatchStore, BaseMessageGateway, SendReceipt, ServerDeps, StreamHub};
use crate::common::{
    normalize_phone, CoverageAreaId, DispatchAssignmentId, HandymanId, IssueId, PropertyId,
    TimeOffId,
};
use crate::domains::dispatch::models::{DispatchAssignment, DispatchStatus};
use crate::domains::handymen::models::{
    CoverageArea, Handyman, TimeOff, TimeOffStatus, WeeklyAvailability,
};
use crate::domains::issues::{Issue, IssueStatus, Property};

// =============================================================================
// In-memory Dispatch Store
// =============================================================================

#[derive(Default)]
struct StoreState {
    issues: HashMap<IssueId, Issue>,
    properties: Vec<Property>,
    handymen: Vec<Handyman>,
    coverage: Vec<CoverageArea>,
    weekly: Vec<WeeklyAvailability>,
    time_off: Vec<TimeOff>,
    assignments: Vec<DispatchAssignment>,
    settings: HashMap<String, Value>,
    attachments: HashSet<(PropertyId, HandymanId)>,
}

#[derive(Clone, Default)]
pub struct InMemoryDispatchStore {
    state: Arc<Mutex<StoreState>>,
    fail_week_writes: Arc<AtomicBool>,
    fail_accepts: Arc<AtomicBool>,
}

impl InMemoryDispatchStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_property(self, property: Property) -> Self {
        self.state.lock().unwrap().properties.push(property);
        self
    }

    pub fn with_issue(self, issue: Issue) -> Self {
        self.state.lock().unwrap().issues.insert(issue.id, issue);
        self
    }

    pub fn with_handyman(self, handyman: Handyman) -> Self {
        self.state.lock().unwrap().handymen.push(handyman);
        self
    }

    pub fn with_coverage(self, area: CoverageArea) -> Self {
        self.state.lock().unwrap().coverage.push(area);
        self
    }

    pub fn with_time_off(self, time_off: TimeOff) -> Self {
        self.state.lock().unwrap().time_off.push(time_off);
        self
    }

    pub fn with_assignment(self, assignment: DispatchAssignment) -> Self {
        self.state.lock().unwrap().assignments.push(assignment);
        self
    }

    pub fn with_attachment(self, property_id: PropertyId, handyman_id: HandymanId) -> Self {
        self.state
            .lock()
            .unwrap()
            .attachments
            .insert((property_id, handyman_id));
        self
    }

    pub fn with_setting(self, key: &str, value: Value) -> Self {
        self.state
            .lock()
            .unwrap()
            .settings
            .insert(key.to_string(), value);
        self
    }

    /// Make the next weekly schedule writes fail before touching any row.
    pub fn fail_week_writes(&self, fail: bool) {
        self.fail_week_writes.store(fail, Ordering::SeqCst);
    }

    /// Make accept transitions fail as a whole, the way a rolled-back transaction does.
    pub fn fail_accepts(&self, fail: bool) {
        self.fail_accepts.store(fail, Ordering::SeqCst);
    }

    pub fn assignments(&self) -> Vec<DispatchAssignment> {
        self.state.lock().unwrap().assignments.clone()
    }

    pub fn issue(&self, id: IssueId) -> Option<Issue> {
        self.state.lock().unwrap().issues.get(&id).cloned()
    }

    pub fn week_rows(&self, handyman_id: HandymanId) -> Vec<WeeklyAvailability> {
        self.state
            .lock()
            .unwrap()
            .weekly
            .iter()
            .filter(|row| row.handyman_id == handyman_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl BaseAvailabilityStore for InMemoryDispatchStore {
    async fn weekly_availability(&self, handyman_id: HandymanId) -> Result<Vec<WeeklyAvailability>> {
        let mut rows = self.week_rows(handyman_id);
        rows.sort_by_key(|row| row.day_of_week);
        Ok(rows)
    }

    async fn replace_week(
        &self,
        handyman_id: HandymanId,
        rows: Vec<WeeklyAvailability>,
    ) -> Result<Vec<WeeklyAvailability>> {
        if self.fail_week_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("weekly_availability write failed"));
        }
        let mut state = self.state.lock().unwrap();
        state.weekly.retain(|row| row.handyman_id != handyman_id);
        state.weekly.extend(rows.iter().cloned());
        Ok(rows)
    }

    async fn time_off_for(&self, handyman_id: HandymanId) -> Result<Vec<TimeOff>> {
        let state = self.state.lock().unwrap();
        let mut entries: Vec<TimeOff> = state
            .time_off
            .iter()
            .filter(|t| t.handyman_id == handyman_id)
            .cloned()
            .collect();
        entries.sort_by_key(|t| t.start_date);
        Ok(entries)
    }

    async fn find_time_off(&self, id: TimeOffId) -> Result<Option<TimeOff>> {
        let state = self.state.lock().unwrap();
        Ok(state.time_off.iter().find(|t| t.id == id).cloned())
    }

    async fn insert_time_off(&self, time_off: TimeOff) -> Result<TimeOff> {
        self.state.lock().unwrap().time_off.push(time_off.clone());
        Ok(time_off)
    }

    async fn decide_time_off(&self, id: TimeOffId, decision: TimeOffStatus) -> Result<Option<TimeOff>> {
        let mut state = self.state.lock().unwrap();
        let entry = state
            .time_off
            .iter_mut()
            .find(|t| t.id == id && t.status == TimeOffStatus::Requested);
        Ok(entry.map(|t| {
            t.status = decision;
            t.decided_at = Some(Utc::now());
            t.clone()
        }))
    }

    async fn coverage_for(&self, handyman_id: HandymanId) -> Result<Vec<CoverageArea>> {
        let state = self.state.lock().unwrap();
        let mut areas: Vec<CoverageArea> = state
            .coverage
            .iter()
            .filter(|a| a.handyman_id == handyman_id)
            .cloned()
            .collect();
        CoverageArea::sort_for_scan(&mut areas);
        Ok(areas)
    }

    async fn insert_coverage(&self, area: CoverageArea) -> Result<CoverageArea> {
        self.state.lock().unwrap().coverage.push(area.clone());
        Ok(area)
    }

    async fn delete_coverage(&self, id: CoverageAreaId) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let before = state.coverage.len();
        state.coverage.retain(|a| a.id != id);
        Ok(state.coverage.len() != before)
    }
}

#[async_trait]
impl BaseDispatchStore for InMemoryDispatchStore {
    async fn find_issue(&self, id: IssueId) -> Result<Option<Issue>> {
        Ok(self.issue(id))
    }

    async fn find_property(&self, id: PropertyId) -> Result<Option<Property>> {
        let state = self.state.lock().unwrap();
        Ok(state.properties.iter().find(|p| p.id == id).cloned())
    }

    async fn find_handyman(&self, id: HandymanId) -> Result<Option<Handyman>> {
        let state = self.state.lock().unwrap();
        Ok(state.handymen.iter().find(|h| h.id == id).cloned())
    }

    async fn find_handyman_by_phone(&self, e164: &str) -> Result<Option<Handyman>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .handymen
            .iter()
            .find(|h| normalize_phone(&h.phone).as_deref() == Some(e164))
            .cloned())
    }

    async fn list_handymen(&self) -> Result<Vec<Handyman>> {
        let state = self.state.lock().unwrap();
        let mut handymen = state.handymen.clone();
        handymen.sort_by_key(|h| h.id);
        Ok(handymen)
    }

    async fn completed_jobs_by_property(&self, handyman_id: HandymanId) -> Result<HashMap<PropertyId, u32>> {
        let state = self.state.lock().unwrap();
        let mut counts = HashMap::new();
        for issue in state.issues.values().filter(|i| {
            i.assigned_handyman_id == Some(handyman_id) && i.status == IssueStatus::Resolved
        }) {
            *counts.entry(issue.property_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn unassigned_properties_for(&self, handyman_id: HandymanId) -> Result<Vec<Property>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .properties
            .iter()
            .filter(|p| !state.attachments.contains(&(p.id, handyman_id)))
            .cloned()
            .collect())
    }

    async fn settings_entries(&self) -> Result<HashMap<String, Value>> {
        Ok(self.state.lock().unwrap().settings.clone())
    }

    async fn find_assignment(&self, id: DispatchAssignmentId) -> Result<Option<DispatchAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state.assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn assignments_for_issue(&self, issue_id: IssueId) -> Result<Vec<DispatchAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.issue_id == issue_id)
            .cloned()
            .collect())
    }

    async fn assignments_for_handyman(&self, handyman_id: HandymanId) -> Result<Vec<DispatchAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.handyman_id == handyman_id)
            .cloned()
            .collect())
    }

    async fn pending_assignments(&self) -> Result<Vec<DispatchAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .filter(|a| a.status == DispatchStatus::Pending)
            .cloned()
            .collect())
    }

    async fn find_by_inbound_sid(&self, inbound_message_sid: &str) -> Result<Option<DispatchAssignment>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .assignments
            .iter()
            .find(|a| a.inbound_message_sid.as_deref() == Some(inbound_message_sid))
            .cloned())
    }

    async fn insert_pending(&self, assignment: DispatchAssignment) -> Result<Option<DispatchAssignment>> {
        let mut state = self.state.lock().unwrap();
        let taken = state.assignments.iter().any(|a| {
            a.issue_id == assignment.issue_id
                && a.handyman_id == assignment.handyman_id
                && a.status == DispatchStatus::Pending
        });
        if taken {
            return Ok(None);
        }
        state.assignments.push(assignment.clone());
        Ok(Some(assignment))
    }

    async fn transition_from_pending(
        &self,
        id: DispatchAssignmentId,
        to: DispatchStatus,
        response_time: Option<DateTime<Utc>>,
        inbound_message_sid: Option<&str>,
    ) -> Result<Option<DispatchAssignment>> {
        if self.fail_accepts.load(Ordering::SeqCst) && to == DispatchStatus::Accepted {
            return Err(anyhow!("issues write failed"));
        }

        let mut state = self.state.lock().unwrap();
        if let Some(sid) = inbound_message_sid {
            if state
                .assignments
                .iter()
                .any(|a| a.inbound_message_sid.as_deref() == Some(sid))
            {
                return Ok(None);
            }
        }

        let Some(row) = state
            .assignments
            .iter_mut()
            .find(|a| a.id == id && a.status == DispatchStatus::Pending)
        else {
            return Ok(None);
        };
        row.status = to;
        row.response_time = row.response_time.or(response_time);
        if row.inbound_message_sid.is_none() {
            row.inbound_message_sid = inbound_message_sid.map(str::to_string);
        }
        let updated = row.clone();

        if to == DispatchStatus::Accepted {
            if let Some(issue) = state.issues.get_mut(&updated.issue_id) {
                issue.assigned_handyman_id = Some(updated.handyman_id);
                if issue.status == IssueStatus::Open {
                    issue.status = IssueStatus::InProgress;
                }
            }
        }
        Ok(Some(updated))
    }

    async fn claim_follow_up(
        &self,
        id: DispatchAssignmentId,
        expected: i32,
        now: DateTime<Utc>,
    ) -> Result<Option<DispatchAssignment>> {
        let mut state = self.state.lock().unwrap();
        let row = state.assignments.iter_mut().find(|a| {
            a.id == id && a.status == DispatchStatus::Pending && a.follow_up_count == expected
        });
        Ok(row.map(|a| {
            a.follow_up_count += 1;
            a.last_follow_up_at = Some(now);
            a.clone()
        }))
    }

    async fn record_message_sid(&self, id: DispatchAssignmentId, message_sid: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(a) = state.assignments.iter_mut().find(|a| a.id == id) {
            a.message_sid = Some(message_sid.to_string());
        }
        Ok(())
    }
}

// =============================================================================
// Mock Message Gateway
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub from: String,
    pub to: String,
    pub body: String,
}

#[derive(Clone, Default)]
pub struct MockMessageGateway {
    sent: Arc<Mutex<Vec<SentMessage>>>,
    failing: Arc<Mutex<HashSet<String>>>,
    fail_all: Arc<AtomicBool>,
    counter: Arc<AtomicUsize>,
}

impl MockMessageGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails until reset.
    pub fn failing() -> Self {
        let gateway = Self::default();
        gateway.set_fail_all(true);
        gateway
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Fail sends addressed to one number.
    pub fn fail_to(&self, to: &str) {
        self.failing.lock().unwrap().insert(to.to_string());
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, to: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.to == to)
            .collect()
    }
}

#[async_trait]
impl BaseMessageGateway for MockMessageGateway {
    async fn send_message(&self, from: &str, to: &str, body: &str) -> Result<SendReceipt> {
        if self.fail_all.load(Ordering::SeqCst) || self.failing.lock().unwrap().contains(to) {
            return Err(anyhow!("mock gateway refused message to {}", to));
        }

        self.sent.lock().unwrap().push(SentMessage {
            from: from.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        });
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendReceipt {
            message_id: format!("SM{:032}", n),
        })
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Handles to the in-memory doubles behind a `ServerDeps`.
#[derive(Clone)]
pub struct TestDependencies {
    pub store: InMemoryDispatchStore,
    pub gateway: MockMessageGateway,
    pub stream_hub: StreamHub<crate::domains::dispatch::events::DispatchEvent>,
}

impl TestDependencies {
    pub fn new(store: InMemoryDispatchStore) -> Self {
        Self {
            store,
            gateway: MockMessageGateway::new(),
            stream_hub: StreamHub::new(),
        }
    }

    pub fn with_gateway(mut self, gateway: MockMessageGateway) -> Self {
        self.gateway = gateway;
        self
    }

    pub fn server_deps(&self) -> ServerDeps {
        ServerDeps::new(
            Arc::new(self.store.clone()),
            Arc::new(self.gateway.clone()),
            self.stream_hub.clone(),
        )
    }
}
