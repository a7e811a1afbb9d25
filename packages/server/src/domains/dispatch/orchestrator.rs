//! Dispatch orchestration: choose a handyman, create the offer, message them,
//! and drive the offer through replies, cancellation and the escalation sweep.
//!
//! Every status change goes through a compare-and-swap on `pending`, so manual
//! actions, webhooks and sweeps can race freely; the loser sees `AlreadyResolved`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::events::DispatchEvent;
use super::machine::{self, next_sweep_action, DispatchTrigger, SweepAction};
use super::metrics::{compute_metrics, HandymanMetrics};
use super::models::{DispatchAssignment, DispatchSettings, DispatchStatus};
use super::template::{cancellation_message, follow_up_message, render_dispatch};
use crate::common::{normalize_phone, DispatchAssignmentId, DispatchError, HandymanId, IssueId};
use crate::domains::handymen::Handyman;
use crate::domains::issues::{Issue, Property};
use crate::domains::matching::{rank_handymen, rank_properties, MatchCandidate, MatchScore, RankedProperty};
use crate::kernel::stream_hub::issue_topic;
use crate::kernel::{BaseAvailabilityStore, BaseDispatchStore, BaseMessageGateway, ServerDeps};

/// Result of a successful dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchOutcome {
    pub assignment: DispatchAssignment,
    pub message_id: String,
    /// Present when the handyman was picked by the matching engine.
    pub match_score: Option<MatchScore>,
}

/// Counters from one escalation sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub follow_ups_sent: usize,
    pub escalated: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct DispatchOrchestrator {
    deps: ServerDeps,
}

impl DispatchOrchestrator {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &ServerDeps {
        &self.deps
    }

    pub async fn settings(&self) -> Result<DispatchSettings, DispatchError> {
        let entries = self.deps.store.settings_entries().await?;
        DispatchSettings::from_entries(&entries)
    }

    /// Offer an issue to `handyman_id`, or to the best-ranked eligible handyman.
    pub async fn dispatch_issue(
        &self,
        issue_id: IssueId,
        handyman_id: Option<HandymanId>,
    ) -> Result<DispatchOutcome, DispatchError> {
        let settings = self.settings().await?;
        let template = settings.require_template()?.to_string();
        let from = sender_number(&settings)?;

        let issue = self.load_issue(issue_id).await?;
        let property = self.load_property(&issue).await?;

        let (handyman, match_score) = match handyman_id {
            Some(id) => (self.load_handyman(id).await?, None),
            None => {
                let (handyman, score) = self.select_candidate(&issue, &property).await?;
                (handyman, Some(score))
            }
        };

        let to = normalize_phone(&handyman.phone)
            .ok_or_else(|| DispatchError::InvalidPhoneFormat(handyman.phone.clone()))?;

        let pending = DispatchAssignment::pending(issue.id, handyman.id, Utc::now());
        let mut assignment = self
            .deps
            .store
            .insert_pending(pending)
            .await?
            .ok_or(DispatchError::DuplicateAssignment {
                issue_id: issue.id,
                handyman_id: handyman.id,
            })?;

        info!(
            assignment_id = %assignment.id,
            issue_id = %issue.id,
            handyman_id = %handyman.id,
            auto_matched = match_score.is_some(),
            "Dispatch assignment created"
        );
        self.publish(
            issue.id,
            DispatchEvent::AssignmentCreated {
                assignment: assignment.clone(),
            },
        )
        .await;

        let body = render_dispatch(&template, &handyman, &property, &issue);
        let receipt = match self.deps.gateway.send_message(&from, &to, &body).await {
            Ok(receipt) => receipt,
            Err(e) => {
                warn!(
                    assignment_id = %assignment.id,
                    handyman_id = %handyman.id,
                    error = %e,
                    "Dispatch message failed, canceling assignment"
                );
                // Free the pair so the operator can retry
                if let Err(cancel_err) = self.transition(&assignment, DispatchTrigger::Cancel, Utc::now(), None).await {
                    warn!(assignment_id = %assignment.id, error = %cancel_err, "Failed to cancel undelivered assignment");
                }
                return Err(DispatchError::GatewaySendFailure(e.to_string()));
            }
        };

        if let Err(e) = self
            .deps
            .store
            .record_message_sid(assignment.id, &receipt.message_id)
            .await
        {
            warn!(assignment_id = %assignment.id, error = %e, "Failed to record message id");
        }
        assignment.message_sid = Some(receipt.message_id.clone());

        Ok(DispatchOutcome {
            assignment,
            message_id: receipt.message_id,
            match_score,
        })
    }

    /// Interpret an inbound reply and apply it to the sender's latest pending offer.
    ///
    /// `external_id` is the gateway's id for the inbound message. A redelivery of
    /// a reply that was already applied is `AlreadyResolved` and changes nothing.
    pub async fn handle_reply(
        &self,
        from: &str,
        body: &str,
        external_id: Option<&str>,
    ) -> Result<DispatchAssignment, DispatchError> {
        let sender = normalize_phone(from).ok_or_else(|| DispatchError::InvalidPhoneFormat(from.to_string()))?;
        let external_id = external_id.map(str::trim).filter(|id| !id.is_empty());

        if let Some(sid) = external_id {
            if let Some(resolved) = self.deps.store.find_by_inbound_sid(sid).await? {
                debug!(assignment_id = %resolved.id, message_sid = sid, "Reply already applied");
                return Err(already_resolved(&resolved));
            }
        }

        let trigger = DispatchTrigger::from_reply(body).ok_or_else(|| DispatchError::UnmatchedReply {
            from: sender.clone(),
            reason: format!("unrecognized reply {:?}", body.trim()),
        })?;

        let handyman = self
            .deps
            .store
            .find_handyman_by_phone(&sender)
            .await?
            .ok_or_else(|| DispatchError::UnmatchedReply {
                from: sender.clone(),
                reason: "no handyman with this number".to_string(),
            })?;

        let mut history = self.deps.store.assignments_for_handyman(handyman.id).await?;
        history.sort_by_key(|a| a.dispatch_time);

        let target = match history.iter().rev().find(|a| a.status == DispatchStatus::Pending) {
            Some(pending) => pending.clone(),
            None => {
                return Err(match history.last() {
                    Some(latest) => already_resolved(latest),
                    None => DispatchError::UnmatchedReply {
                        from: sender,
                        reason: "no pending assignment".to_string(),
                    },
                })
            }
        };

        debug!(
            assignment_id = %target.id,
            message_sid = external_id.unwrap_or("-"),
            trigger = ?trigger,
            "Applying handyman reply"
        );
        self.transition(&target, trigger, Utc::now(), external_id).await
    }

    /// Operator cancel. The optional notice is best-effort and never undoes the cancel.
    pub async fn cancel_assignment(
        &self,
        assignment_id: DispatchAssignmentId,
        notify_handyman: bool,
    ) -> Result<DispatchAssignment, DispatchError> {
        let assignment = self
            .deps
            .store
            .find_assignment(assignment_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("dispatch assignment", assignment_id))?;

        let canceled = self
            .transition(&assignment, DispatchTrigger::Cancel, Utc::now(), None)
            .await?;

        if notify_handyman {
            if let Err(e) = self.send_cancellation(&canceled).await {
                warn!(assignment_id = %canceled.id, error = %e, "Cancellation notice not delivered");
            }
        }

        Ok(canceled)
    }

    /// Send due follow-ups and escalate exhausted offers. Failures are isolated per row.
    pub async fn run_escalation_sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, DispatchError> {
        let settings = self.settings().await?;
        let pending = self.deps.store.pending_assignments().await?;

        let mut report = SweepReport {
            scanned: pending.len(),
            ..SweepReport::default()
        };

        for assignment in &pending {
            match self.sweep_one(assignment, &settings, now).await {
                Ok(SweepAction::FollowUp { .. }) => report.follow_ups_sent += 1,
                Ok(SweepAction::Escalate) => report.escalated += 1,
                Ok(SweepAction::Wait) => {}
                Err(e) if e.is_benign() => {
                    debug!(assignment_id = %assignment.id, "Assignment resolved during sweep");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(assignment_id = %assignment.id, error = %e, "Escalation sweep failed for assignment");
                }
            }
        }

        if report.follow_ups_sent + report.escalated + report.failed > 0 {
            info!(
                scanned = report.scanned,
                follow_ups = report.follow_ups_sent,
                escalated = report.escalated,
                failed = report.failed,
                "Escalation sweep finished"
            );
        }
        Ok(report)
    }

    pub async fn handyman_metrics(&self, handyman_id: HandymanId) -> Result<HandymanMetrics, DispatchError> {
        self.load_handyman(handyman_id).await?;
        let history = self.deps.store.assignments_for_handyman(handyman_id).await?;
        Ok(compute_metrics(handyman_id, &history))
    }

    /// Properties the handyman is not attached to, best match first.
    pub async fn rank_properties_for_handyman(
        &self,
        handyman_id: HandymanId,
    ) -> Result<Vec<RankedProperty>, DispatchError> {
        let handyman = self.load_handyman(handyman_id).await?;
        let candidate = self.match_candidate(handyman).await?;
        let properties = self.deps.store.unassigned_properties_for(handyman_id).await?;
        Ok(rank_properties(&candidate, &properties))
    }

    async fn sweep_one(
        &self,
        assignment: &DispatchAssignment,
        settings: &DispatchSettings,
        now: DateTime<Utc>,
    ) -> Result<SweepAction, DispatchError> {
        let action = next_sweep_action(assignment, settings, now);
        match action {
            SweepAction::Wait => {}
            SweepAction::FollowUp { attempt } => {
                let claimed = self
                    .deps
                    .store
                    .claim_follow_up(assignment.id, attempt - 1, now)
                    .await?;
                let Some(claimed) = claimed else {
                    // Another sweep or a reply got there first
                    return Ok(SweepAction::Wait);
                };
                self.send_follow_up(&claimed, settings, attempt).await?;
                info!(assignment_id = %claimed.id, attempt, "Follow-up sent");
                self.publish(
                    claimed.issue_id,
                    DispatchEvent::FollowUpSent {
                        assignment_id: claimed.id,
                        attempt,
                        sent_at: now,
                    },
                )
                .await;
            }
            SweepAction::Escalate => {
                let escalated = self.transition(assignment, DispatchTrigger::Escalate, now, None).await?;
                warn!(
                    assignment_id = %escalated.id,
                    issue_id = %escalated.issue_id,
                    handyman_id = %escalated.handyman_id,
                    "No reply within retry budget, assignment escalated"
                );
            }
        }
        Ok(action)
    }

    /// Move `assignment` out of `pending` and publish the change. Accepting assigns
    /// the issue in the same store write.
    async fn transition(
        &self,
        assignment: &DispatchAssignment,
        trigger: DispatchTrigger,
        now: DateTime<Utc>,
        inbound_message_sid: Option<&str>,
    ) -> Result<DispatchAssignment, DispatchError> {
        let target = machine::apply(assignment.status, trigger).map_err(|_| already_resolved(assignment))?;
        let response_time = trigger.stamps_response().then_some(now);

        let updated = match self
            .deps
            .store
            .transition_from_pending(assignment.id, target, response_time, inbound_message_sid)
            .await?
        {
            Some(updated) => updated,
            None => {
                // A concurrent redelivery of the same reply won on another row
                if let Some(sid) = inbound_message_sid {
                    if let Some(resolved) = self.deps.store.find_by_inbound_sid(sid).await? {
                        return Err(already_resolved(&resolved));
                    }
                }
                let current = self
                    .deps
                    .store
                    .find_assignment(assignment.id)
                    .await?
                    .ok_or_else(|| DispatchError::not_found("dispatch assignment", assignment.id))?;
                return Err(already_resolved(&current));
            }
        };

        info!(
            assignment_id = %updated.id,
            from = %DispatchStatus::Pending,
            to = %updated.status,
            "Dispatch assignment transitioned"
        );

        self.publish(
            updated.issue_id,
            DispatchEvent::AssignmentTransitioned {
                assignment: updated.clone(),
                from: DispatchStatus::Pending,
            },
        )
        .await;

        Ok(updated)
    }

    async fn select_candidate(
        &self,
        issue: &Issue,
        property: &Property,
    ) -> Result<(Handyman, MatchScore), DispatchError> {
        let previously_offered: HashSet<HandymanId> = self
            .deps
            .store
            .assignments_for_issue(issue.id)
            .await?
            .into_iter()
            .map(|a| a.handyman_id)
            .collect();
        let today = Utc::now().date_naive();

        let mut candidates = Vec::new();
        for handyman in self.deps.store.list_handymen().await? {
            if !handyman.availability_status.accepts_offers() || previously_offered.contains(&handyman.id) {
                continue;
            }
            let time_off = self.deps.store.time_off_for(handyman.id).await?;
            if time_off.iter().any(|t| t.blocks(today)) {
                debug!(handyman_id = %handyman.id, "Skipping handyman on time off");
                continue;
            }
            candidates.push(self.match_candidate(handyman).await?);
        }

        rank_handymen(property, &candidates)
            .into_iter()
            .next()
            .map(|best| (best.handyman, best.score))
            .ok_or(DispatchError::NoCandidates(issue.id))
    }

    async fn match_candidate(&self, handyman: Handyman) -> Result<MatchCandidate, DispatchError> {
        let coverage = self.deps.store.coverage_for(handyman.id).await?;
        let completed = self.deps.store.completed_jobs_by_property(handyman.id).await?;
        Ok(MatchCandidate::new(handyman, coverage, completed))
    }

    async fn send_follow_up(
        &self,
        assignment: &DispatchAssignment,
        settings: &DispatchSettings,
        attempt: i32,
    ) -> Result<(), DispatchError> {
        let from = sender_number(settings)?;
        let handyman = self.load_handyman(assignment.handyman_id).await?;
        let issue = self.load_issue(assignment.issue_id).await?;
        let to = normalize_phone(&handyman.phone)
            .ok_or_else(|| DispatchError::InvalidPhoneFormat(handyman.phone.clone()))?;

        self.deps
            .gateway
            .send_message(&from, &to, &follow_up_message(&issue, attempt))
            .await
            .map_err(|e| DispatchError::GatewaySendFailure(e.to_string()))?;
        Ok(())
    }

    async fn send_cancellation(&self, assignment: &DispatchAssignment) -> Result<(), DispatchError> {
        let settings = self.settings().await?;
        let from = sender_number(&settings)?;
        let handyman = self.load_handyman(assignment.handyman_id).await?;
        let issue = self.load_issue(assignment.issue_id).await?;
        let to = normalize_phone(&handyman.phone)
            .ok_or_else(|| DispatchError::InvalidPhoneFormat(handyman.phone.clone()))?;

        self.deps
            .gateway
            .send_message(&from, &to, &cancellation_message(&issue))
            .await
            .map_err(|e| DispatchError::GatewaySendFailure(e.to_string()))?;
        Ok(())
    }

    async fn publish(&self, issue_id: IssueId, event: DispatchEvent) {
        self.deps
            .stream_hub
            .publish_scoped(&issue_topic(issue_id), event)
            .await;
    }

    async fn load_issue(&self, id: IssueId) -> Result<Issue, DispatchError> {
        self.deps
            .store
            .find_issue(id)
            .await?
            .ok_or_else(|| DispatchError::not_found("issue", id))
    }

    async fn load_property(&self, issue: &Issue) -> Result<Property, DispatchError> {
        self.deps
            .store
            .find_property(issue.property_id)
            .await?
            .ok_or_else(|| DispatchError::not_found("property", issue.property_id))
    }

    async fn load_handyman(&self, id: HandymanId) -> Result<Handyman, DispatchError> {
        self.deps
            .store
            .find_handyman(id)
            .await?
            .ok_or_else(|| DispatchError::not_found("handyman", id))
    }
}

fn sender_number(settings: &DispatchSettings) -> Result<String, DispatchError> {
    let raw = settings.require_whatsapp_number()?;
    normalize_phone(raw).ok_or_else(|| DispatchError::InvalidPhoneFormat(raw.to_string()))
}

fn already_resolved(assignment: &DispatchAssignment) -> DispatchError {
    DispatchError::AlreadyResolved {
        entity: "dispatch assignment",
        id: assignment.id.into_uuid(),
        status: assignment.status.to_string(),
    }
}
