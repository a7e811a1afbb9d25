//! End-to-end dispatch flows over the in-memory store and mock gateway.

mod common;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use common::*;
use dispatch_core::common::DispatchError;
use dispatch_core::domains::dispatch::{
    DispatchAssignment, DispatchEvent, DispatchOrchestrator, DispatchStatus,
};
use dispatch_core::domains::handymen::{TimeOff, TimeOffStatus};
use dispatch_core::domains::issues::IssueStatus;
use dispatch_core::kernel::stream_hub::{issue_topic, ALL_EVENTS};
use dispatch_core::kernel::test_dependencies::MockMessageGateway;
use serde_json::json;

// =============================================================================
// Dispatch
// =============================================================================

#[tokio::test]
async fn auto_match_offers_issue_to_best_ranked_handyman() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();

    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();

    assert_eq!(outcome.assignment.handyman_id, world.h1.id);
    assert_eq!(outcome.assignment.status, DispatchStatus::Pending);
    assert_eq!(outcome.assignment.follow_up_count, 0);
    assert_eq!(outcome.assignment.message_sid.as_deref(), Some(outcome.message_id.as_str()));

    let score = outcome.match_score.expect("auto-match reports a score");
    assert_eq!(score.distance_score, 100.0);
    assert_eq!(score.coverage_priority, Some(1));

    let sent = deps.gateway.sent_to(H1_E164);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].from, DISPATCH_NUMBER);
    assert!(sent[0].body.starts_with("Hi Dana Reyes, High job at Riverside Lofts"));
    assert!(deps.gateway.sent_to(H2_E164).is_empty());
}

#[tokio::test]
async fn explicit_handyman_skips_matching() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();

    let outcome = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h2.id))
        .await
        .unwrap();

    assert_eq!(outcome.assignment.handyman_id, world.h2.id);
    assert!(outcome.match_score.is_none());
    assert_eq!(deps.gateway.sent_to(H2_E164).len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_dispatches_for_same_pair_create_one_assignment() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let orchestrator = orchestrator.clone();
        let issue_id = world.issue.id;
        let handyman_id = world.h1.id;
        tasks.push(tokio::spawn(async move {
            orchestrator.dispatch_issue(issue_id, Some(handyman_id)).await
        }));
    }

    let mut created = 0;
    let mut duplicates = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(DispatchError::DuplicateAssignment { .. }) => duplicates += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(created, 1);
    assert_eq!(duplicates, 9);
    assert_eq!(world.store.assignments().len(), 1);
    assert_eq!(deps.gateway.sent().len(), 1);
}

#[tokio::test]
async fn missing_template_fails_before_anything_is_written() {
    let world = World::unconfigured().with_setting("whatsappNumber", json!(DISPATCH_NUMBER));
    let (orchestrator, deps) = world.orchestrator();

    let err = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ConfigurationMissing("dispatchTemplate")));
    assert!(world.store.assignments().is_empty());
    assert!(deps.gateway.sent().is_empty());
}

#[tokio::test]
async fn missing_sender_number_is_configuration_error() {
    let world = World::unconfigured().with_setting("dispatchTemplate", json!(TEMPLATE));
    let (orchestrator, _deps) = world.orchestrator();

    let err = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::ConfigurationMissing("whatsappNumber")));
}

#[tokio::test]
async fn unusable_handyman_phone_rejects_dispatch() {
    let world = World::new();
    let broken = handyman("No Phone", "ask at desk", &["painting"]);
    world.store.clone().with_handyman(broken.clone());
    let (orchestrator, deps) = world.orchestrator();

    let err = orchestrator
        .dispatch_issue(world.issue.id, Some(broken.id))
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::InvalidPhoneFormat(_)));
    assert!(world.store.assignments().is_empty());
    assert!(deps.gateway.sent().is_empty());
}

#[tokio::test]
async fn gateway_failure_cancels_the_new_assignment() {
    let world = World::new();
    let deps = world.deps_with_gateway(MockMessageGateway::failing());
    let orchestrator = DispatchOrchestrator::new(deps.server_deps());

    let err = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::GatewaySendFailure(_)));

    let rows = world.store.assignments();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DispatchStatus::Canceled);

    // The pair is free again once the gateway recovers
    deps.gateway.set_fail_all(false);
    let retry = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();
    assert_eq!(retry.assignment.status, DispatchStatus::Pending);
}

#[tokio::test]
async fn redispatch_skips_handymen_already_offered_the_issue() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();

    let first = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    assert_eq!(first.assignment.handyman_id, world.h1.id);
    orchestrator.handle_reply(H1_E164, "2", None).await.unwrap();

    let second = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    assert_eq!(second.assignment.handyman_id, world.h2.id);

    orchestrator.handle_reply(H2_E164, "no thanks", None).await.unwrap();
    let err = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap_err();
    assert!(matches!(err, DispatchError::NoCandidates(id) if id == world.issue.id));
}

#[tokio::test]
async fn auto_match_skips_handyman_on_approved_time_off() {
    let world = World::new();
    let today = Utc::now().date_naive();
    let mut away = TimeOff::requested(world.h1.id, today - Duration::days(1), today + Duration::days(1), None);
    away.status = TimeOffStatus::Approved;
    world.store.clone().with_time_off(away);
    let (orchestrator, _deps) = world.orchestrator();

    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();

    assert_eq!(outcome.assignment.handyman_id, world.h2.id);
}

#[tokio::test]
async fn requested_time_off_does_not_block_matching() {
    let world = World::new();
    let today = Utc::now().date_naive();
    world
        .store
        .clone()
        .with_time_off(TimeOff::requested(world.h1.id, today, today, Some("dentist".into())));
    let (orchestrator, _deps) = world.orchestrator();

    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();

    assert_eq!(outcome.assignment.handyman_id, world.h1.id);
}

// =============================================================================
// Replies
// =============================================================================

#[tokio::test]
async fn accept_reply_assigns_issue_and_replay_is_a_no_op() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    orchestrator.dispatch_issue(world.issue.id, Some(world.h1.id)).await.unwrap();

    let accepted = orchestrator
        .handle_reply("whatsapp:+1 512 555 0101", "1", Some("SM-a"))
        .await
        .unwrap();
    assert_eq!(accepted.status, DispatchStatus::Accepted);
    let response_time = accepted.response_time.expect("accept stamps response time");

    let issue = world.store.issue(world.issue.id).unwrap();
    assert_eq!(issue.assigned_handyman_id, Some(world.h1.id));
    assert_eq!(issue.status, IssueStatus::InProgress);

    // Twilio retries the same webhook
    let replay = orchestrator
        .handle_reply("whatsapp:+15125550101", "1", Some("SM-a"))
        .await
        .unwrap_err();
    assert!(replay.is_benign());

    let rows = world.store.assignments();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, DispatchStatus::Accepted);
    assert_eq!(rows[0].response_time, Some(response_time));
}

#[tokio::test]
async fn decline_reply_leaves_issue_open() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    orchestrator.dispatch_issue(world.issue.id, Some(world.h1.id)).await.unwrap();

    let declined = orchestrator.handle_reply(H1_E164, "Decline", None).await.unwrap();

    assert_eq!(declined.status, DispatchStatus::Declined);
    assert!(declined.response_time.is_some());
    let issue = world.store.issue(world.issue.id).unwrap();
    assert_eq!(issue.status, IssueStatus::Open);
    assert!(issue.assigned_handyman_id.is_none());
}

#[tokio::test]
async fn reply_targets_the_latest_pending_offer() {
    let world = World::new();
    let older = DispatchAssignment::pending(
        dispatch_core::common::IssueId::new(),
        world.h1.id,
        Utc::now() - Duration::hours(3),
    );
    let world = world.with_assignment(older.clone());
    let (orchestrator, _deps) = world.orchestrator();
    let newer = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();

    let accepted = orchestrator.handle_reply(H1_E164, "yes", None).await.unwrap();

    assert_eq!(accepted.id, newer.assignment.id);
    let rows = world.store.assignments();
    let untouched = rows.iter().find(|a| a.id == older.id).unwrap();
    assert_eq!(untouched.status, DispatchStatus::Pending);
}

#[tokio::test]
async fn redelivered_reply_never_resolves_a_second_offer() {
    let world = World::new();
    let older = DispatchAssignment::pending(
        dispatch_core::common::IssueId::new(),
        world.h1.id,
        Utc::now() - Duration::hours(3),
    );
    let world = world.with_assignment(older.clone());
    let (orchestrator, _deps) = world.orchestrator();
    let newer = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();

    let first = orchestrator.handle_reply(H1_E164, "1", Some("SM-dup")).await.unwrap();
    assert_eq!(first.id, newer.assignment.id);
    assert_eq!(first.inbound_message_sid.as_deref(), Some("SM-dup"));

    let replay = orchestrator
        .handle_reply(H1_E164, "1", Some("SM-dup"))
        .await
        .unwrap_err();
    assert!(matches!(replay, DispatchError::AlreadyResolved { .. }));
    let rows = world.store.assignments();
    let untouched = rows.iter().find(|a| a.id == older.id).unwrap();
    assert_eq!(untouched.status, DispatchStatus::Pending);

    // A new message still reaches the older offer
    let next = orchestrator.handle_reply(H1_E164, "2", Some("SM-next")).await.unwrap();
    assert_eq!(next.id, older.id);
    assert_eq!(next.status, DispatchStatus::Declined);
}

#[tokio::test]
async fn failed_accept_leaves_offer_and_issue_untouched() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    orchestrator.dispatch_issue(world.issue.id, Some(world.h1.id)).await.unwrap();

    world.store.fail_accepts(true);
    let err = orchestrator.handle_reply(H1_E164, "1", Some("SM-1")).await.unwrap_err();
    assert!(!err.is_benign());
    assert_eq!(world.store.assignments()[0].status, DispatchStatus::Pending);
    assert!(world.store.assignments()[0].inbound_message_sid.is_none());
    let issue = world.store.issue(world.issue.id).unwrap();
    assert_eq!(issue.status, IssueStatus::Open);
    assert!(issue.assigned_handyman_id.is_none());

    // Twilio retries the webhook once the store recovers
    world.store.fail_accepts(false);
    let accepted = orchestrator.handle_reply(H1_E164, "1", Some("SM-1")).await.unwrap();
    assert_eq!(accepted.status, DispatchStatus::Accepted);
    let issue = world.store.issue(world.issue.id).unwrap();
    assert_eq!(issue.status, IssueStatus::InProgress);
    assert_eq!(issue.assigned_handyman_id, Some(world.h1.id));
}

#[tokio::test]
async fn unrecognized_replies_are_unmatched() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    orchestrator.dispatch_issue(world.issue.id, Some(world.h1.id)).await.unwrap();

    let gibberish = orchestrator.handle_reply(H1_E164, "maybe later", None).await.unwrap_err();
    assert!(matches!(gibberish, DispatchError::UnmatchedReply { .. }));

    let stranger = orchestrator.handle_reply("+15559998888", "1", None).await.unwrap_err();
    assert!(matches!(stranger, DispatchError::UnmatchedReply { .. }));

    let garbage = orchestrator.handle_reply("not a number", "1", None).await.unwrap_err();
    assert!(matches!(garbage, DispatchError::InvalidPhoneFormat(_)));

    // Nothing moved
    assert_eq!(world.store.assignments()[0].status, DispatchStatus::Pending);
}

#[tokio::test]
async fn reply_without_any_offer_is_unmatched() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();

    let err = orchestrator.handle_reply(H2_E164, "1", None).await.unwrap_err();

    assert!(matches!(err, DispatchError::UnmatchedReply { .. }));
}

// =============================================================================
// Cancel
// =============================================================================

#[tokio::test]
async fn cancel_survives_undeliverable_notice() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();

    deps.gateway.fail_to(H1_E164);
    let canceled = orchestrator
        .cancel_assignment(outcome.assignment.id, true)
        .await
        .unwrap();

    assert_eq!(canceled.status, DispatchStatus::Canceled);
    assert!(canceled.response_time.is_none());
    assert_eq!(world.store.assignments()[0].status, DispatchStatus::Canceled);
}

#[tokio::test]
async fn cancel_notifies_handyman_when_asked() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();

    orchestrator.cancel_assignment(outcome.assignment.id, true).await.unwrap();

    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
}

#[tokio::test]
async fn reply_after_cancel_is_already_resolved() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    let outcome = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();
    orchestrator.cancel_assignment(outcome.assignment.id, false).await.unwrap();

    let err = orchestrator.handle_reply(H1_E164, "1", None).await.unwrap_err();
    assert!(err.is_benign());

    let again = orchestrator
        .cancel_assignment(outcome.assignment.id, false)
        .await
        .unwrap_err();
    assert!(again.is_benign());

    let issue = world.store.issue(world.issue.id).unwrap();
    assert!(issue.assigned_handyman_id.is_none());
}

#[tokio::test]
async fn cancel_unknown_assignment_is_not_found() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();

    let err = orchestrator
        .cancel_assignment(dispatch_core::common::DispatchAssignmentId::new(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::NotFound { .. }));
}

// =============================================================================
// Escalation sweep
// =============================================================================

#[tokio::test]
async fn unanswered_offer_gets_follow_up_then_escalates() {
    let world = World::new().with_setting("maxRetries", json!(1));
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    let dispatched_at = outcome.assignment.dispatch_time;

    let early = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::minutes(10))
        .await
        .unwrap();
    assert_eq!(early.scanned, 1);
    assert_eq!(early.follow_ups_sent, 0);

    let first = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::minutes(30))
        .await
        .unwrap();
    assert_eq!(first.follow_ups_sent, 1);
    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
    assert_eq!(world.store.assignments()[0].follow_up_count, 1);

    let between = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::minutes(45))
        .await
        .unwrap();
    assert_eq!(between.follow_ups_sent + between.escalated, 0);

    let last = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::minutes(60))
        .await
        .unwrap();
    assert_eq!(last.escalated, 1);

    let row = &world.store.assignments()[0];
    assert_eq!(row.status, DispatchStatus::Escalated);
    assert!(row.response_time.is_none());
    // Escalation does not message anyone
    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
}

#[tokio::test]
async fn sweep_run_twice_in_one_tick_sends_one_follow_up() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    let tick = outcome.assignment.dispatch_time + Duration::minutes(30);

    let first = orchestrator.run_escalation_sweep(tick).await.unwrap();
    let second = orchestrator.run_escalation_sweep(tick).await.unwrap();

    assert_eq!(first.follow_ups_sent, 1);
    assert_eq!(second.follow_ups_sent + second.escalated + second.failed, 0);
    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
    assert_eq!(world.store.assignments()[0].follow_up_count, 1);
}

#[tokio::test]
async fn huge_response_timeout_is_capped_instead_of_overflowing() {
    let world = World::new().with_setting("responseTimeout", json!(1_000_000_000_000_000_i64));
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    let dispatched_at = outcome.assignment.dispatch_time;

    let quiet = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::days(6))
        .await
        .unwrap();
    assert_eq!(quiet.follow_ups_sent + quiet.failed, 0);

    let capped = orchestrator
        .run_escalation_sweep(dispatched_at + Duration::weeks(1))
        .await
        .unwrap();
    assert_eq!(capped.follow_ups_sent, 1);
    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
}

#[tokio::test]
async fn sweep_is_idle_when_auto_escalate_is_off() {
    let world = World::new().with_setting("autoEscalate", json!(false));
    let (orchestrator, deps) = world.orchestrator();
    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();

    let report = orchestrator
        .run_escalation_sweep(outcome.assignment.dispatch_time + Duration::days(2))
        .await
        .unwrap();

    assert_eq!(report.follow_ups_sent + report.escalated, 0);
    assert_eq!(deps.gateway.sent().len(), 1);
}

#[tokio::test]
async fn one_failed_follow_up_does_not_stop_the_sweep() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();
    let a = orchestrator
        .dispatch_issue(world.issue.id, Some(world.h1.id))
        .await
        .unwrap();
    orchestrator
        .dispatch_issue(world.issue.id, Some(world.h2.id))
        .await
        .unwrap();

    deps.gateway.fail_to(H2_E164);
    let report = orchestrator
        .run_escalation_sweep(a.assignment.dispatch_time + Duration::minutes(31))
        .await
        .unwrap();

    assert_eq!(report.scanned, 2);
    assert_eq!(report.follow_ups_sent, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(deps.gateway.sent_to(H1_E164).len(), 2);
}

#[tokio::test]
async fn answered_offers_are_not_swept() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    orchestrator.handle_reply(H1_E164, "1", None).await.unwrap();

    let report = orchestrator
        .run_escalation_sweep(outcome.assignment.dispatch_time + Duration::days(1))
        .await
        .unwrap();

    assert_eq!(report, Default::default());
    assert_eq!(world.store.assignments()[0].status, DispatchStatus::Accepted);
}

// =============================================================================
// Events and reporting
// =============================================================================

#[tokio::test]
async fn assignment_changes_are_published_per_issue_and_globally() {
    let world = World::new();
    let (orchestrator, deps) = world.orchestrator();
    let mut issue_rx = deps.stream_hub.subscribe(&issue_topic(world.issue.id)).await;
    let mut all_rx = deps.stream_hub.subscribe(ALL_EVENTS).await;

    let outcome = orchestrator.dispatch_issue(world.issue.id, None).await.unwrap();
    orchestrator.handle_reply(H1_E164, "1", None).await.unwrap();

    let created = issue_rx.recv().await.unwrap();
    assert!(matches!(created, DispatchEvent::AssignmentCreated { .. }));
    assert_eq!(created.assignment_id(), outcome.assignment.id);

    match issue_rx.recv().await.unwrap() {
        DispatchEvent::AssignmentTransitioned { assignment, from } => {
            assert_eq!(from, DispatchStatus::Pending);
            assert_eq!(assignment.status, DispatchStatus::Accepted);
        }
        other => panic!("unexpected event: {other:?}"),
    }

    let mut names = HashSet::new();
    names.insert(all_rx.recv().await.unwrap().name());
    names.insert(all_rx.recv().await.unwrap().name());
    assert_eq!(names.len(), 2);
}

#[tokio::test]
async fn metrics_reflect_reply_history() {
    let world = World::new();
    let (orchestrator, _deps) = world.orchestrator();
    orchestrator.dispatch_issue(world.issue.id, Some(world.h1.id)).await.unwrap();
    orchestrator.handle_reply(H1_E164, "1", None).await.unwrap();

    let metrics = orchestrator.handyman_metrics(world.h1.id).await.unwrap();
    assert_eq!(metrics.accepted_count, 1);
    assert_eq!(metrics.acceptance_rate, 100);
    assert_eq!(metrics.average_response_minutes, Some(0));

    let idle = orchestrator.handyman_metrics(world.h2.id).await.unwrap();
    assert_eq!(idle.acceptance_rate, 0);
    assert!(idle.average_response_minutes.is_none());
}

#[tokio::test]
async fn property_ranking_excludes_attached_properties() {
    let world = World::new();
    let other = dispatch_core::domains::issues::Property::builder()
        .name("Hill Cottage")
        .address("9 Oak St")
        .city("Round Rock")
        .state("TX")
        .zip_code("78664")
        .build();
    world
        .store
        .clone()
        .with_property(other.clone())
        .with_attachment(world.property.id, world.h2.id);
    let (orchestrator, _deps) = world.orchestrator();

    let for_h1 = orchestrator.rank_properties_for_handyman(world.h1.id).await.unwrap();
    assert_eq!(for_h1.len(), 2);
    assert_eq!(for_h1[0].property.id, world.property.id);
    assert_eq!(for_h1[1].score.distance_score, 0.0);

    let for_h2 = orchestrator.rank_properties_for_handyman(world.h2.id).await.unwrap();
    assert_eq!(for_h2.len(), 1);
    assert_eq!(for_h2[0].property.id, other.id);
}
