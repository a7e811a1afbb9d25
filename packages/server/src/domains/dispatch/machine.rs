//! Pure lifecycle rules for a dispatch assignment.
//!
//! ```text
//!            ┌─► accepted   (reply "1" / "accept")
//!            ├─► declined   (reply "2" / "decline")
//! pending ───┼─► canceled   (operator)
//!            └─► escalated  (sweep, retry budget exhausted)
//! ```
//!
//! Nothing here touches storage; the orchestrator applies the decisions with
//! compare-and-swap writes so racing triggers resolve to a single winner.

use chrono::{DateTime, Utc};

use super::models::{DispatchAssignment, DispatchSettings, DispatchStatus};

/// Something that moves an assignment out of `pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchTrigger {
    Accept,
    Decline,
    Cancel,
    Escalate,
}

impl DispatchTrigger {
    pub fn target(&self) -> DispatchStatus {
        match self {
            Self::Accept => DispatchStatus::Accepted,
            Self::Decline => DispatchStatus::Declined,
            Self::Cancel => DispatchStatus::Canceled,
            Self::Escalate => DispatchStatus::Escalated,
        }
    }

    /// Only a handyman's own reply counts as a response.
    pub fn stamps_response(&self) -> bool {
        matches!(self, Self::Accept | Self::Decline)
    }

    /// Interpret the first word of an inbound reply.
    pub fn from_reply(body: &str) -> Option<Self> {
        let word = body
            .split_whitespace()
            .next()?
            .trim_matches(|c: char| !c.is_alphanumeric())
            .to_lowercase();

        match word.as_str() {
            "1" | "accept" | "accepted" | "yes" | "y" => Some(Self::Accept),
            "2" | "decline" | "declined" | "no" | "n" => Some(Self::Decline),
            _ => None,
        }
    }
}

/// Resolve a trigger against the current status.
///
/// `Err` carries the status that blocked the move; every non-pending status is terminal.
pub fn apply(current: DispatchStatus, trigger: DispatchTrigger) -> Result<DispatchStatus, DispatchStatus> {
    match current {
        DispatchStatus::Pending => Ok(trigger.target()),
        terminal => Err(terminal),
    }
}

/// What the escalation sweep should do with one assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SweepAction {
    Wait,
    /// Send reminder number `attempt` (1-based) after claiming slot `attempt - 1`.
    FollowUp { attempt: i32 },
    Escalate,
}

/// Follow-up `n` is due at `dispatch_time + timeout * n`; escalation is due one
/// interval after the last allowed follow-up.
pub fn next_sweep_action(
    assignment: &DispatchAssignment,
    settings: &DispatchSettings,
    now: DateTime<Utc>,
) -> SweepAction {
    if assignment.status.is_terminal() || !settings.auto_escalate {
        return SweepAction::Wait;
    }

    let sent = assignment.follow_up_count.max(0);
    // A due time past chrono's range is never reached
    let Some(due_at) = settings
        .response_timeout()
        .checked_mul(sent.saturating_add(1))
        .and_then(|wait| assignment.dispatch_time.checked_add_signed(wait))
    else {
        return SweepAction::Wait;
    };
    if now < due_at {
        return SweepAction::Wait;
    }

    if sent < settings.max_retries {
        SweepAction::FollowUp { attempt: sent + 1 }
    } else {
        SweepAction::Escalate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{HandymanId, IssueId};
    use chrono::Duration;

    const ALL_TRIGGERS: [DispatchTrigger; 4] = [
        DispatchTrigger::Accept,
        DispatchTrigger::Decline,
        DispatchTrigger::Cancel,
        DispatchTrigger::Escalate,
    ];

    #[test]
    fn pending_moves_to_each_trigger_target() {
        for trigger in ALL_TRIGGERS {
            assert_eq!(apply(DispatchStatus::Pending, trigger), Ok(trigger.target()));
        }
    }

    #[test]
    fn terminal_states_never_move() {
        for from in [
            DispatchStatus::Accepted,
            DispatchStatus::Declined,
            DispatchStatus::Canceled,
            DispatchStatus::Escalated,
        ] {
            for trigger in ALL_TRIGGERS {
                assert_eq!(apply(from, trigger), Err(from));
            }
        }
    }

    #[test]
    fn reply_keywords() {
        assert_eq!(DispatchTrigger::from_reply("1"), Some(DispatchTrigger::Accept));
        assert_eq!(DispatchTrigger::from_reply("  Accept!"), Some(DispatchTrigger::Accept));
        assert_eq!(DispatchTrigger::from_reply("YES I'll go"), Some(DispatchTrigger::Accept));
        assert_eq!(DispatchTrigger::from_reply("2"), Some(DispatchTrigger::Decline));
        assert_eq!(DispatchTrigger::from_reply("decline"), Some(DispatchTrigger::Decline));
        assert_eq!(DispatchTrigger::from_reply("No."), Some(DispatchTrigger::Decline));
        assert_eq!(DispatchTrigger::from_reply(""), None);
        assert_eq!(DispatchTrigger::from_reply("maybe later"), None);
        assert_eq!(DispatchTrigger::from_reply("12"), None);
    }

    #[test]
    fn only_replies_stamp_response_time() {
        assert!(DispatchTrigger::Accept.stamps_response());
        assert!(DispatchTrigger::Decline.stamps_response());
        assert!(!DispatchTrigger::Cancel.stamps_response());
        assert!(!DispatchTrigger::Escalate.stamps_response());
    }

    fn settings(max_retries: i32, auto_escalate: bool) -> DispatchSettings {
        DispatchSettings {
            max_retries,
            auto_escalate,
            ..DispatchSettings::default()
        }
    }

    #[test]
    fn sweep_schedule_with_single_retry() {
        let start = Utc::now();
        let settings = settings(1, true);
        let mut assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), start);

        assert_eq!(
            next_sweep_action(&assignment, &settings, start + Duration::minutes(29)),
            SweepAction::Wait
        );
        assert_eq!(
            next_sweep_action(&assignment, &settings, start + Duration::minutes(30)),
            SweepAction::FollowUp { attempt: 1 }
        );

        assignment.follow_up_count = 1;
        assert_eq!(
            next_sweep_action(&assignment, &settings, start + Duration::minutes(45)),
            SweepAction::Wait
        );
        assert_eq!(
            next_sweep_action(&assignment, &settings, start + Duration::minutes(60)),
            SweepAction::Escalate
        );
    }

    #[test]
    fn sweep_waits_when_auto_escalate_disabled() {
        let start = Utc::now();
        let assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), start);
        assert_eq!(
            next_sweep_action(&assignment, &settings(3, false), start + Duration::days(2)),
            SweepAction::Wait
        );
    }

    #[test]
    fn sweep_ignores_resolved_assignments() {
        let start = Utc::now();
        let mut assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), start);
        assignment.status = DispatchStatus::Accepted;
        assert_eq!(
            next_sweep_action(&assignment, &settings(3, true), start + Duration::days(2)),
            SweepAction::Wait
        );
    }

    #[test]
    fn sweep_never_overflows_on_extreme_values() {
        let start = Utc::now();
        let settings = DispatchSettings {
            response_timeout_minutes: i64::MAX,
            ..settings(1, true)
        };
        let mut assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), start);
        assignment.follow_up_count = i32::MAX;

        assert_eq!(
            next_sweep_action(&assignment, &settings, start + Duration::days(365)),
            SweepAction::Wait
        );
    }
}
