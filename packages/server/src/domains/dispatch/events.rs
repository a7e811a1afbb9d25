use chrono::{DateTime, Utc};
use serde::Serialize;

use super::models::{DispatchAssignment, DispatchStatus};
use crate::common::DispatchAssignmentId;

/// Facts published on the event hub after an assignment row changes.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DispatchEvent {
    AssignmentCreated {
        assignment: DispatchAssignment,
    },
    AssignmentTransitioned {
        assignment: DispatchAssignment,
        from: DispatchStatus,
    },
    FollowUpSent {
        assignment_id: DispatchAssignmentId,
        attempt: i32,
        sent_at: DateTime<Utc>,
    },
}

impl DispatchEvent {
    pub fn assignment_id(&self) -> DispatchAssignmentId {
        match self {
            Self::AssignmentCreated { assignment } => assignment.id,
            Self::AssignmentTransitioned { assignment, .. } => assignment.id,
            Self::FollowUpSent { assignment_id, .. } => *assignment_id,
        }
    }

    /// SSE event name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::AssignmentCreated { .. } => "assignment_created",
            Self::AssignmentTransitioned { .. } => "assignment_transitioned",
            Self::FollowUpSent { .. } => "follow_up_sent",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{HandymanId, IssueId};

    #[test]
    fn serializes_with_type_tag() {
        let mut assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), Utc::now());
        assignment.status = DispatchStatus::Accepted;
        let event = DispatchEvent::AssignmentTransitioned {
            assignment: assignment.clone(),
            from: DispatchStatus::Pending,
        };

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "assignment_transitioned");
        assert_eq!(json["from"], "pending");
        assert_eq!(json["assignment"]["status"], "accepted");
        assert_eq!(event.assignment_id(), assignment.id);
        assert_eq!(event.name(), "assignment_transitioned");
    }
}
