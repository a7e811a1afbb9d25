use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;

use crate::common::{DispatchAssignmentId, HandymanId, IssueId};
use crate::domains::issues::Issue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "dispatch_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Pending,
    Accepted,
    Declined,
    Canceled,
    Escalated,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Canceled => "canceled",
            Self::Escalated => "escalated",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One offer of one issue to one handyman.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DispatchAssignment {
    pub id: DispatchAssignmentId,
    pub issue_id: IssueId,
    pub handyman_id: HandymanId,
    pub status: DispatchStatus,
    pub dispatch_time: DateTime<Utc>,
    /// Stamped by the first definitive reply only.
    pub response_time: Option<DateTime<Utc>>,
    /// Follow-up reminders already claimed by the escalation sweep.
    pub follow_up_count: i32,
    pub last_follow_up_at: Option<DateTime<Utc>>,
    /// Gateway id of the original offer message.
    pub message_sid: Option<String>,
    /// Gateway id of the reply that resolved this row. Unique across rows, so a
    /// redelivered webhook can never resolve a second offer.
    pub inbound_message_sid: Option<String>,
}

impl DispatchAssignment {
    pub fn pending(issue_id: IssueId, handyman_id: HandymanId, now: DateTime<Utc>) -> Self {
        Self {
            id: DispatchAssignmentId::new(),
            issue_id,
            handyman_id,
            status: DispatchStatus::Pending,
            dispatch_time: now,
            response_time: None,
            follow_up_count: 0,
            last_follow_up_at: None,
            message_sid: None,
            inbound_message_sid: None,
        }
    }

    /// Minutes between dispatch and the recorded reply.
    pub fn response_minutes(&self) -> Option<f64> {
        self.response_time
            .map(|responded| (responded - self.dispatch_time).num_seconds() as f64 / 60.0)
    }

    pub async fn find_by_id(id: DispatchAssignmentId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM dispatch_assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_for_issue(issue_id: IssueId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM dispatch_assignments WHERE issue_id = $1 ORDER BY dispatch_time ASC",
        )
        .bind(issue_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_for_handyman(handyman_id: HandymanId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM dispatch_assignments WHERE handyman_id = $1 ORDER BY dispatch_time ASC",
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_pending(pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM dispatch_assignments WHERE status = 'pending' ORDER BY dispatch_time ASC",
        )
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Insert a pending row unless one already exists for the pair.
    ///
    /// Backed by the partial unique index on `(issue_id, handyman_id) WHERE status = 'pending'`,
    /// so concurrent callers race on the index rather than on a read-then-write.
    pub async fn insert_pending(&self, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO dispatch_assignments (id, issue_id, handyman_id, status, dispatch_time)
            VALUES ($1, $2, $3, 'pending', $4)
            ON CONFLICT (issue_id, handyman_id) WHERE status = 'pending' DO NOTHING
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.issue_id)
        .bind(self.handyman_id)
        .bind(self.dispatch_time)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn find_by_inbound_sid(inbound_message_sid: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM dispatch_assignments WHERE inbound_message_sid = $1")
            .bind(inbound_message_sid)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    /// Compare-and-swap out of `pending`. `None` means the row already left `pending`
    /// or `inbound_message_sid` already resolved another row.
    ///
    /// Moving to `accepted` assigns the issue in the same transaction, so the row and
    /// the issue never disagree.
    pub async fn transition_from_pending(
        id: DispatchAssignmentId,
        to: DispatchStatus,
        response_time: Option<DateTime<Utc>>,
        inbound_message_sid: Option<&str>,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        let mut tx = pool.begin().await?;

        let updated = sqlx::query_as::<_, Self>(
            r#"
            UPDATE dispatch_assignments
            SET status = $2,
                response_time = COALESCE(response_time, $3),
                inbound_message_sid = COALESCE(inbound_message_sid, $4)
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(response_time)
        .bind(inbound_message_sid)
        .fetch_optional(&mut *tx)
        .await;

        let updated = match updated {
            Ok(Some(row)) => row,
            Ok(None) => return Ok(None),
            // Redelivered reply: the sid is already on another row
            Err(e) if is_unique_violation(&e) => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        if updated.status == DispatchStatus::Accepted {
            Issue::mark_assigned(updated.issue_id, updated.handyman_id, &mut *tx).await?;
        }

        tx.commit().await?;
        Ok(Some(updated))
    }

    /// Claim the next follow-up slot. Only one sweep can move the counter past `expected`.
    pub async fn claim_follow_up(
        id: DispatchAssignmentId,
        expected: i32,
        now: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE dispatch_assignments
            SET follow_up_count = follow_up_count + 1,
                last_follow_up_at = $3
            WHERE id = $1 AND status = 'pending' AND follow_up_count = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(expected)
        .bind(now)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn record_message_sid(
        id: DispatchAssignmentId,
        message_sid: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query("UPDATE dispatch_assignments SET message_sid = $2 WHERE id = $1")
            .bind(id)
            .bind(message_sid)
            .execute(pool)
            .await?;
        Ok(())
    }
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .map(|db| db.is_unique_violation())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!DispatchStatus::Pending.is_terminal());
        for status in [
            DispatchStatus::Accepted,
            DispatchStatus::Declined,
            DispatchStatus::Canceled,
            DispatchStatus::Escalated,
        ] {
            assert!(status.is_terminal(), "{} should be terminal", status);
        }
    }

    #[test]
    fn response_minutes_is_fractional() {
        let now = Utc::now();
        let mut assignment = DispatchAssignment::pending(IssueId::new(), HandymanId::new(), now);
        assert_eq!(assignment.response_minutes(), None);
        assignment.response_time = Some(now + Duration::seconds(90));
        assert_eq!(assignment.response_minutes(), Some(1.5));
    }
}
