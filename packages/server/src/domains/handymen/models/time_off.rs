use anyhow::Result;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::fmt;

use crate::common::{HandymanId, TimeOffId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "time_off_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TimeOffStatus {
    Requested,
    Approved,
    Denied,
}

impl fmt::Display for TimeOffStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Approved => "approved",
            Self::Denied => "denied",
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TimeOff {
    pub id: TimeOffId,
    pub handyman_id: HandymanId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub reason: Option<String>,
    pub status: TimeOffStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
}

impl TimeOff {
    pub fn requested(
        handyman_id: HandymanId,
        start_date: NaiveDate,
        end_date: NaiveDate,
        reason: Option<String>,
    ) -> Self {
        Self {
            id: TimeOffId::new(),
            handyman_id,
            start_date,
            end_date,
            reason,
            status: TimeOffStatus::Requested,
            created_at: Utc::now(),
            decided_at: None,
        }
    }

    /// Only approved entries block a day; both endpoints are inclusive.
    pub fn blocks(&self, date: NaiveDate) -> bool {
        self.status == TimeOffStatus::Approved && self.start_date <= date && date <= self.end_date
    }

    pub async fn find_by_id(id: TimeOffId, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>("SELECT * FROM time_off WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn find_for_handyman(handyman_id: HandymanId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM time_off WHERE handyman_id = $1 ORDER BY start_date ASC",
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        sqlx::query_as::<_, Self>(
            r#"
            INSERT INTO time_off (
                id, handyman_id, start_date, end_date, reason, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(self.handyman_id)
        .bind(self.start_date)
        .bind(self.end_date)
        .bind(&self.reason)
        .bind(self.status)
        .bind(self.created_at)
        .fetch_one(pool)
        .await
        .map_err(Into::into)
    }

    /// Decide a request. Returns `None` if the row is missing or already decided.
    pub async fn decide(
        id: TimeOffId,
        decision: TimeOffStatus,
        pool: &PgPool,
    ) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            UPDATE time_off
            SET status = $2, decided_at = NOW()
            WHERE id = $1 AND status = 'requested'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(decision)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }
}
