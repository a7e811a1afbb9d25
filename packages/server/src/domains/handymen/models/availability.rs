use anyhow::Result;
use chrono::{Datelike, NaiveDateTime, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::common::{AvailabilityId, HandymanId};

/// One row of a handyman's weekly schedule. `day_of_week` is 0 = Sunday .. 6 = Saturday.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct WeeklyAvailability {
    pub id: AvailabilityId,
    pub handyman_id: HandymanId,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

/// Caller-supplied row for a schedule save (ids are assigned on write).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

impl DayAvailability {
    /// Monday-Friday 09:00-17:00, weekend off.
    pub fn default_week() -> Vec<Self> {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default();
        let five = NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default();
        (0..7)
            .map(|day_of_week| Self {
                day_of_week,
                start_time: nine,
                end_time: five,
                is_available: (1..=5).contains(&day_of_week),
            })
            .collect()
    }
}

/// 0 = Sunday, matching the stored convention.
pub fn day_index(weekday: Weekday) -> i32 {
    weekday.num_days_from_sunday() as i32
}

impl WeeklyAvailability {
    pub fn from_day(handyman_id: HandymanId, day: DayAvailability) -> Self {
        Self {
            id: AvailabilityId::new(),
            handyman_id,
            day_of_week: day.day_of_week,
            start_time: day.start_time,
            end_time: day.end_time,
            is_available: day.is_available,
        }
    }

    /// Whether this row covers the given local time (end is exclusive).
    pub fn covers(&self, at: NaiveDateTime) -> bool {
        self.is_available
            && self.day_of_week == day_index(at.weekday())
            && at.time() >= self.start_time
            && at.time() < self.end_time
    }

    pub async fn find_for_handyman(handyman_id: HandymanId, pool: &PgPool) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM weekly_availability WHERE handyman_id = $1 ORDER BY day_of_week ASC",
        )
        .bind(handyman_id)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }

    /// Replace the whole week in one transaction (delete-then-insert).
    pub async fn replace_week(
        handyman_id: HandymanId,
        rows: &[WeeklyAvailability],
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        let mut tx = pool.begin().await?;

        sqlx::query("DELETE FROM weekly_availability WHERE handyman_id = $1")
            .bind(handyman_id)
            .execute(&mut *tx)
            .await?;

        let mut saved = Vec::with_capacity(rows.len());
        for row in rows {
            let inserted = sqlx::query_as::<_, Self>(
                r#"
                INSERT INTO weekly_availability (
                    id, handyman_id, day_of_week, start_time, end_time, is_available
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING *
                "#,
            )
            .bind(row.id)
            .bind(handyman_id)
            .bind(row.day_of_week)
            .bind(row.start_time)
            .bind(row.end_time)
            .bind(row.is_available)
            .fetch_one(&mut *tx)
            .await?;
            saved.push(inserted);
        }

        tx.commit().await?;
        Ok(saved)
    }
}
