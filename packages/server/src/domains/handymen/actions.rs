//! Availability and coverage operations.
//!
//! Generic over the store so the same rules run against Postgres and the
//! in-memory test store.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::BTreeSet;
use tracing::info;

use super::models::{CoverageArea, DayAvailability, TimeOff, TimeOffStatus, WeeklyAvailability};
use crate::common::{CoverageAreaId, DispatchError, HandymanId, TimeOffId};
use crate::kernel::BaseAvailabilityStore;

/// Validate and persist a full week. Rows may arrive in any order; they are
/// stored sorted by day. Anything but seven distinct days in 0..=6 is rejected.
pub async fn save_weekly_availability<S>(
    handyman_id: HandymanId,
    days: Vec<DayAvailability>,
    store: &S,
) -> Result<Vec<WeeklyAvailability>, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    validate_week(&days)?;

    let mut days = days;
    days.sort_by_key(|d| d.day_of_week);
    let rows: Vec<WeeklyAvailability> = days
        .into_iter()
        .map(|day| WeeklyAvailability::from_day(handyman_id, day))
        .collect();

    let saved = store.replace_week(handyman_id, rows).await?;
    info!(handyman_id = %handyman_id, rows = saved.len(), "Weekly availability saved");
    Ok(saved)
}

fn validate_week(days: &[DayAvailability]) -> Result<(), DispatchError> {
    if days.len() != 7 {
        return Err(DispatchError::InvalidSchedule(format!(
            "expected 7 days, got {}",
            days.len()
        )));
    }

    let mut seen = BTreeSet::new();
    for day in days {
        if !(0..=6).contains(&day.day_of_week) {
            return Err(DispatchError::InvalidSchedule(format!(
                "day_of_week {} is outside 0..=6",
                day.day_of_week
            )));
        }
        if !seen.insert(day.day_of_week) {
            return Err(DispatchError::InvalidSchedule(format!(
                "day_of_week {} appears twice",
                day.day_of_week
            )));
        }
        if day.is_available && day.start_time >= day.end_time {
            return Err(DispatchError::InvalidSchedule(format!(
                "day {} starts at {} but ends at {}",
                day.day_of_week, day.start_time, day.end_time
            )));
        }
    }
    Ok(())
}

pub async fn request_time_off<S>(
    handyman_id: HandymanId,
    start_date: NaiveDate,
    end_date: NaiveDate,
    reason: Option<String>,
    store: &S,
) -> Result<TimeOff, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    if start_date > end_date {
        return Err(DispatchError::InvalidTimeOffRange(format!(
            "{} is after {}",
            start_date, end_date
        )));
    }

    let reason = reason.filter(|r| !r.trim().is_empty());
    let entry = store
        .insert_time_off(TimeOff::requested(handyman_id, start_date, end_date, reason))
        .await?;
    info!(handyman_id = %handyman_id, time_off_id = %entry.id, "Time off requested");
    Ok(entry)
}

/// Approve or deny a request. Decisions are final; a second one is `AlreadyResolved`.
pub async fn decide_time_off<S>(id: TimeOffId, approve: bool, store: &S) -> Result<TimeOff, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    let decision = if approve {
        TimeOffStatus::Approved
    } else {
        TimeOffStatus::Denied
    };

    if let Some(entry) = store.decide_time_off(id, decision).await? {
        info!(time_off_id = %id, status = %entry.status, "Time off decided");
        return Ok(entry);
    }

    match store.find_time_off(id).await? {
        Some(existing) => Err(DispatchError::AlreadyResolved {
            entity: "time off",
            id: id.into_uuid(),
            status: existing.status.to_string(),
        }),
        None => Err(DispatchError::not_found("time off", id)),
    }
}

/// True only when an approved entry covers `date` (both ends inclusive).
pub async fn is_time_off_day<S>(handyman_id: HandymanId, date: NaiveDate, store: &S) -> Result<bool, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    let entries = store.time_off_for(handyman_id).await?;
    Ok(entries.iter().any(|t| t.blocks(date)))
}

/// Working hours for the weekday cover `at` and the day is not approved time off.
pub async fn is_available_at<S>(handyman_id: HandymanId, at: NaiveDateTime, store: &S) -> Result<bool, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    let week = store.weekly_availability(handyman_id).await?;
    if !week.iter().any(|row| row.covers(at)) {
        return Ok(false);
    }
    Ok(!is_time_off_day(handyman_id, at.date(), store).await?)
}

pub async fn add_coverage_area<S>(area: CoverageArea, store: &S) -> Result<CoverageArea, DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    let mut area = area;
    area.value = area.value.trim().to_string();
    area.priority = area.priority.max(1);
    Ok(store.insert_coverage(area).await?)
}

pub async fn remove_coverage_area<S>(id: CoverageAreaId, store: &S) -> Result<(), DispatchError>
where
    S: BaseAvailabilityStore + ?Sized,
{
    if store.delete_coverage(id).await? {
        Ok(())
    } else {
        Err(DispatchError::not_found("coverage area", id))
    }
}
