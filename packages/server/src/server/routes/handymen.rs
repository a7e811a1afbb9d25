use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::common::{CoverageAreaId, DispatchError, HandymanId, TimeOffId};
use crate::domains::dispatch::HandymanMetrics;
use crate::domains::handymen::actions;
use crate::domains::handymen::{CoverageArea, CoverageType, DayAvailability, TimeOff, WeeklyAvailability};
use crate::domains::matching::RankedProperty;
use crate::kernel::BaseDispatchStore;
use crate::server::app::AppState;

pub async fn metrics_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
) -> Result<Json<HandymanMetrics>, ApiError> {
    Ok(Json(state.orchestrator.handyman_metrics(handyman_id).await?))
}

pub async fn matches_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
) -> Result<Json<Vec<RankedProperty>>, ApiError> {
    Ok(Json(
        state
            .orchestrator
            .rank_properties_for_handyman(handyman_id)
            .await?,
    ))
}

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    /// Local wall-clock time, e.g. `2026-10-19T10:00:00`.
    pub at: NaiveDateTime,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityAnswer {
    pub handyman_id: HandymanId,
    pub at: NaiveDateTime,
    pub available: bool,
}

pub async fn availability_check_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityAnswer>, ApiError> {
    let store = state.orchestrator.deps().store.clone();
    store
        .find_handyman(handyman_id)
        .await
        .map_err(DispatchError::from)?
        .ok_or_else(|| DispatchError::not_found("handyman", handyman_id))?;

    let available = actions::is_available_at(handyman_id, query.at, &*store).await?;
    Ok(Json(AvailabilityAnswer {
        handyman_id,
        at: query.at,
        available,
    }))
}

/// Replace the full week. Body is the seven day rows, in any order.
pub async fn availability_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
    Json(days): Json<Vec<DayAvailability>>,
) -> Result<Json<Vec<WeeklyAvailability>>, ApiError> {
    let store = state.orchestrator.deps().store.clone();
    let saved = actions::save_weekly_availability(handyman_id, days, &*store).await?;
    Ok(Json(saved))
}

#[derive(Debug, Deserialize)]
pub struct TimeOffRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub reason: Option<String>,
}

pub async fn request_time_off_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
    Json(request): Json<TimeOffRequest>,
) -> Result<(StatusCode, Json<TimeOff>), ApiError> {
    let store = state.orchestrator.deps().store.clone();
    let entry = actions::request_time_off(
        handyman_id,
        request.start_date,
        request.end_date,
        request.reason,
        &*store,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

#[derive(Debug, Deserialize)]
pub struct TimeOffDecision {
    pub approve: bool,
}

pub async fn decide_time_off_handler(
    Extension(state): Extension<AppState>,
    Path(time_off_id): Path<TimeOffId>,
    Json(decision): Json<TimeOffDecision>,
) -> Result<Json<TimeOff>, ApiError> {
    let store = state.orchestrator.deps().store.clone();
    let entry = actions::decide_time_off(time_off_id, decision.approve, &*store).await?;
    Ok(Json(entry))
}

#[derive(Debug, Deserialize)]
pub struct CoverageRequest {
    pub area_type: CoverageType,
    pub value: String,
    #[serde(default)]
    pub radius_miles: Option<f64>,
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub is_primary: bool,
}

fn default_priority() -> i32 {
    1
}

pub async fn add_coverage_handler(
    Extension(state): Extension<AppState>,
    Path(handyman_id): Path<HandymanId>,
    Json(request): Json<CoverageRequest>,
) -> Result<(StatusCode, Json<CoverageArea>), ApiError> {
    let store = state.orchestrator.deps().store.clone();
    let area = CoverageArea {
        id: CoverageAreaId::new(),
        handyman_id,
        area_type: request.area_type,
        value: request.value,
        radius_miles: request.radius_miles,
        priority: request.priority,
        is_primary: request.is_primary,
    };
    let saved = actions::add_coverage_area(area, &*store).await?;
    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn remove_coverage_handler(
    Extension(state): Extension<AppState>,
    Path(coverage_id): Path<CoverageAreaId>,
) -> Result<StatusCode, ApiError> {
    let store = state.orchestrator.deps().store.clone();
    actions::remove_coverage_area(coverage_id, &*store).await?;
    Ok(StatusCode::NO_CONTENT)
}
