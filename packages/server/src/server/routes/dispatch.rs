use axum::{
    extract::{Extension, Path},
    Json,
};
use serde::Deserialize;

use super::ApiError;
use crate::common::{DispatchAssignmentId, HandymanId, IssueId};
use crate::domains::dispatch::{DispatchAssignment, DispatchOutcome};
use crate::server::app::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct DispatchRequest {
    /// Omit to let the matching engine choose.
    #[serde(default)]
    pub handyman_id: Option<HandymanId>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub notify_handyman: bool,
}

pub async fn dispatch_issue_handler(
    Extension(state): Extension<AppState>,
    Path(issue_id): Path<IssueId>,
    body: Option<Json<DispatchRequest>>,
) -> Result<Json<DispatchOutcome>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let outcome = state
        .orchestrator
        .dispatch_issue(issue_id, request.handyman_id)
        .await?;
    Ok(Json(outcome))
}

pub async fn cancel_assignment_handler(
    Extension(state): Extension<AppState>,
    Path(assignment_id): Path<DispatchAssignmentId>,
    body: Option<Json<CancelRequest>>,
) -> Result<Json<DispatchAssignment>, ApiError> {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let canceled = state
        .orchestrator
        .cancel_assignment(assignment_id, request.notify_handyman)
        .await?;
    Ok(Json(canceled))
}
