// HTTP routes
pub mod dispatch;
pub mod handymen;
pub mod health;
pub mod stream;

pub use dispatch::*;
pub use handymen::*;
pub use health::*;
pub use stream::*;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::common::DispatchError;

/// `DispatchError` rendered as `{ "error", "kind" }` with a matching status code.
pub struct ApiError(pub DispatchError);

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            DispatchError::NotFound { .. } => StatusCode::NOT_FOUND,
            DispatchError::DuplicateAssignment { .. } | DispatchError::AlreadyResolved { .. } => {
                StatusCode::CONFLICT
            }
            DispatchError::NoCandidates(_)
            | DispatchError::UnmatchedReply { .. }
            | DispatchError::InvalidPhoneFormat(_) => StatusCode::UNPROCESSABLE_ENTITY,
            DispatchError::InvalidSchedule(_) | DispatchError::InvalidTimeOffRange(_) => {
                StatusCode::BAD_REQUEST
            }
            DispatchError::GatewaySendFailure(_) => StatusCode::BAD_GATEWAY,
            DispatchError::ConfigurationMissing(_) | DispatchError::InvalidConfiguration { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            DispatchError::Database(_) | DispatchError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self.0, "Request failed");
            "internal server error".to_string()
        } else {
            self.0.to_string()
        };

        (
            status,
            Json(json!({ "error": message, "kind": self.0.kind() })),
        )
            .into_response()
    }
}
