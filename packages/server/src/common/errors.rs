use thiserror::Error;
use uuid::Uuid;

use super::{HandymanId, IssueId};

/// Errors raised by the dispatch engine and its stores.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Handyman {handyman_id} already has a pending offer for issue {issue_id}")]
    DuplicateAssignment {
        issue_id: IssueId,
        handyman_id: HandymanId,
    },

    #[error("Reply from {from} does not match a pending assignment: {reason}")]
    UnmatchedReply { from: String, reason: String },

    /// Transition attempted on a row that already left its initial state.
    #[error("{entity} {id} is already {status}")]
    AlreadyResolved {
        entity: &'static str,
        id: Uuid,
        status: String,
    },

    #[error("Invalid phone number: {0}")]
    InvalidPhoneFormat(String),

    #[error("Message gateway send failed: {0}")]
    GatewaySendFailure(String),

    #[error("Configuration missing: {0}")]
    ConfigurationMissing(&'static str),

    #[error("Invalid configuration for {key}: {reason}")]
    InvalidConfiguration { key: &'static str, reason: String },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("No eligible handyman for issue {0}")]
    NoCandidates(IssueId),

    #[error("Invalid weekly schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid time-off range: {0}")]
    InvalidTimeOffRange(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl DispatchError {
    pub fn not_found(entity: &'static str, id: impl Into<Uuid>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// `AlreadyResolved` is an idempotent no-op, never a caller-facing failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, Self::AlreadyResolved { .. })
    }

    /// Stable machine-readable name, used in API error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateAssignment { .. } => "duplicate_assignment",
            Self::UnmatchedReply { .. } => "unmatched_reply",
            Self::AlreadyResolved { .. } => "already_resolved",
            Self::InvalidPhoneFormat(_) => "invalid_phone_format",
            Self::GatewaySendFailure(_) => "gateway_send_failure",
            Self::ConfigurationMissing(_) => "configuration_missing",
            Self::InvalidConfiguration { .. } => "invalid_configuration",
            Self::NotFound { .. } => "not_found",
            Self::NoCandidates(_) => "no_candidates",
            Self::InvalidSchedule(_) => "invalid_schedule",
            Self::InvalidTimeOffRange(_) => "invalid_time_off_range",
            Self::Database(_) => "database",
            Self::Internal(_) => "internal",
        }
    }
}
