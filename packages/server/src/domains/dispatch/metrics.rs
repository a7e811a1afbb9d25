use serde::Serialize;

use super::models::{DispatchAssignment, DispatchStatus};
use crate::common::HandymanId;

/// Responsiveness figures for one handyman, recomputed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HandymanMetrics {
    pub handyman_id: HandymanId,
    /// Percent of definitive replies that were acceptances (0 when there are none).
    pub acceptance_rate: u32,
    /// Rounded mean minutes from dispatch to reply; `None` with no replies yet.
    pub average_response_minutes: Option<i64>,
    pub pending_count: usize,
    pub accepted_count: usize,
    pub declined_count: usize,
    pub escalated_count: usize,
}

pub fn compute_metrics(handyman_id: HandymanId, assignments: &[DispatchAssignment]) -> HandymanMetrics {
    let mut metrics = HandymanMetrics {
        handyman_id,
        ..HandymanMetrics::default()
    };
    let mut response_minutes = Vec::new();

    for assignment in assignments.iter().filter(|a| a.handyman_id == handyman_id) {
        match assignment.status {
            DispatchStatus::Pending => metrics.pending_count += 1,
            DispatchStatus::Accepted => metrics.accepted_count += 1,
            DispatchStatus::Declined => metrics.declined_count += 1,
            DispatchStatus::Escalated => metrics.escalated_count += 1,
            DispatchStatus::Canceled => {}
        }
        if let Some(minutes) = assignment.response_minutes() {
            response_minutes.push(minutes);
        }
    }

    let answered = metrics.accepted_count + metrics.declined_count;
    if answered > 0 {
        metrics.acceptance_rate =
            (metrics.accepted_count as f64 / answered as f64 * 100.0).round() as u32;
    }

    if !response_minutes.is_empty() {
        let mean = response_minutes.iter().sum::<f64>() / response_minutes.len() as f64;
        metrics.average_response_minutes = Some(mean.round() as i64);
    }

    metrics
}
