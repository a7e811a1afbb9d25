//! Pure scoring functions for property/handyman pairings.
//!
//! No side effects: callers load coverage, specialties and job history and
//! decide what to do with the ranking.
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::common::PropertyId;
use crate::domains::handymen::{CoverageArea, CoverageType, Handyman};
use crate::domains::issues::Property;

pub const DISTANCE_WEIGHT: f64 = 0.6;
pub const SKILL_WEIGHT: f64 = 0.3;
pub const WORKLOAD_WEIGHT: f64 = 0.1;

/// Specialty count that earns a full skill score.
pub const FULL_SKILL_SPECIALTIES: usize = 5;

/// Workload points lost per completed job at the same property.
pub const WORKLOAD_PENALTY_PER_JOB: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchScore {
    pub distance_score: f64,
    pub skill_score: f64,
    pub workload_score: f64,
    pub match_strength: f64,
    /// Priority of the coverage area that produced the distance score.
    pub coverage_priority: Option<i32>,
}

/// Everything the engine needs to know about one handyman.
#[derive(Debug, Clone)]
pub struct MatchCandidate {
    pub handyman: Handyman,
    pub coverage: Vec<CoverageArea>,
    pub completed_jobs: HashMap<PropertyId, u32>,
}

impl MatchCandidate {
    pub fn new(
        handyman: Handyman,
        mut coverage: Vec<CoverageArea>,
        completed_jobs: HashMap<PropertyId, u32>,
    ) -> Self {
        CoverageArea::sort_for_scan(&mut coverage);
        Self {
            handyman,
            coverage,
            completed_jobs,
        }
    }

    pub fn score(&self, property: &Property) -> MatchScore {
        let (distance_score, coverage_priority) = distance_score(property, &self.coverage);
        let skill_score = skill_score(self.handyman.specialty_count());
        let completed = self.completed_jobs.get(&property.id).copied().unwrap_or(0);
        let workload_score = workload_score(completed);

        MatchScore {
            distance_score,
            skill_score,
            workload_score,
            match_strength: DISTANCE_WEIGHT * distance_score
                + SKILL_WEIGHT * skill_score
                + WORKLOAD_WEIGHT * workload_score,
            coverage_priority,
        }
    }
}

/// Score from the first coverage area (in scan order) that matches the property.
///
/// `areas` must already be in scan order (see [`CoverageArea::sort_for_scan`]).
pub fn distance_score(property: &Property, areas: &[CoverageArea]) -> (f64, Option<i32>) {
    let zip = property.zip_code.trim();
    let city = normalize_city(&property.city_state());

    for area in areas {
        let base = match area.area_type {
            CoverageType::ZipCode if area.value.trim() == zip => 100.0,
            CoverageType::City if normalize_city(&area.value) == city => 90.0,
            // No geocoder: any radius area counts as a coarse match
            CoverageType::Radius => 70.0,
            _ => continue,
        };
        let step = f64::from(area.priority.max(1) - 1) * 10.0;
        return ((base - step).max(0.0), Some(area.priority));
    }

    (0.0, None)
}

/// Breadth of capability: 20 points per distinct specialty, capped at 100.
///
/// TODO: compare against the issue's required trade once issues carry one.
pub fn skill_score(specialty_count: usize) -> f64 {
    (specialty_count as f64 / FULL_SKILL_SPECIALTIES as f64 * 100.0).min(100.0)
}

pub fn workload_score(completed_jobs_at_property: u32) -> f64 {
    (100.0 - WORKLOAD_PENALTY_PER_JOB * f64::from(completed_jobs_at_property)).max(0.0)
}

fn normalize_city(value: &str) -> String {
    value
        .split(',')
        .map(|part| part.split_whitespace().collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join(", ")
        .to_lowercase()
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedProperty {
    pub property: Property,
    pub score: MatchScore,
}

#[derive(Debug, Clone, Serialize)]
pub struct RankedHandyman {
    pub handyman: Handyman,
    pub score: MatchScore,
}

/// Strength descending, then lower coverage priority (unmatched last).
fn compare_scores(a: &MatchScore, b: &MatchScore) -> Ordering {
    b.match_strength
        .total_cmp(&a.match_strength)
        .then_with(|| {
            a.coverage_priority
                .unwrap_or(i32::MAX)
                .cmp(&b.coverage_priority.unwrap_or(i32::MAX))
        })
}

/// Rank properties for one handyman. Properties already attached to the
/// handyman should be filtered out by the caller.
pub fn rank_properties(candidate: &MatchCandidate, properties: &[Property]) -> Vec<RankedProperty> {
    let mut ranked: Vec<RankedProperty> = properties
        .iter()
        .map(|property| RankedProperty {
            score: candidate.score(property),
            property: property.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        compare_scores(&a.score, &b.score).then_with(|| a.property.id.cmp(&b.property.id))
    });
    ranked
}

/// Rank handymen for one property (auto-dispatch).
pub fn rank_handymen(property: &Property, candidates: &[MatchCandidate]) -> Vec<RankedHandyman> {
    let mut ranked: Vec<RankedHandyman> = candidates
        .iter()
        .map(|candidate| RankedHandyman {
            score: candidate.score(property),
            handyman: candidate.handyman.clone(),
        })
        .collect();

    ranked.sort_by(|a, b| {
        compare_scores(&a.score, &b.score).then_with(|| a.handyman.id.cmp(&b.handyman.id))
    });
    ranked
}
