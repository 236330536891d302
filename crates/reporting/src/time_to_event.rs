//! Time-to-event distribution per cohort (days from acquisition to a stage).

use crate::cohort::{Cohort, CohortAssignment};
use crate::matrix::CohortMatrix;
use crate::percentile::percentile;
use leadflow_core::types::{CohortKey, Stage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeToEventPoint {
    pub cohort: CohortKey,
    pub stage: Stage,
    /// Days; `0.0` when `samples == 0`.
    pub p50: f64,
    pub p90: f64,
    pub samples: usize,
}

/// Durations in days for leads of `cohort` that reached `stage` within
/// `window` relative months.
pub fn samples(cohort: &Cohort<'_>, stage: Stage, window: u32) -> Vec<f64> {
    cohort
        .leads
        .iter()
        .filter_map(|lead| lead.event(stage))
        .filter(|event| event.month_rel <= window)
        .map(|event| event.days as f64)
        .collect()
}

/// One point per cohort, counting only events inside the cohort's observable
/// horizon in `matrix`. A cohort with no horizon contributes no samples.
pub fn compute(
    assignment: &CohortAssignment<'_>,
    matrix: &CohortMatrix,
    stage: Stage,
) -> Vec<TimeToEventPoint> {
    assignment
        .cohorts
        .iter()
        .map(|cohort| {
            let durations = match matrix.horizon(&cohort.key) {
                Some(horizon) => samples(cohort, stage, horizon),
                None => Vec::new(),
            };
            TimeToEventPoint {
                cohort: cohort.key,
                stage,
                p50: percentile(&durations, 50.0),
                p90: percentile(&durations, 90.0),
                samples: durations.len(),
            }
        })
        .collect()
}
