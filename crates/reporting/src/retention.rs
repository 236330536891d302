//! Retention curves: cumulative reach of a target stage per cohort.

use crate::matrix::{pct_of, CohortMatrix, MatrixMode};
use leadflow_core::error::DataError;
use leadflow_core::types::{CohortKey, Stage};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetentionPoint {
    pub cohort: CohortKey,
    pub month_rel: u32,
    /// Share of the cohort that reached the stage by `month_rel`.
    pub pct_cum: f64,
    pub count: u64,
}

#[derive(Debug, Clone, Default)]
pub struct RetentionCurves {
    pub points: Vec<RetentionPoint>,
    pub skipped: usize,
    pub errors: Vec<DataError>,
}

pub struct RetentionCalculator {
    target: Stage,
}

impl RetentionCalculator {
    pub fn new(target: Stage) -> Self {
        Self { target }
    }

    pub fn compute(&self, matrix: &CohortMatrix) -> RetentionCurves {
        let mut curves = RetentionCurves::default();

        for cohort in matrix.cohorts() {
            let size = matrix.size(cohort).unwrap_or(0);
            let cumulative: Vec<u64> = matrix
                .series(cohort, self.target, MatrixMode::Cumulative)
                .into_iter()
                .map(|cell| cell.count)
                .collect();

            match build_series(*cohort, size, &cumulative) {
                Ok(points) => curves.points.extend(points),
                Err(err) => {
                    warn!(cohort = %cohort, error = %err, "Dropping retention series");
                    curves.skipped += 1;
                    curves.errors.push(err);
                }
            }
        }

        curves
    }
}

/// Turn cumulative counts (indexed by relative month) into retention points.
/// A shrinking cumulative count is rejected rather than papered over.
pub fn build_series(
    cohort: CohortKey,
    size: u64,
    cumulative: &[u64],
) -> Result<Vec<RetentionPoint>, DataError> {
    let mut points: Vec<RetentionPoint> = Vec::with_capacity(cumulative.len());

    for (month_rel, count) in cumulative.iter().enumerate() {
        let pct_cum = pct_of(*count, size);
        if let Some(prev) = points.last() {
            if *count < prev.count || pct_cum < prev.pct_cum {
                return Err(DataError::RetentionDecreasing {
                    cohort,
                    month_rel: month_rel as u32,
                    previous: prev.pct_cum,
                    current: pct_cum,
                });
            }
        }
        points.push(RetentionPoint {
            cohort,
            month_rel: month_rel as u32,
            pct_cum,
            count: *count,
        });
    }

    Ok(points)
}
