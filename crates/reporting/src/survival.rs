//! Survival curves: the share of a cohort that has not yet reached the
//! target stage. Every lead is observed to the window end, so there is no
//! censoring: the curve is a plain declining population.

use crate::matrix::{round1, CohortMatrix};
use leadflow_core::error::DataError;
use leadflow_core::types::{CohortKey, Stage};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurvivalPoint {
    pub cohort: CohortKey,
    pub month_rel: u32,
    /// `100 * at_risk / at_risk(0)`, one decimal.
    pub survival: f64,
    pub at_risk: u64,
    /// Leads first reaching the target stage in this month.
    pub events: u64,
}

#[derive(Debug, Clone, Default)]
pub struct SurvivalCurves {
    pub points: Vec<SurvivalPoint>,
    pub skipped: usize,
    pub errors: Vec<DataError>,
}

pub struct SurvivalCalculator {
    target: Stage,
}

impl SurvivalCalculator {
    pub fn new(target: Stage) -> Self {
        Self { target }
    }

    pub fn compute(&self, matrix: &CohortMatrix) -> SurvivalCurves {
        let mut curves = SurvivalCurves::default();

        for cohort in matrix.cohorts() {
            let size = matrix.size(cohort).unwrap_or(0);
            if size == 0 {
                continue;
            }
            let events = matrix.month_counts(cohort, self.target).unwrap_or(&[]);
            match build_curve(*cohort, size, events) {
                Ok(points) => curves.points.extend(points),
                Err(err) => {
                    warn!(cohort = %cohort, error = %err, "Dropping survival series");
                    curves.skipped += 1;
                    curves.errors.push(err);
                }
            }
        }

        curves
    }
}

/// `at_risk(0) = size`, `at_risk(m + 1) = at_risk(m) - events(m)`.
pub fn build_curve(
    cohort: CohortKey,
    size: u64,
    events: &[u64],
) -> Result<Vec<SurvivalPoint>, DataError> {
    let mut points = Vec::with_capacity(events.len());
    let mut at_risk = size;

    for (month_rel, converted) in events.iter().enumerate() {
        let survival = if size == 0 {
            0.0
        } else {
            round1(100.0 * at_risk as f64 / size as f64)
        };
        points.push(SurvivalPoint {
            cohort,
            month_rel: month_rel as u32,
            survival,
            at_risk,
            events: *converted,
        });
        at_risk = at_risk
            .checked_sub(*converted)
            .ok_or(DataError::AtRiskUnderflow {
                cohort,
                month_rel: month_rel as u32,
                at_risk,
                events: *converted,
            })?;
    }

    Ok(points)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::tests::make_lead;
    use crate::cohort::CohortAssigner;
    use crate::matrix::MatrixBuilder;

    fn key(s: &str) -> CohortKey {
        s.parse().unwrap()
    }

    #[test]
    fn test_survival_declines_with_conversions() {
        let leads = vec![
            make_lead("a", "2024-01-05", &[(Stage::Contrato, "2024-01-25")]),
            make_lead("b", "2024-01-11", &[(Stage::Contrato, "2024-02-03")]),
            make_lead("c", "2024-01-19", &[(Stage::Contrato, "2024-02-20")]),
            make_lead("d", "2024-01-21", &[]),
        ];
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(3).build(&assignment);
        let curves = SurvivalCalculator::new(Stage::Contrato).compute(&matrix);

        let p = &curves.points;
        assert_eq!(p.len(), 4);
        assert_eq!((p[0].at_risk, p[0].events, p[0].survival), (4, 1, 100.0));
        assert_eq!((p[1].at_risk, p[1].events, p[1].survival), (3, 2, 75.0));
        assert_eq!((p[2].at_risk, p[2].events, p[2].survival), (1, 0, 25.0));
        assert_eq!(p[3].survival, 25.0);
    }

    #[test]
    fn test_curve_invariants() {
        let points = build_curve(key("2024-03"), 40, &[3, 0, 7, 12, 1, 0, 2]).unwrap();
        assert!(points[0].survival <= 100.0);
        for pair in points.windows(2) {
            assert!(pair[1].survival <= pair[0].survival);
            assert_eq!(pair[1].at_risk, pair[0].at_risk - pair[0].events);
        }
    }

    #[test]
    fn test_more_events_than_at_risk_is_a_data_error() {
        let err = build_curve(key("2024-03"), 2, &[1, 2]).unwrap_err();
        assert!(matches!(err, DataError::AtRiskUnderflow { month_rel: 1, at_risk: 1, events: 2, .. }));
    }
}
