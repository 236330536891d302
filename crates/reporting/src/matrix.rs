//! Cohort × relative-month × stage matrix behind the heatmap and the
//! stage-progression views.

use crate::cohort::CohortAssignment;
use leadflow_core::types::{CohortKey, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// How counts are read out of the matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatrixMode {
    /// Leads reaching the stage in that relative month only.
    PerMonth,
    /// Leads that reached the stage at or before that relative month.
    Cumulative,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortMatrixCell {
    pub cohort: CohortKey,
    pub month_rel: u32,
    pub stage: Stage,
    pub count: u64,
    /// `count / total_size * 100`, one decimal.
    pub pct: f64,
    pub total_size: u64,
}

/// Cumulative reach of one stage at the end of a cohort's horizon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageProgress {
    pub stage: Stage,
    pub count: u64,
    pub pct: f64,
}

#[derive(Debug, Clone)]
struct MatrixRow {
    size: u64,
    /// Last observable relative month; `None` when nothing is observable yet.
    horizon: Option<u32>,
    /// Per-month counts, indexed by relative month up to the horizon.
    counts: BTreeMap<Stage, Vec<u64>>,
}

/// Read-only result of [`MatrixBuilder::build`]. Cells outside a cohort's
/// horizon are absent ("no data"), which is not the same as a zero count.
#[derive(Debug, Clone)]
pub struct CohortMatrix {
    window: u32,
    stages: Vec<Stage>,
    rows: BTreeMap<CohortKey, MatrixRow>,
}

pub struct MatrixBuilder {
    window: u32,
    stages: Vec<Stage>,
    as_of: Option<CohortKey>,
}

impl MatrixBuilder {
    pub fn new(window: u32) -> Self {
        Self {
            window,
            stages: Stage::ALL.to_vec(),
            as_of: None,
        }
    }

    pub fn with_stages(mut self, stages: &[Stage]) -> Self {
        let mut stages = stages.to_vec();
        stages.sort();
        stages.dedup();
        self.stages = stages;
        self
    }

    /// Last month for which data exists. Later relative months are left empty.
    pub fn with_as_of(mut self, as_of: Option<CohortKey>) -> Self {
        self.as_of = as_of;
        self
    }

    pub fn build(&self, assignment: &CohortAssignment<'_>) -> CohortMatrix {
        let mut rows = BTreeMap::new();

        for cohort in &assignment.cohorts {
            let horizon = self.horizon_for(&cohort.key);
            let width = horizon.map_or(0, |h| h as usize + 1);
            let mut counts: BTreeMap<Stage, Vec<u64>> = self
                .stages
                .iter()
                .map(|stage| (*stage, vec![0; width]))
                .collect();

            for lead in &cohort.leads {
                for event in &lead.events {
                    if let Some(slots) = counts.get_mut(&event.stage) {
                        if let Some(slot) = slots.get_mut(event.month_rel as usize) {
                            *slot += 1;
                        }
                    }
                }
            }

            rows.insert(
                cohort.key,
                MatrixRow {
                    size: cohort.size(),
                    horizon,
                    counts,
                },
            );
        }

        debug!(
            cohorts = rows.len(),
            window = self.window,
            stages = self.stages.len(),
            "Cohort matrix built"
        );

        CohortMatrix {
            window: self.window,
            stages: self.stages.clone(),
            rows,
        }
    }

    fn horizon_for(&self, cohort: &CohortKey) -> Option<u32> {
        match self.as_of {
            None => Some(self.window),
            Some(as_of) => {
                let elapsed = cohort.months_until(&as_of);
                (elapsed >= 0).then(|| (elapsed as u32).min(self.window))
            }
        }
    }
}

impl CohortMatrix {
    pub fn window(&self) -> u32 {
        self.window
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn cohorts(&self) -> impl Iterator<Item = &CohortKey> {
        self.rows.keys()
    }

    pub fn size(&self, cohort: &CohortKey) -> Option<u64> {
        self.rows.get(cohort).map(|r| r.size)
    }

    pub fn horizon(&self, cohort: &CohortKey) -> Option<u32> {
        self.rows.get(cohort).and_then(|r| r.horizon)
    }

    /// Per-month counts for one `(cohort, stage)`, indexed by relative month.
    pub fn month_counts(&self, cohort: &CohortKey, stage: Stage) -> Option<&[u64]> {
        self.rows
            .get(cohort)
            .and_then(|r| r.counts.get(&stage))
            .map(Vec::as_slice)
    }

    pub fn cell(
        &self,
        cohort: &CohortKey,
        month_rel: u32,
        stage: Stage,
        mode: MatrixMode,
    ) -> Option<CohortMatrixCell> {
        let row = self.rows.get(cohort)?;
        let slots = row.counts.get(&stage)?;
        let idx = month_rel as usize;
        if idx >= slots.len() {
            return None;
        }
        let count = match mode {
            MatrixMode::PerMonth => slots[idx],
            MatrixMode::Cumulative => slots[..=idx].iter().sum(),
        };
        Some(make_cell(*cohort, month_rel, stage, count, row.size))
    }

    /// All cells of one `(cohort, stage)` pair in month order.
    pub fn series(&self, cohort: &CohortKey, stage: Stage, mode: MatrixMode) -> Vec<CohortMatrixCell> {
        let Some(row) = self.rows.get(cohort) else {
            return Vec::new();
        };
        let Some(slots) = row.counts.get(&stage) else {
            return Vec::new();
        };
        let mut running = 0u64;
        slots
            .iter()
            .enumerate()
            .map(|(m, count)| {
                running += count;
                let value = match mode {
                    MatrixMode::PerMonth => *count,
                    MatrixMode::Cumulative => running,
                };
                make_cell(*cohort, m as u32, stage, value, row.size)
            })
            .collect()
    }

    /// Every present cell, ordered by cohort, stage, then relative month.
    pub fn cells(&self, mode: MatrixMode) -> Vec<CohortMatrixCell> {
        self.rows
            .keys()
            .flat_map(|cohort| {
                self.stages
                    .iter()
                    .flat_map(move |stage| self.series(cohort, *stage, mode))
            })
            .collect()
    }

    /// Cells for a single stage across all cohorts.
    pub fn heatmap(&self, stage: Stage, mode: MatrixMode) -> Vec<CohortMatrixCell> {
        self.rows
            .keys()
            .flat_map(|cohort| self.series(cohort, stage, mode))
            .collect()
    }

    /// Cumulative reach of each tracked stage at the cohort's horizon.
    pub fn stage_progression(&self, cohort: &CohortKey) -> Vec<StageProgress> {
        let Some(row) = self.rows.get(cohort) else {
            return Vec::new();
        };
        row.counts
            .iter()
            .map(|(stage, slots)| {
                let count: u64 = slots.iter().sum();
                StageProgress {
                    stage: *stage,
                    count,
                    pct: pct_of(count, row.size),
                }
            })
            .collect()
    }
}

fn make_cell(cohort: CohortKey, month_rel: u32, stage: Stage, count: u64, size: u64) -> CohortMatrixCell {
    CohortMatrixCell {
        cohort,
        month_rel,
        stage,
        count,
        pct: pct_of(count, size),
        total_size: size,
    }
}

/// Percentage rounded to one decimal; `0.0` for an empty base.
pub(crate) fn pct_of(count: u64, size: u64) -> f64 {
    if size == 0 {
        return 0.0;
    }
    round1(count as f64 / size as f64 * 100.0)
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cohort::tests::make_lead;
    use crate::cohort::CohortAssigner;
    use leadflow_core::types::Lead;

    fn key(s: &str) -> CohortKey {
        s.parse().unwrap()
    }

    fn fixture() -> Vec<Lead> {
        vec![
            make_lead("a", "2024-01-05", &[(Stage::Visita, "2024-01-20"), (Stage::Contrato, "2024-03-02")]),
            make_lead("b", "2024-01-11", &[(Stage::Visita, "2024-02-03")]),
            make_lead("c", "2024-01-19", &[(Stage::Visita, "2024-02-10"), (Stage::Contrato, "2024-02-28")]),
            make_lead("d", "2024-02-01", &[(Stage::Visita, "2024-02-02")]),
        ]
    }

    #[test]
    fn test_per_month_counts_and_pct() {
        let leads = fixture();
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(3).build(&assignment);

        let jan = key("2024-01");
        let cell = matrix.cell(&jan, 1, Stage::Visita, MatrixMode::PerMonth).unwrap();
        assert_eq!(cell.count, 2);
        assert_eq!(cell.total_size, 3);
        assert!((cell.pct - 66.7).abs() < 1e-9);

        let zero = matrix.cell(&jan, 3, Stage::Visita, MatrixMode::PerMonth).unwrap();
        assert_eq!(zero.count, 0);
        assert_eq!(zero.pct, 0.0);
    }

    #[test]
    fn test_cumulative_final_month_equals_sum_of_months() {
        let leads = fixture();
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(4).build(&assignment);

        for cohort in matrix.cohorts().copied().collect::<Vec<_>>() {
            for stage in matrix.stages().to_vec() {
                let per_month: u64 = matrix
                    .series(&cohort, stage, MatrixMode::PerMonth)
                    .iter()
                    .map(|c| c.count)
                    .sum();
                let last = matrix.series(&cohort, stage, MatrixMode::Cumulative);
                assert_eq!(last.last().unwrap().count, per_month);
            }
        }
    }

    #[test]
    fn test_as_of_leaves_future_months_empty() {
        let leads = fixture();
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(6)
            .with_as_of(Some(key("2024-03")))
            .build(&assignment);

        let feb = key("2024-02");
        assert_eq!(matrix.horizon(&feb), Some(1));
        assert!(matrix.cell(&feb, 1, Stage::Contrato, MatrixMode::PerMonth).is_some());
        assert!(matrix.cell(&feb, 2, Stage::Contrato, MatrixMode::PerMonth).is_none());
        assert_eq!(matrix.horizon(&key("2024-01")), Some(2));
    }

    #[test]
    fn test_events_beyond_window_are_ignored() {
        let leads = vec![make_lead("a", "2024-01-05", &[(Stage::Contrato, "2024-09-01")])];
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(3).build(&assignment);
        let jan = key("2024-01");
        let total: u64 = matrix.month_counts(&jan, Stage::Contrato).unwrap().iter().sum();
        assert_eq!(total, 0);
        assert!(matrix.cell(&jan, 8, Stage::Contrato, MatrixMode::PerMonth).is_none());
    }

    #[test]
    fn test_stage_selection_and_progression() {
        let leads = fixture();
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(3)
            .with_stages(&[Stage::Contrato, Stage::Visita, Stage::Visita])
            .build(&assignment);

        assert_eq!(matrix.stages(), &[Stage::Visita, Stage::Contrato]);
        assert_eq!(matrix.heatmap(Stage::Contrato, MatrixMode::Cumulative).len(), 8);
        assert!(matrix.cell(&key("2024-01"), 0, Stage::Oferta, MatrixMode::PerMonth).is_none());

        let progression = matrix.stage_progression(&key("2024-01"));
        let contrato = progression.iter().find(|p| p.stage == Stage::Contrato).unwrap();
        assert_eq!(contrato.count, 2);
        assert!((contrato.pct - 66.7).abs() < 1e-9);
    }

    #[test]
    fn test_cells_wire_format() {
        let leads = fixture();
        let assignment = CohortAssigner::new().assign(&leads);
        let matrix = MatrixBuilder::new(3).with_stages(&[Stage::Visita]).build(&assignment);
        let cells = matrix.cells(MatrixMode::PerMonth);
        assert_eq!(cells.len(), 8);
        let json = serde_json::to_value(&cells[0]).unwrap();
        assert_eq!(json["cohort"], "2024-01");
        assert_eq!(json["stage"], "VISITA");
        assert_eq!(json["month_rel"], 0);
    }
}
