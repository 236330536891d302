//! Headline KPIs: per-cohort summary rows rolled up into a snapshot, with
//! period-over-period variation.

use crate::cohort::CohortAssignment;
use crate::matrix::CohortMatrix;
use crate::percentile::{median, percentile_opt};
use crate::time_to_event;
use leadflow_core::types::{CohortKey, GroupBy, Lead, Stage};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One cohort's funnel outcome. "Contract" is the configured target stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CohortSummaryRow {
    pub cohort: CohortKey,
    pub size: u64,
    /// Cumulative reach of each tracked stage at the cohort's horizon.
    pub stage_pct_cum: BTreeMap<Stage, f64>,
    pub contract_pct_cum: f64,
    /// Days from acquisition; `None` when no lead converted.
    pub time_to_contract_p50: Option<f64>,
    pub time_to_contract_p90: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiSnapshot {
    pub cohorts: usize,
    pub total_leads: u64,
    pub total_contracts: u64,
    /// Volume-weighted: `total_contracts / total_leads * 100`.
    pub avg_contract_pct: f64,
    pub avg_cohort_size: f64,
    /// Median of the per-cohort P50s.
    pub median_ttc: Option<f64>,
    pub best_cohort: Option<CohortKey>,
    pub worst_cohort: Option<CohortKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDelta {
    pub current: f64,
    pub previous: f64,
    /// Percent change, sign flipped for lower-is-better metrics so that an
    /// improvement is always positive.
    pub variation: f64,
    pub lower_is_better: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiComparison {
    pub total_leads: KpiDelta,
    pub total_contracts: KpiDelta,
    pub avg_contract_pct: KpiDelta,
    pub avg_cohort_size: KpiDelta,
    pub median_ttc: Option<KpiDelta>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentRow {
    pub segment: String,
    pub leads: u64,
    pub contracts: u64,
    pub contract_pct: f64,
}

/// `(current - previous) / previous * 100`; from a zero base, `100` if
/// anything appeared and `0` otherwise.
pub fn variation(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        if current > 0.0 {
            100.0
        } else {
            0.0
        }
    } else {
        (current - previous) / previous * 100.0
    }
}

impl KpiDelta {
    pub fn new(current: f64, previous: f64, lower_is_better: bool) -> Self {
        let raw = variation(current, previous);
        Self {
            current,
            previous,
            variation: if lower_is_better { -raw } else { raw },
            lower_is_better,
        }
    }
}

impl KpiSnapshot {
    pub fn compare(&self, previous: &KpiSnapshot) -> KpiComparison {
        KpiComparison {
            total_leads: KpiDelta::new(self.total_leads as f64, previous.total_leads as f64, false),
            total_contracts: KpiDelta::new(
                self.total_contracts as f64,
                previous.total_contracts as f64,
                false,
            ),
            avg_contract_pct: KpiDelta::new(self.avg_contract_pct, previous.avg_contract_pct, false),
            avg_cohort_size: KpiDelta::new(self.avg_cohort_size, previous.avg_cohort_size, false),
            median_ttc: match (self.median_ttc, previous.median_ttc) {
                (Some(current), Some(prev)) => Some(KpiDelta::new(current, prev, true)),
                _ => None,
            },
        }
    }
}

pub struct KpiAggregator;

impl KpiAggregator {
    pub fn aggregate(rows: &[CohortSummaryRow]) -> KpiSnapshot {
        let total_leads: u64 = rows.iter().map(|r| r.size).sum();
        let total_contracts: u64 = rows.iter().map(contracts_of).sum();

        let avg_contract_pct = if total_leads > 0 {
            total_contracts as f64 / total_leads as f64 * 100.0
        } else {
            0.0
        };
        let avg_cohort_size = if rows.is_empty() {
            0.0
        } else {
            total_leads as f64 / rows.len() as f64
        };

        let p50s: Vec<f64> = rows.iter().filter_map(|r| r.time_to_contract_p50).collect();
        let median_ttc = (!p50s.is_empty()).then(|| median(&p50s));

        // Strict comparisons keep the earliest row on ties.
        let mut best: Option<&CohortSummaryRow> = None;
        let mut worst: Option<&CohortSummaryRow> = None;
        for row in rows {
            if best.map_or(true, |b| row.contract_pct_cum > b.contract_pct_cum) {
                best = Some(row);
            }
            if worst.map_or(true, |w| row.contract_pct_cum < w.contract_pct_cum) {
                worst = Some(row);
            }
        }

        KpiSnapshot {
            cohorts: rows.len(),
            total_leads,
            total_contracts,
            avg_contract_pct,
            avg_cohort_size,
            median_ttc,
            best_cohort: best.map(|r| r.cohort),
            worst_cohort: worst.map(|r| r.cohort),
        }
    }
}

fn contracts_of(row: &CohortSummaryRow) -> u64 {
    (row.size as f64 * row.contract_pct_cum / 100.0).round() as u64
}

/// One summary row per cohort in the matrix.
pub fn summarize(
    assignment: &CohortAssignment<'_>,
    matrix: &CohortMatrix,
    target: Stage,
) -> Vec<CohortSummaryRow> {
    assignment
        .cohorts
        .iter()
        .map(|cohort| {
            let progression = matrix.stage_progression(&cohort.key);
            let contract_pct_cum = progression
                .iter()
                .find(|p| p.stage == target)
                .map_or(0.0, |p| p.pct);
            let durations = match matrix.horizon(&cohort.key) {
                Some(horizon) => time_to_event::samples(cohort, target, horizon),
                None => Vec::new(),
            };
            CohortSummaryRow {
                cohort: cohort.key,
                size: cohort.size(),
                stage_pct_cum: progression.iter().map(|p| (p.stage, p.pct)).collect(),
                contract_pct_cum,
                time_to_contract_p50: percentile_opt(&durations, 50.0),
                time_to_contract_p90: percentile_opt(&durations, 90.0),
            }
        })
        .collect()
}

fn segment_of(lead: &Lead, group_by: GroupBy) -> &'static str {
    match group_by {
        GroupBy::Channel => lead.channel.as_str(),
        GroupBy::Device => lead.device.as_str(),
        GroupBy::PropertyType => lead.property_type.as_str(),
        GroupBy::TransactionType => lead.transaction_type.as_str(),
    }
}

/// Leads and target-stage conversions per value of `group_by`, counting
/// conversions inside each cohort's observable horizon.
pub fn segment_breakdown(
    assignment: &CohortAssignment<'_>,
    matrix: &CohortMatrix,
    group_by: GroupBy,
    target: Stage,
) -> Vec<SegmentRow> {
    let mut totals: BTreeMap<&'static str, (u64, u64)> = BTreeMap::new();

    for cohort in &assignment.cohorts {
        let horizon = matrix.horizon(&cohort.key);
        for lead in &cohort.leads {
            let entry = totals.entry(segment_of(lead.lead, group_by)).or_insert((0, 0));
            entry.0 += 1;
            let converted = lead
                .event(target)
                .zip(horizon)
                .is_some_and(|(event, h)| event.month_rel <= h);
            if converted {
                entry.1 += 1;
            }
        }
    }

    let mut rows: Vec<SegmentRow> = totals
        .into_iter()
        .map(|(segment, (leads, contracts))| SegmentRow {
            segment: segment.to_string(),
            leads,
            contracts,
            contract_pct: crate::matrix::pct_of(contracts, leads),
        })
        .collect();
    rows.sort_by(|a, b| b.leads.cmp(&a.leads).then_with(|| a.segment.cmp(&b.segment)));
    rows
}
