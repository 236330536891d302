//! `compute(filters, records) -> AnalyticsResult`: the single entry point the
//! reporting layer calls whenever a filter set changes. Each call is a pure
//! function of its inputs, so a superseded query can simply be dropped.

use crate::attribution::{AttributionEngine, AttributionReport};
use crate::cohort::{CohortAssigner, CohortAssignment};
use crate::kpi::{self, CohortSummaryRow, KpiAggregator, KpiComparison, KpiSnapshot, SegmentRow};
use crate::matrix::{CohortMatrix, CohortMatrixCell, MatrixBuilder, MatrixMode};
use crate::retention::{RetentionCalculator, RetentionPoint};
use crate::source::{Dataset, LeadSource};
use crate::survival::{SurvivalCalculator, SurvivalPoint};
use crate::time_to_event::{self, TimeToEventPoint};
use chrono::{DateTime, Utc};
use leadflow_core::config::AnalyticsConfig;
use leadflow_core::filter::AnalyticsFilters;
use leadflow_core::types::{ChannelSpend, Lead, LeadJourney, Stage};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::info;

/// Records discarded because they broke an invariant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipTally {
    pub leads: usize,
    pub retention_series: usize,
    pub survival_series: usize,
}

impl SkipTally {
    pub fn total(&self) -> usize {
        self.leads + self.retention_series + self.survival_series
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsResult {
    pub filters: AnalyticsFilters,
    pub window_months: u32,
    pub target_stage: Stage,
    pub cohorts: Vec<CohortSummaryRow>,
    pub matrix: Vec<CohortMatrixCell>,
    pub matrix_cumulative: Vec<CohortMatrixCell>,
    pub retention: Vec<RetentionPoint>,
    pub survival: Vec<SurvivalPoint>,
    pub time_to_event: Vec<TimeToEventPoint>,
    pub attribution: AttributionReport,
    pub segments: Vec<SegmentRow>,
    pub kpis: KpiSnapshot,
    pub previous_kpis: Option<KpiSnapshot>,
    pub comparison: Option<KpiComparison>,
    pub skipped: SkipTally,
    pub computed_at: DateTime<Utc>,
}

/// Fetch what `filters` needs from `source` (current and, if enabled,
/// previous period) and run [`compute`].
pub fn compute_from(
    config: &AnalyticsConfig,
    filters: &AnalyticsFilters,
    source: &dyn LeadSource,
) -> AnalyticsResult {
    let from = if config.compare_previous {
        filters.previous_period().from
    } else {
        filters.from
    };
    let leads = source.leads(from, filters.to);
    let ids: Vec<&str> = leads
        .iter()
        .filter(|l| filters.matches(l))
        .map(|l| l.lead_id.as_str())
        .collect();
    let journeys = source.journeys(&ids);

    let dataset = Dataset {
        journeys,
        spend: source.spend(),
        leads,
    };
    compute(config, filters, &dataset)
}

pub fn compute(config: &AnalyticsConfig, filters: &AnalyticsFilters, records: &Dataset) -> AnalyticsResult {
    metrics::counter!("leadflow.compute_runs").increment(1);

    let target = config.target_stage;
    let window = config.window_months;
    let current = CohortView::build(config, filters, &records.leads);

    let retention = RetentionCalculator::new(target).compute(&current.matrix);
    let survival = SurvivalCalculator::new(target).compute(&current.matrix);
    let time_to_event = time_to_event::compute(&current.assignment, &current.matrix, target);
    let cohorts = kpi::summarize(&current.assignment, &current.matrix, target);
    let segments = kpi::segment_breakdown(&current.assignment, &current.matrix, config.group_by, target);
    let kpis = KpiAggregator::aggregate(&cohorts);

    let attribution = attribute(config, &current.assignment, &records.journeys, &records.spend);

    let previous_kpis = if config.compare_previous {
        let previous = filters.previous_period();
        let view = CohortView::build(config, &previous, &records.leads);
        (view.assignment.total_leads() > 0).then(|| {
            KpiAggregator::aggregate(&kpi::summarize(&view.assignment, &view.matrix, target))
        })
    } else {
        None
    };
    let comparison = previous_kpis.as_ref().map(|prev| kpis.compare(prev));

    let skipped = SkipTally {
        leads: current.assignment.skipped,
        retention_series: retention.skipped,
        survival_series: survival.skipped,
    };
    if skipped.leads > 0 {
        metrics::counter!("leadflow.skipped_leads").increment(skipped.leads as u64);
    }
    if skipped.retention_series + skipped.survival_series > 0 {
        metrics::counter!("leadflow.skipped_series")
            .increment((skipped.retention_series + skipped.survival_series) as u64);
    }

    info!(
        from = %filters.from,
        to = %filters.to,
        cohorts = cohorts.len(),
        leads = kpis.total_leads,
        contracts = kpis.total_contracts,
        skipped = skipped.total(),
        "Analytics computed"
    );

    AnalyticsResult {
        filters: filters.clone(),
        window_months: window,
        target_stage: target,
        matrix: current.matrix.cells(MatrixMode::PerMonth),
        matrix_cumulative: current.matrix.cells(MatrixMode::Cumulative),
        cohorts,
        retention: retention.points,
        survival: survival.points,
        time_to_event,
        attribution,
        segments,
        kpis,
        previous_kpis,
        comparison,
        skipped,
        computed_at: Utc::now(),
    }
}

/// Assignment plus matrix for one filter set.
struct CohortView<'a> {
    assignment: CohortAssignment<'a>,
    matrix: CohortMatrix,
}

impl<'a> CohortView<'a> {
    fn build(config: &AnalyticsConfig, filters: &AnalyticsFilters, leads: &'a [Lead]) -> Self {
        let assignment = CohortAssigner::new().assign(leads.iter().filter(|l| filters.matches(l)));

        let mut stages = config.stages.clone();
        stages.push(config.target_stage);
        let matrix = MatrixBuilder::new(config.window_months)
            .with_stages(&stages)
            .with_as_of(filters.as_of)
            .build(&assignment);

        Self { assignment, matrix }
    }
}

/// Attribution over the journeys of leads that made it into a cohort.
fn attribute(
    config: &AnalyticsConfig,
    assignment: &CohortAssignment<'_>,
    journeys: &[LeadJourney],
    spend: &[ChannelSpend],
) -> AttributionReport {
    let included: HashSet<&str> = assignment
        .cohorts
        .iter()
        .flat_map(|c| c.leads.iter().map(|l| l.lead.lead_id.as_str()))
        .collect();
    let selected: Vec<LeadJourney> = journeys
        .iter()
        .filter(|j| included.contains(j.lead_id.as_str()))
        .cloned()
        .collect();

    AttributionEngine::new(config.attribution_model).attribute(&selected, spend)
}
