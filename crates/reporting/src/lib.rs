//! Cohort and conversion analytics: cohort matrices, retention and survival
//! curves, time-to-event percentiles, multi-touch attribution, A/B
//! significance and headline KPIs over real-estate lead funnels.

pub mod attribution;
pub mod cohort;
pub mod engine;
pub mod kpi;
pub mod matrix;
pub mod percentile;
pub mod retention;
pub mod source;
pub mod survival;
pub mod time_to_event;

pub use ab_test::{ABTestEngine, ABTestResult, ABTestVariant};
pub use attribution::AttributionEngine;
pub use cohort::CohortAssigner;
pub use engine::{compute, compute_from, AnalyticsResult};
pub use kpi::KpiAggregator;
pub use matrix::{MatrixBuilder, MatrixMode};
pub use retention::RetentionCalculator;
pub use source::{Dataset, InMemorySource, LeadSource};
pub use survival::SurvivalCalculator;
