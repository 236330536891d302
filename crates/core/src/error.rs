use crate::types::{CohortKey, Stage};
use thiserror::Error;

pub type LeadflowResult<T> = Result<T, LeadflowError>;

#[derive(Error, Debug)]
pub enum LeadflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Filter validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// A record that breaks an invariant the engine relies on. These never abort
/// a computation or surface as a [`LeadflowError`]: the offending lead or
/// series is skipped and tallied.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataError {
    #[error("lead {lead_id}: stage {stage} lands {month_rel} month(s) before acquisition")]
    EventBeforeAcquisition {
        lead_id: String,
        stage: Stage,
        month_rel: i32,
    },

    #[error("cohort {cohort}: cumulative pct fell from {previous} to {current} at month {month_rel}")]
    RetentionDecreasing {
        cohort: CohortKey,
        month_rel: u32,
        previous: f64,
        current: f64,
    },

    #[error("cohort {cohort}: {events} event(s) at month {month_rel} exceed {at_risk} at risk")]
    AtRiskUnderflow {
        cohort: CohortKey,
        month_rel: u32,
        at_risk: u64,
        events: u64,
    },
}
