//! Typed filter set for an analytics query, plus the boundary validator
//! that checks it once before the engine runs.

use crate::config::AnalyticsConfig;
use crate::error::{LeadflowError, LeadflowResult};
use crate::types::{Channel, CohortKey, Device, Lead, PropertyType, TransactionType};
use serde::{Deserialize, Serialize};

pub const MAX_SPAN_MONTHS: i32 = 36;
pub const MIN_WINDOW_MONTHS: u32 = 3;
pub const MAX_WINDOW_MONTHS: u32 = 18;

/// Selection applied to leads before cohort assignment. Empty lists mean
/// "no restriction" on that dimension.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsFilters {
    pub from: CohortKey,
    pub to: CohortKey,
    #[serde(default)]
    pub channels: Vec<Channel>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub property_types: Vec<PropertyType>,
    #[serde(default)]
    pub transaction_types: Vec<TransactionType>,
    #[serde(default)]
    pub size_min: Option<f64>,
    #[serde(default)]
    pub size_max: Option<f64>,
    #[serde(default)]
    pub price_min: Option<f64>,
    #[serde(default)]
    pub price_max: Option<f64>,
    /// Last month with data. Relative months after it read as "no data".
    #[serde(default)]
    pub as_of: Option<CohortKey>,
}

impl AnalyticsFilters {
    pub fn new(from: CohortKey, to: CohortKey) -> Self {
        Self {
            from,
            to,
            channels: Vec::new(),
            devices: Vec::new(),
            property_types: Vec::new(),
            transaction_types: Vec::new(),
            size_min: None,
            size_max: None,
            price_min: None,
            price_max: None,
            as_of: None,
        }
    }

    pub fn with_as_of(mut self, as_of: CohortKey) -> Self {
        self.as_of = Some(as_of);
        self
    }

    pub fn with_channels(mut self, channels: Vec<Channel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_devices(mut self, devices: Vec<Device>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_price_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.price_min = min;
        self.price_max = max;
        self
    }

    pub fn with_size_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.size_min = min;
        self.size_max = max;
        self
    }

    pub fn contains_month(&self, month: &CohortKey) -> bool {
        *month >= self.from && *month <= self.to
    }

    /// Months covered, inclusive of both ends.
    pub fn span_months(&self) -> i32 {
        self.from.months_until(&self.to) + 1
    }

    /// The equally long range that ends the month before `from`.
    pub fn previous_period(&self) -> AnalyticsFilters {
        let span = self.span_months();
        AnalyticsFilters {
            from: self.from.add_months(-span),
            to: self.from.add_months(-1),
            ..self.clone()
        }
    }

    /// Whether `lead` passes every dimension of the selection.
    pub fn matches(&self, lead: &Lead) -> bool {
        self.contains_month(&lead.cohort())
            && (self.channels.is_empty() || self.channels.contains(&lead.channel))
            && (self.devices.is_empty() || self.devices.contains(&lead.device))
            && (self.property_types.is_empty() || self.property_types.contains(&lead.property_type))
            && (self.transaction_types.is_empty()
                || self.transaction_types.contains(&lead.transaction_type))
            && within(lead.size_m2, self.size_min, self.size_max)
            && within(lead.price, self.price_min, self.price_max)
    }
}

/// Leads without a value only pass when the bound is open.
fn within(value: Option<f64>, min: Option<f64>, max: Option<f64>) -> bool {
    match value {
        Some(v) => min.map_or(true, |m| v >= m) && max.map_or(true, |m| v <= m),
        None => min.is_none() && max.is_none(),
    }
}

/// Reject a filter/config pair the engine must not be asked to evaluate.
pub fn validate(filters: &AnalyticsFilters, config: &AnalyticsConfig) -> LeadflowResult<()> {
    if filters.from > filters.to {
        return Err(LeadflowError::Validation(format!(
            "from {} is after to {}",
            filters.from, filters.to
        )));
    }
    if filters.span_months() > MAX_SPAN_MONTHS {
        return Err(LeadflowError::Validation(format!(
            "range spans {} months, at most {MAX_SPAN_MONTHS} allowed",
            filters.span_months()
        )));
    }
    if !(MIN_WINDOW_MONTHS..=MAX_WINDOW_MONTHS).contains(&config.window_months) {
        return Err(LeadflowError::Validation(format!(
            "window of {} months outside [{MIN_WINDOW_MONTHS}, {MAX_WINDOW_MONTHS}]",
            config.window_months
        )));
    }
    if let Some(as_of) = filters.as_of {
        if as_of < filters.from {
            return Err(LeadflowError::Validation(format!(
                "as-of month {as_of} precedes from {}",
                filters.from
            )));
        }
    }
    check_bounds("size", filters.size_min, filters.size_max)?;
    check_bounds("price", filters.price_min, filters.price_max)?;
    if config.stages.is_empty() {
        return Err(LeadflowError::Validation("no stages selected".to_string()));
    }
    Ok(())
}

fn check_bounds(name: &str, min: Option<f64>, max: Option<f64>) -> LeadflowResult<()> {
    for bound in [min, max].into_iter().flatten() {
        if !bound.is_finite() || bound < 0.0 {
            return Err(LeadflowError::Validation(format!(
                "{name} bound {bound} must be a non-negative number"
            )));
        }
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(LeadflowError::Validation(format!(
                "{name} minimum {min} exceeds maximum {max}"
            )));
        }
    }
    Ok(())
}
