//! Cohort assignment: buckets leads by acquisition month and places each
//! stage event at its relative month.

use leadflow_core::error::DataError;
use leadflow_core::types::{CohortKey, Lead, Stage};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// A stage reached by a lead, relative to its acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignedEvent {
    pub stage: Stage,
    pub month_rel: u32,
    /// Whole days from acquisition to the event.
    pub days: i64,
}

#[derive(Debug, Clone)]
pub struct AssignedLead<'a> {
    pub lead: &'a Lead,
    pub events: Vec<AssignedEvent>,
}

impl AssignedLead<'_> {
    pub fn event(&self, stage: Stage) -> Option<&AssignedEvent> {
        self.events.iter().find(|e| e.stage == stage)
    }
}

/// Leads acquired in the same month. Built once, then only read.
#[derive(Debug, Clone)]
pub struct Cohort<'a> {
    pub key: CohortKey,
    pub leads: Vec<AssignedLead<'a>>,
}

impl Cohort<'_> {
    pub fn size(&self) -> u64 {
        self.leads.len() as u64
    }
}

#[derive(Debug, Clone, Default)]
pub struct CohortAssignment<'a> {
    /// Ordered by cohort key.
    pub cohorts: Vec<Cohort<'a>>,
    pub skipped: usize,
    pub errors: Vec<DataError>,
}

impl CohortAssignment<'_> {
    pub fn total_leads(&self) -> u64 {
        self.cohorts.iter().map(Cohort::size).sum()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CohortAssigner;

impl CohortAssigner {
    pub fn new() -> Self {
        Self
    }

    /// Assign every lead to its acquisition-month cohort. A lead with any
    /// event dated before its acquisition is left out entirely and tallied.
    pub fn assign<'a>(&self, leads: impl IntoIterator<Item = &'a Lead>) -> CohortAssignment<'a> {
        let mut by_month: BTreeMap<CohortKey, Vec<AssignedLead<'a>>> = BTreeMap::new();
        let mut skipped = 0usize;
        let mut errors = Vec::new();

        for lead in leads {
            match self.assign_lead(lead) {
                Ok(assigned) => by_month.entry(lead.cohort()).or_default().push(assigned),
                Err(err) => {
                    warn!(lead_id = %lead.lead_id, error = %err, "Skipping lead");
                    skipped += 1;
                    errors.push(err);
                }
            }
        }

        let cohorts: Vec<Cohort<'a>> = by_month
            .into_iter()
            .map(|(key, leads)| Cohort { key, leads })
            .collect();

        debug!(cohorts = cohorts.len(), skipped, "Cohorts assigned");

        CohortAssignment {
            cohorts,
            skipped,
            errors,
        }
    }

    pub fn assign_lead<'a>(&self, lead: &'a Lead) -> Result<AssignedLead<'a>, DataError> {
        let cohort = lead.cohort();
        let mut events = Vec::with_capacity(lead.stages.len() + 1);

        // Acquisition itself is the LEAD stage when the source omits it.
        if !lead.stages.contains_key(&Stage::Lead) {
            events.push(AssignedEvent {
                stage: Stage::Lead,
                month_rel: 0,
                days: 0,
            });
        }

        for event in lead.events() {
            let month_rel = cohort.months_until(&CohortKey::from_date(event.timestamp));
            let days = (event.timestamp - lead.acquired_at).num_days();
            if month_rel < 0 || days < 0 {
                return Err(DataError::EventBeforeAcquisition {
                    lead_id: event.lead_id,
                    stage: event.stage,
                    month_rel,
                });
            }
            events.push(AssignedEvent {
                stage: event.stage,
                month_rel: month_rel as u32,
                days,
            });
        }
        events.sort_by_key(|e| e.stage);

        Ok(AssignedLead { lead, events })
    }
}
