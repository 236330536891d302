//! Record access for the engine. The engine only reads through
//! [`LeadSource`]; it never owns or mutates stored records.

use dashmap::DashMap;
use leadflow_core::types::{Channel, ChannelSpend, CohortKey, Lead, LeadJourney};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Already-fetched, already-validated records for one query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub leads: Vec<Lead>,
    #[serde(default)]
    pub journeys: Vec<LeadJourney>,
    #[serde(default)]
    pub spend: Vec<ChannelSpend>,
}

pub trait LeadSource {
    /// Leads acquired in `[from, to]`.
    fn leads(&self, from: CohortKey, to: CohortKey) -> Vec<Lead>;

    /// Journeys for the given leads; leads without one are omitted.
    fn journeys(&self, lead_ids: &[&str]) -> Vec<LeadJourney>;

    fn spend(&self) -> Vec<ChannelSpend>;
}

/// Concurrent in-memory store backed by `DashMap`.
pub struct InMemorySource {
    leads: DashMap<String, Lead>,
    journeys: DashMap<String, LeadJourney>,
    spend: DashMap<Channel, f64>,
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            leads: DashMap::new(),
            journeys: DashMap::new(),
            spend: DashMap::new(),
        }
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let source = Self::new();
        for lead in dataset.leads {
            source.insert_lead(lead);
        }
        for journey in dataset.journeys {
            source.insert_journey(journey);
        }
        for entry in dataset.spend {
            source.add_spend(entry.channel, entry.amount);
        }
        info!(
            leads = source.leads.len(),
            journeys = source.journeys.len(),
            "In-memory lead source loaded"
        );
        source
    }

    pub fn insert_lead(&self, lead: Lead) {
        self.leads.insert(lead.lead_id.clone(), lead);
    }

    pub fn insert_journey(&self, journey: LeadJourney) {
        self.journeys.insert(journey.lead_id.clone(), journey);
    }

    pub fn add_spend(&self, channel: Channel, amount: f64) {
        *self.spend.entry(channel).or_insert(0.0) += amount;
    }

    pub fn lead_count(&self) -> usize {
        self.leads.len()
    }
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl LeadSource for InMemorySource {
    fn leads(&self, from: CohortKey, to: CohortKey) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self
            .leads
            .iter()
            .filter(|entry| {
                let cohort = entry.value().cohort();
                cohort >= from && cohort <= to
            })
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap iteration order is arbitrary.
        leads.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.lead_id.cmp(&b.lead_id))
        });
        leads
    }

    fn journeys(&self, lead_ids: &[&str]) -> Vec<LeadJourney> {
        lead_ids
            .iter()
            .filter_map(|id| self.journeys.get(*id).map(|j| j.value().clone()))
            .collect()
    }

    fn spend(&self) -> Vec<ChannelSpend> {
        let mut spend: Vec<ChannelSpend> = self
            .spend
            .iter()
            .map(|entry| ChannelSpend {
                channel: *entry.key(),
                amount: *entry.value(),
            })
            .collect();
        spend.sort_by_key(|s| s.channel);
        spend
    }
}
