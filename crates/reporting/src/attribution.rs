//! Multi-touch attribution: splits lead and contract credit across the
//! channels a lead touched, then rolls credit up per channel with CPL/CPA.

use leadflow_core::types::{AttributionModel, AttributionTouch, Channel, ChannelSpend, LeadJourney};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const USHAPED_END_WEIGHT: f64 = 0.4;

/// Per-channel weights for one lead; sums to 1.0 for a non-empty journey.
pub type Credit = BTreeMap<Channel, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionRow {
    pub channel: Channel,
    pub attributed_leads: f64,
    pub attributed_contracts: f64,
    /// Share of all contract credit, normalized to 100 across channels.
    pub contribution_pct: f64,
    pub spend: f64,
    /// Cost per attributed lead; `None` without lead credit.
    pub cpl: Option<f64>,
    /// Cost per attributed contract; `None` without contract credit.
    pub cpa: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributionReport {
    pub model: AttributionModel,
    pub journeys: usize,
    pub conversions: usize,
    /// Ordered by contract credit, then lead credit, descending.
    pub rows: Vec<AttributionRow>,
}

/// Credit for one ordered touch sequence. Empty input yields empty credit.
pub fn credit(touches: &[AttributionTouch], model: AttributionModel) -> Credit {
    let mut credit = Credit::new();
    let n = touches.len();
    if n == 0 {
        return credit;
    }
    let first = touches[0].channel;
    let last = touches[n - 1].channel;

    match model {
        AttributionModel::Last => add(&mut credit, last, 1.0),
        AttributionModel::First => add(&mut credit, first, 1.0),
        AttributionModel::Linear => {
            let share = 1.0 / n as f64;
            for touch in touches {
                add(&mut credit, touch.channel, share);
            }
        }
        AttributionModel::Ushaped => match n {
            1 => add(&mut credit, first, 1.0),
            2 => {
                add(&mut credit, first, 0.5);
                add(&mut credit, last, 0.5);
            }
            _ => {
                add(&mut credit, first, USHAPED_END_WEIGHT);
                add(&mut credit, last, USHAPED_END_WEIGHT);
                let middle = (1.0 - 2.0 * USHAPED_END_WEIGHT) / (n - 2) as f64;
                for touch in &touches[1..n - 1] {
                    add(&mut credit, touch.channel, middle);
                }
            }
        },
    }

    credit
}

fn add(credit: &mut Credit, channel: Channel, weight: f64) {
    *credit.entry(channel).or_insert(0.0) += weight;
}

/// Touches that led up to the conversion: everything through the first
/// converting touch. `None` when the journey never converted.
pub fn converting_path(journey: &LeadJourney) -> Option<&[AttributionTouch]> {
    journey
        .touches
        .iter()
        .position(|t| t.converted)
        .map(|idx| &journey.touches[..=idx])
}

pub struct AttributionEngine {
    model: AttributionModel,
}

impl AttributionEngine {
    pub fn new(model: AttributionModel) -> Self {
        Self { model }
    }

    pub fn model(&self) -> AttributionModel {
        self.model
    }

    pub fn attribute(&self, journeys: &[LeadJourney], spend: &[ChannelSpend]) -> AttributionReport {
        let mut lead_credit = Credit::new();
        let mut contract_credit = Credit::new();
        let mut conversions = 0usize;

        for journey in journeys {
            for (channel, weight) in credit(&journey.touches, self.model) {
                add(&mut lead_credit, channel, weight);
            }
            if let Some(path) = converting_path(journey) {
                conversions += 1;
                for (channel, weight) in credit(path, self.model) {
                    add(&mut contract_credit, channel, weight);
                }
            }
        }

        let mut spend_by_channel: BTreeMap<Channel, f64> = BTreeMap::new();
        for entry in spend {
            *spend_by_channel.entry(entry.channel).or_insert(0.0) += entry.amount;
        }

        let total_contract_credit: f64 = contract_credit.values().sum();
        let mut channels: Vec<Channel> = lead_credit
            .keys()
            .chain(spend_by_channel.keys())
            .copied()
            .collect();
        channels.sort();
        channels.dedup();

        let mut rows: Vec<AttributionRow> = channels
            .into_iter()
            .map(|channel| {
                let leads = lead_credit.get(&channel).copied().unwrap_or(0.0);
                let contracts = contract_credit.get(&channel).copied().unwrap_or(0.0);
                let spend = spend_by_channel.get(&channel).copied().unwrap_or(0.0);
                AttributionRow {
                    channel,
                    attributed_leads: leads,
                    attributed_contracts: contracts,
                    contribution_pct: if total_contract_credit > 0.0 {
                        contracts / total_contract_credit * 100.0
                    } else {
                        0.0
                    },
                    spend,
                    cpl: per_unit(spend, leads),
                    cpa: per_unit(spend, contracts),
                }
            })
            .collect();

        rows.sort_by(|a, b| {
            b.attributed_contracts
                .total_cmp(&a.attributed_contracts)
                .then(b.attributed_leads.total_cmp(&a.attributed_leads))
        });

        debug!(
            model = ?self.model,
            journeys = journeys.len(),
            conversions,
            channels = rows.len(),
            "Attribution computed"
        );

        AttributionReport {
            model: self.model,
            journeys: journeys.len(),
            conversions,
            rows,
        }
    }
}

fn per_unit(spend: f64, units: f64) -> Option<f64> {
    (units > 0.0).then(|| spend / units)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn journey(id: &str, channels: &[Channel], converted_at: Option<usize>) -> LeadJourney {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        LeadJourney {
            lead_id: id.to_string(),
            touches: channels
                .iter()
                .enumerate()
                .map(|(i, channel)| AttributionTouch {
                    channel: *channel,
                    timestamp: start + Duration::days(i as i64),
                    converted: converted_at == Some(i),
                })
                .collect(),
        }
    }

    fn touches(channels: &[Channel]) -> Vec<AttributionTouch> {
        journey("t", channels, None).touches
    }

    fn weight(credit: &Credit, channel: Channel) -> f64 {
        credit.get(&channel).copied().unwrap_or(0.0)
    }

    #[test]
    fn test_ushaped_four_touches() {
        use Channel::*;
        let credit = credit(&touches(&[Web, Portal, Ads, Referido]), AttributionModel::Ushaped);
        assert!((weight(&credit, Web) - 0.4).abs() < 1e-9);
        assert!((weight(&credit, Referido) - 0.4).abs() < 1e-9);
        assert!((weight(&credit, Portal) - 0.1).abs() < 1e-9);
        assert!((weight(&credit, Ads) - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_ushaped_short_journeys() {
        use Channel::*;
        let one = credit(&touches(&[Email]), AttributionModel::Ushaped);
        assert_eq!(weight(&one, Email), 1.0);
        let two = credit(&touches(&[Email, Ads]), AttributionModel::Ushaped);
        assert_eq!(weight(&two, Email), 0.5);
        assert_eq!(weight(&two, Ads), 0.5);
    }

    #[test]
    fn test_recurring_channel_accumulates() {
        use Channel::*;
        let ushaped = credit(&touches(&[Web, Web, Ads, Web]), AttributionModel::Ushaped);
        assert!((weight(&ushaped, Web) - 0.9).abs() < 1e-9);
        assert!((weight(&ushaped, Ads) - 0.1).abs() < 1e-9);

        let linear = credit(&touches(&[Web, Ads, Web]), AttributionModel::Linear);
        assert!((weight(&linear, Web) - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_first_and_last_touch() {
        use Channel::*;
        let path = touches(&[Portal, Ads, Referido]);
        assert_eq!(weight(&credit(&path, AttributionModel::First), Portal), 1.0);
        assert_eq!(weight(&credit(&path, AttributionModel::Last), Referido), 1.0);
    }

    #[test]
    fn test_credit_sums_to_one_for_every_model() {
        use Channel::*;
        let sequences: [&[Channel]; 5] = [
            &[Web],
            &[Web, Ads],
            &[Web, Portal, Ads],
            &[Redes, Redes, Email, Portal, Oficina, Web, Redes],
            &[Ads, Ads, Ads, Ads, Ads, Ads, Ads, Ads, Ads, Ads, Ads],
        ];
        let models = [
            AttributionModel::Last,
            AttributionModel::First,
            AttributionModel::Linear,
            AttributionModel::Ushaped,
        ];
        for seq in sequences {
            for model in models {
                let total: f64 = credit(&touches(seq), model).values().sum();
                assert!((total - 1.0).abs() < 1e-9, "{model:?} over {seq:?} sums to {total}");
            }
        }
        assert!(credit(&[], AttributionModel::Linear).is_empty());
    }

    #[test]
    fn test_report_contribution_and_costs() {
        use Channel::*;
        let journeys = vec![
            journey("a", &[Web, Portal], Some(1)),
            journey("b", &[Ads], None),
            journey("c", &[Portal, Ads, Web], Some(1)),
        ];
        let spend = vec![
            ChannelSpend { channel: Ads, amount: 900.0 },
            ChannelSpend { channel: Portal, amount: 400.0 },
            ChannelSpend { channel: Email, amount: 50.0 },
        ];
        let report = AttributionEngine::new(AttributionModel::Last).attribute(&journeys, &spend);

        assert_eq!(report.journeys, 3);
        assert_eq!(report.conversions, 2);

        let row = |c: Channel| report.rows.iter().find(|r| r.channel == c).unwrap();
        // Contract credit stops at the converting touch: a -> portal, c -> ads.
        assert_eq!(row(Portal).attributed_contracts, 1.0);
        assert_eq!(row(Ads).attributed_contracts, 1.0);
        assert_eq!(row(Web).attributed_contracts, 0.0);
        assert_eq!(row(Portal).contribution_pct, 50.0);

        // Lead credit uses the whole journey: a -> portal, b -> ads, c -> web.
        assert_eq!(row(Ads).attributed_leads, 1.0);
        assert_eq!(row(Ads).cpl, Some(900.0));
        assert_eq!(row(Ads).cpa, Some(900.0));
        assert_eq!(row(Web).cpa, None);
        assert_eq!(row(Email).cpl, None);

        let total: f64 = report.rows.iter().map(|r| r.contribution_pct).sum();
        assert!((total - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_conversions_reads_zero_contribution() {
        let journeys = vec![journey("a", &[Channel::Web], None)];
        let report = AttributionEngine::new(AttributionModel::Linear).attribute(&journeys, &[]);
        assert_eq!(report.rows.len(), 1);
        assert_eq!(report.rows[0].contribution_pct, 0.0);
        assert_eq!(report.rows[0].cpl, Some(0.0));
    }
}
