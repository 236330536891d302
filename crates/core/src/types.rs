use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ─── Pipeline stages ────────────────────────────────────────────────────────

/// Sales pipeline stage. Declaration order is pipeline order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    Lead,
    Visita,
    Oferta,
    Reserva,
    Contrato,
    Escritura,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::Lead,
        Stage::Visita,
        Stage::Oferta,
        Stage::Reserva,
        Stage::Contrato,
        Stage::Escritura,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Lead => "LEAD",
            Stage::Visita => "VISITA",
            Stage::Oferta => "OFERTA",
            Stage::Reserva => "RESERVA",
            Stage::Contrato => "CONTRATO",
            Stage::Escritura => "ESCRITURA",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Stage::ALL
            .into_iter()
            .find(|stage| stage.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

// ─── Lead dimensions ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Web,
    Portal,
    Ads,
    Referido,
    Redes,
    Email,
    Oficina,
}

impl Channel {
    pub const ALL: [Channel; 7] = [
        Channel::Web,
        Channel::Portal,
        Channel::Ads,
        Channel::Referido,
        Channel::Redes,
        Channel::Email,
        Channel::Oficina,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Web => "web",
            Channel::Portal => "portal",
            Channel::Ads => "ads",
            Channel::Referido => "referido",
            Channel::Redes => "redes",
            Channel::Email => "email",
            Channel::Oficina => "oficina",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Device {
    Desktop,
    Mobile,
    Tablet,
}

impl Device {
    pub const ALL: [Device; 3] = [Device::Desktop, Device::Mobile, Device::Tablet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Device::Desktop => "desktop",
            Device::Mobile => "mobile",
            Device::Tablet => "tablet",
        }
    }
}

impl FromStr for Channel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Channel::ALL
            .into_iter()
            .find(|channel| channel.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown channel '{s}'"))
    }
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Device::ALL
            .into_iter()
            .find(|device| device.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown device '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Penthouse,
    Commercial,
    Land,
}

impl PropertyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Penthouse => "penthouse",
            PropertyType::Commercial => "commercial",
            PropertyType::Land => "land",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Sale,
    Rent,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Sale => "sale",
            TransactionType::Rent => "rent",
        }
    }
}

// ─── Engine selectors ───────────────────────────────────────────────────────

/// Rule for splitting conversion credit across a lead's touches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum AttributionModel {
    #[default]
    Last,
    First,
    Linear,
    Ushaped,
}

impl FromStr for AttributionModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "last" => Ok(Self::Last),
            "first" => Ok(Self::First),
            "linear" => Ok(Self::Linear),
            "ushaped" | "u-shaped" | "u_shaped" => Ok(Self::Ushaped),
            other => Err(format!("unknown attribution model '{other}'")),
        }
    }
}

/// How a two-proportion z-score is turned into a significance percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SignificanceMethod {
    /// `min(99.9, |z| * 33)`, the dashboard's historical rule.
    #[default]
    Heuristic,
    /// Two-tailed normal confidence, capped at 99.9.
    Exact,
}

/// Dimension used for segment breakdowns.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum GroupBy {
    #[default]
    Channel,
    Device,
    PropertyType,
    TransactionType,
}

// ─── Cohort key ─────────────────────────────────────────────────────────────

/// Acquisition month, rendered as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CohortKey {
    year: i32,
    month: u32,
}

impl CohortKey {
    /// Returns `None` unless `month` is in `1..=12`.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> u32 {
        self.month
    }

    /// Signed month distance from `self` to `later`.
    pub fn months_until(&self, later: &CohortKey) -> i32 {
        (later.year - self.year) * 12 + (later.month as i32 - self.month as i32)
    }

    pub fn add_months(&self, months: i32) -> CohortKey {
        let index = self.year * 12 + (self.month as i32 - 1) + months;
        CohortKey {
            year: index.div_euclid(12),
            month: index.rem_euclid(12) as u32 + 1,
        }
    }
}

impl fmt::Display for CohortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for CohortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, month) = s
            .split_once('-')
            .ok_or_else(|| format!("expected YYYY-MM, got '{s}'"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("expected YYYY-MM, got '{s}'"));
        }
        let year: i32 = year.parse().map_err(|_| format!("bad year in '{s}'"))?;
        let month: u32 = month.parse().map_err(|_| format!("bad month in '{s}'"))?;
        CohortKey::new(year, month).ok_or_else(|| format!("month out of range in '{s}'"))
    }
}

impl TryFrom<String> for CohortKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<CohortKey> for String {
    fn from(key: CohortKey) -> Self {
        key.to_string()
    }
}

// ─── Records ────────────────────────────────────────────────────────────────

/// A lead as delivered by the data source, already validated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub lead_id: String,
    pub acquired_at: NaiveDate,
    pub channel: Channel,
    pub device: Device,
    pub property_type: PropertyType,
    pub transaction_type: TransactionType,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub size_m2: Option<f64>,
    /// First date the lead reached each stage.
    #[serde(default)]
    pub stages: BTreeMap<Stage, NaiveDate>,
}

impl Lead {
    pub fn cohort(&self) -> CohortKey {
        CohortKey::from_date(self.acquired_at)
    }

    pub fn events(&self) -> impl Iterator<Item = StageEvent> + '_ {
        self.stages.iter().map(|(stage, date)| StageEvent {
            lead_id: self.lead_id.clone(),
            stage: *stage,
            timestamp: *date,
            channel: Some(self.channel),
        })
    }
}

/// Immutable fact: a lead reached a stage on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageEvent {
    pub lead_id: String,
    pub stage: Stage,
    pub timestamp: NaiveDate,
    #[serde(default)]
    pub channel: Option<Channel>,
}

/// One marketing touch in a lead's journey.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributionTouch {
    pub channel: Channel,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub converted: bool,
}

/// Ordered touches for a single lead.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeadJourney {
    pub lead_id: String,
    pub touches: Vec<AttributionTouch>,
}

impl LeadJourney {
    pub fn is_converted(&self) -> bool {
        self.touches.iter().any(|t| t.converted)
    }
}

/// Media spend booked against a channel for the reporting period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelSpend {
    pub channel: Channel,
    pub amount: f64,
}
