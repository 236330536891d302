pub mod config;
pub mod error;
pub mod filter;
pub mod types;

pub use config::{AnalyticsConfig, AppConfig};
pub use error::{DataError, LeadflowError, LeadflowResult};
pub use filter::AnalyticsFilters;
pub use types::{CohortKey, Lead, Stage, StageEvent};
