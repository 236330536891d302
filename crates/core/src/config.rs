use crate::error::{LeadflowError, LeadflowResult};
use crate::types::{AttributionModel, GroupBy, SignificanceMethod, Stage};
use serde::Deserialize;
use tracing::debug;

/// Root application configuration. Loaded from an optional TOML file and
/// environment variables with the prefix `LEADFLOW__`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analytics: AnalyticsConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// Every option the analytics engine recognizes.
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyticsConfig {
    /// Months after acquisition covered by the cohort matrix.
    #[serde(default = "default_window_months")]
    pub window_months: u32,
    /// Stage that counts as a conversion ("contract").
    #[serde(default = "default_target_stage")]
    pub target_stage: Stage,
    /// Stages tracked in the cohort matrix.
    #[serde(default = "default_stages")]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub group_by: GroupBy,
    #[serde(default)]
    pub attribution_model: AttributionModel,
    #[serde(default)]
    pub significance: SignificanceMethod,
    /// Minimum significance (percent) before an A/B winner is declared.
    #[serde(default = "default_significance_threshold")]
    pub significance_threshold: f64,
    /// Also compute the KPI snapshot of the preceding period.
    #[serde(default = "default_compare_previous")]
    pub compare_previous: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

// Default functions
fn default_window_months() -> u32 {
    6
}
fn default_target_stage() -> Stage {
    Stage::Contrato
}
fn default_stages() -> Vec<Stage> {
    Stage::ALL.to_vec()
}
fn default_significance_threshold() -> f64 {
    95.0
}
fn default_compare_previous() -> bool {
    true
}
fn default_log_filter() -> String {
    "leadflow=info,leadflow_reporting=info".to_string()
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            window_months: default_window_months(),
            target_stage: default_target_stage(),
            stages: default_stages(),
            group_by: GroupBy::default(),
            attribution_model: AttributionModel::default(),
            significance: SignificanceMethod::default(),
            significance_threshold: default_significance_threshold(),
            compare_previous: default_compare_previous(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from `path` (if given and present) layered under
    /// `LEADFLOW__*` environment variables.
    pub fn load(path: Option<&str>) -> LeadflowResult<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        let builder = builder.add_source(
            config::Environment::with_prefix("LEADFLOW")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("analytics.stages"),
        );

        let config: AppConfig = builder
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| LeadflowError::Config(e.to_string()))?;
        debug!(
            window_months = config.analytics.window_months,
            target_stage = %config.analytics.target_stage,
            "Configuration loaded"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalyticsConfig::default();
        assert_eq!(config.window_months, 6);
        assert_eq!(config.target_stage, Stage::Contrato);
        assert_eq!(config.stages.len(), Stage::ALL.len());
        assert_eq!(config.attribution_model, AttributionModel::Last);
        assert_eq!(config.significance, SignificanceMethod::Heuristic);
        assert!((config.significance_threshold - 95.0).abs() < f64::EPSILON);
        assert!(config.compare_previous);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let json = r#"{ "analytics": { "window_months": 12, "attribution_model": "ushaped" } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.analytics.window_months, 12);
        assert_eq!(config.analytics.attribution_model, AttributionModel::Ushaped);
        assert_eq!(config.analytics.target_stage, Stage::Contrato);
        assert!(!config.log.json);
    }

    #[test]
    fn test_load_layers_env_over_file() {
        let path = std::env::temp_dir().join(format!("leadflow-config-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[analytics]\nwindow_months = 9\nattribution_model = \"linear\"\n\n[log]\njson = true\n",
        )
        .unwrap();
        std::env::set_var("LEADFLOW__ANALYTICS__WINDOW_MONTHS", "12");
        std::env::set_var("LEADFLOW__ANALYTICS__STAGES", "LEAD,VISITA,CONTRATO");

        let loaded = AppConfig::load(path.to_str());
        std::env::remove_var("LEADFLOW__ANALYTICS__WINDOW_MONTHS");
        std::env::remove_var("LEADFLOW__ANALYTICS__STAGES");
        std::fs::remove_file(&path).unwrap();

        let config = loaded.unwrap();
        assert_eq!(config.analytics.window_months, 12);
        assert_eq!(config.analytics.attribution_model, AttributionModel::Linear);
        assert_eq!(
            config.analytics.stages,
            vec![Stage::Lead, Stage::Visita, Stage::Contrato]
        );
        assert!(config.log.json);
    }

    #[test]
    fn test_load_reports_bad_values_as_config_error() {
        let path = std::env::temp_dir().join(format!("leadflow-bad-{}.toml", std::process::id()));
        std::fs::write(&path, "[analytics]\ntarget_stage = \"MUDANZA\"\n").unwrap();
        let loaded = AppConfig::load(path.to_str());
        std::fs::remove_file(&path).unwrap();
        assert!(matches!(loaded, Err(LeadflowError::Config(_))));
    }
}
