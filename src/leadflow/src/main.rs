//! leadflow: cohort and conversion analytics over a lead dataset.
//!
//! Loads configuration, reads already-exported records from JSON, runs the
//! analytics engine and prints the result as JSON on stdout.

use anyhow::Context;
use clap::{Parser, Subcommand};
use leadflow_core::config::AppConfig;
use leadflow_core::error::LeadflowResult;
use leadflow_core::filter::{self, AnalyticsFilters};
use leadflow_core::types::{AttributionModel, Channel, CohortKey, Device, SignificanceMethod, Stage};
use leadflow_reporting::source::{Dataset, InMemorySource};
use leadflow_reporting::{compute_from, ABTestEngine, ABTestVariant};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "leadflow")]
#[command(about = "Cohort, retention, attribution and A/B analytics for lead funnels")]
#[command(version)]
struct Cli {
    /// Optional TOML config file (environment `LEADFLOW__*` still applies)
    #[arg(long, env = "LEADFLOW_CONFIG")]
    config: Option<String>,

    /// Emit logs as JSON (overrides config)
    #[arg(long, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Cohort matrix, curves, attribution and KPIs for an acquisition range
    Cohorts {
        /// JSON file with `leads`, `journeys` and `spend`
        #[arg(long)]
        dataset: PathBuf,

        /// First acquisition month (YYYY-MM)
        #[arg(long)]
        from: CohortKey,

        /// Last acquisition month (YYYY-MM)
        #[arg(long)]
        to: CohortKey,

        /// Last month with data; later relative months read as "no data"
        #[arg(long)]
        as_of: Option<CohortKey>,

        /// Restrict to these channels (comma-separated)
        #[arg(long = "channel", value_delimiter = ',')]
        channels: Vec<Channel>,

        /// Restrict to these devices (comma-separated)
        #[arg(long = "device", value_delimiter = ',')]
        devices: Vec<Device>,

        /// Window in months (overrides config)
        #[arg(long)]
        window: Option<u32>,

        /// Stage counted as a conversion (overrides config)
        #[arg(long)]
        target_stage: Option<Stage>,

        /// Attribution model: last, first, linear, ushaped (overrides config)
        #[arg(long)]
        model: Option<AttributionModel>,
    },

    /// Compare two variants' conversion
    AbTest {
        /// JSON file with `a` and `b` variants
        #[arg(long)]
        variants: PathBuf,

        /// Use the exact normal-distribution significance
        #[arg(long, default_value_t = false)]
        exact: bool,
    },
}

#[derive(Deserialize)]
struct VariantPair {
    a: ABTestVariant,
    b: ABTestVariant,
}

fn read_json<T: DeserializeOwned>(path: &Path) -> LeadflowResult<T> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = AppConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {e}");
        AppConfig::default()
    });
    if cli.json_logs {
        config.log.json = true;
    }

    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log.filter.clone().into());
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    if config.log.json {
        builder.json().init();
    } else {
        builder.init();
    }

    match cli.command {
        Command::Cohorts {
            dataset,
            from,
            to,
            as_of,
            channels,
            devices,
            window,
            target_stage,
            model,
        } => {
            let mut analytics = config.analytics.clone();
            if let Some(window) = window {
                analytics.window_months = window;
            }
            if let Some(stage) = target_stage {
                analytics.target_stage = stage;
            }
            if let Some(model) = model {
                analytics.attribution_model = model;
            }

            let mut filters = AnalyticsFilters::new(from, to)
                .with_channels(channels)
                .with_devices(devices);
            filters.as_of = as_of;
            filter::validate(&filters, &analytics)?;

            let records: Dataset = read_json(&dataset)
                .with_context(|| format!("loading dataset {}", dataset.display()))?;
            let source = InMemorySource::from_dataset(records);

            info!(
                from = %filters.from,
                to = %filters.to,
                window = analytics.window_months,
                target = %analytics.target_stage,
                "Running cohort analytics"
            );

            let result = compute_from(&analytics, &filters, &source);
            if result.skipped.total() > 0 {
                warn!(skipped = result.skipped.total(), "Some records were skipped");
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::AbTest { variants, exact } => {
            let pair: VariantPair = read_json(&variants)
                .with_context(|| format!("loading variants {}", variants.display()))?;
            for variant in [&pair.a, &pair.b] {
                if variant.impressions == 0 {
                    warn!(variant = %variant.name, "Variant has no impressions; rates read as 0");
                }
            }

            let method = if exact {
                SignificanceMethod::Exact
            } else {
                config.analytics.significance
            };
            let engine = ABTestEngine::new(method, config.analytics.significance_threshold);
            let result = engine.evaluate(&pair.a, &pair.b);
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
    }

    Ok(())
}
