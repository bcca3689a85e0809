pub mod check_config;
pub mod generate;
pub mod route;
pub mod simulate;

use anyhow::Context;
use clap::ArgMatches;
use std::path::PathBuf;
use tiergate_runtime::{AppConfig, Constraints, GenerateRequest, RiskLevel};

/// Load the configuration directory named by `--config-dir`
pub fn load_config(matches: &ArgMatches) -> anyhow::Result<AppConfig> {
    let dir = matches
        .get_one::<String>("config-dir")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config"));
    AppConfig::load_dir(&dir)
        .with_context(|| format!("failed to load configuration from {}", dir.display()))
}

/// Build a request from the prompt, context and constraint arguments
pub fn request_from_args(matches: &ArgMatches) -> anyhow::Result<GenerateRequest> {
    let prompt = matches
        .get_one::<String>("prompt")
        .context("a prompt is required")?;

    let mut context: Vec<String> = matches
        .get_many::<String>("context")
        .map(|values| values.cloned().collect())
        .unwrap_or_default();
    if let Some(files) = matches.get_many::<String>("context-file") {
        for file in files {
            let text = std::fs::read_to_string(file)
                .with_context(|| format!("failed to read context file {}", file))?;
            context.push(text);
        }
    }

    let risk_level: RiskLevel = matches
        .get_one::<String>("risk-level")
        .map(|s| s.parse::<RiskLevel>())
        .transpose()
        .map_err(anyhow::Error::msg)?
        .unwrap_or_default();

    let mut constraints = Constraints::default().with_risk_level(risk_level);
    if let Some(ms) = matches.get_one::<u64>("max-latency-ms") {
        constraints = constraints.with_max_latency_ms(*ms);
    }
    if let Some(usd) = matches.get_one::<f64>("max-cost-usd") {
        constraints = constraints.with_max_cost_usd(*usd);
    }

    Ok(GenerateRequest::new(prompt.as_str())
        .with_context(context)
        .with_constraints(constraints))
}
