use clap::ArgMatches;
use tiergate_runtime::routing::load_classifier;
use tiergate_runtime::{ExecutorSet, GenerationService, ResponseCache, RoutingEngine};

use super::{load_config, request_from_args};

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(matches)?;
    let request = request_from_args(matches)?;

    // Routing only: no cache and no real executors are needed
    let service = GenerationService::new(
        RoutingEngine::new(config.router.clone()),
        load_classifier(config.service.classifier.model_path.as_deref()),
        ResponseCache::disabled(),
        ExecutorSet::stubs(),
    );

    let outcome = service.route(&request)?;
    tracing::info!(
        "Routed to {} by {} stage{}",
        outcome.tier,
        outcome.stage.as_str(),
        if outcome.was_escalated() {
            format!(" (escalated from {})", outcome.proposed_tier)
        } else {
            String::new()
        }
    );
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
