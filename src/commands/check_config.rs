use clap::ArgMatches;
use tiergate_runtime::config::{CacheBackendKind, ExecutorConfig};
use tiergate_runtime::routing::load_classifier;
use tiergate_runtime::{ExecutorSet, Tier};

use super::load_config;

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    println!("🔍 Checking configuration...\n");

    let config = load_config(matches)?;
    println!("✓ Configuration loaded from {}", config.config_dir.display());

    println!("\n📦 Models:");
    for tier in Tier::ALL {
        let model = config.router.models.get(tier);
        println!(
            "  • {:<6} {} (context {} tokens, ${}/token)",
            tier.as_str(),
            model.model_name,
            model.max_context_tokens,
            model.cost_per_token
        );
    }

    let thresholds = config.router.thresholds();
    println!("\n🔀 Routing:");
    println!(
        "  • thresholds: small_max_tokens={} medium_context_tokens={} classifier_confidence_min={}",
        thresholds.small_max_tokens,
        thresholds.medium_context_tokens,
        thresholds.classifier_confidence_min
    );
    if config.router.rules().is_empty() {
        println!("  • no static rules");
    }
    for rule in config.router.rules() {
        println!("  • rule {} → {}", rule.name, rule.route_to);
    }

    let classifier = load_classifier(config.service.classifier.model_path.as_deref());
    println!("\n🧠 Classifier: {}", classifier.name());

    println!("\n💾 Cache:");
    match config.service.cache.backend {
        CacheBackendKind::Memory => println!(
            "  • memory (max {} entries)",
            config.service.cache.max_entries
        ),
        CacheBackendKind::Redis => println!(
            "  • redis ({})",
            if config.service.cache.redis_url.is_some() {
                "url configured"
            } else {
                "url missing"
            }
        ),
        CacheBackendKind::Disabled => println!("  • disabled"),
    }

    println!("\n⚙️  Executors:");
    for tier in Tier::ALL {
        let kind = match config.service.executors.get(tier) {
            ExecutorConfig::Stub { .. } => "stub",
            ExecutorConfig::LocalProcess { .. } => "local_process",
            ExecutorConfig::RemoteApi { .. } => "remote_api",
        };
        println!("  • {:<6} {}", tier.as_str(), kind);
    }
    let executors = ExecutorSet::from_config(&config.service.executors, &config.router.models);
    let unconfigured: Vec<&str> = Tier::ALL
        .into_iter()
        .filter(|tier| {
            executors
                .get(*tier)
                .map(|executor| executor.name() == "unconfigured")
                .unwrap_or(true)
        })
        .map(|tier| tier.as_str())
        .collect();
    if unconfigured.is_empty() {
        println!("✓ Executors constructed");
    } else {
        println!("⚠ Executors unavailable for: {}", unconfigured.join(", "));
    }

    match &config.service.metrics.file {
        Some(path) => println!("\n📊 Metrics: {}", path.display()),
        None => println!("\n📊 Metrics: export disabled"),
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}
