use clap::ArgMatches;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tiergate_runtime::metrics::{create_exporter, flush, spawn_export_loop};
use tiergate_runtime::{Constraints, GenerateRequest, GenerateResponse, GenerationService, Tier};

use super::load_config;

#[derive(Debug, Clone, Copy)]
enum Workload {
    ShortClassification,
    ShortGeneration,
    LongGeneration,
    LargeContextSummary,
}

/// Traffic mix as cumulative weights
const WORKLOADS: [(Workload, f64); 4] = [
    (Workload::ShortClassification, 0.30),
    (Workload::ShortGeneration, 0.30),
    (Workload::LongGeneration, 0.25),
    (Workload::LargeContextSummary, 0.15),
];

const TRANSCRIPT_LINE: &str = "This is a long meeting transcript discussing product strategy, \
engineering constraints, UX tradeoffs, and business priorities.\n";

impl Workload {
    fn choose(rng: &mut StdRng) -> Self {
        let r: f64 = rng.gen();
        let mut cumulative = 0.0;
        for (workload, weight) in WORKLOADS {
            cumulative += weight;
            if r <= cumulative {
                return workload;
            }
        }
        Workload::LargeContextSummary
    }

    fn request(self, rng: &mut StdRng) -> GenerateRequest {
        let request = match self {
            Workload::ShortClassification => GenerateRequest::new(format!(
                "Classify sentiment: I am feeling great today! id={}",
                rng.gen_range(1..=100_000)
            )),
            Workload::ShortGeneration => GenerateRequest::new(format!(
                "Explain neural networks simply. v={}",
                rng.gen_range(1..=50_000)
            )),
            Workload::LongGeneration => GenerateRequest::new(format!(
                "Explain neural networks step by step with examples and analogies. run={}",
                rng.gen_range(1..=100_000)
            )),
            Workload::LargeContextSummary => {
                let repeats = rng.gen_range(20..=40);
                GenerateRequest::new("Summarize the discussion")
                    .with_context(vec![TRANSCRIPT_LINE.repeat(repeats)])
            }
        };
        request.with_constraints(Constraints::default())
    }
}

#[derive(Debug, Default)]
struct SimulationReport {
    total: usize,
    failures: usize,
    tiers: BTreeMap<Tier, usize>,
    cache_hits: usize,
    routed_cost: f64,
    api_only_cost: f64,
    total_latency: Duration,
    max_latency: Duration,
}

impl SimulationReport {
    fn record(&mut self, response: &GenerateResponse, api_cost_per_token: f64) {
        *self.tiers.entry(response.model_used).or_insert(0) += 1;
        // A hit reports the stored cost but spends nothing
        if response.cache_hit {
            self.cache_hits += 1;
        } else {
            self.routed_cost += response.estimated_cost_usd;
        }
        // Shadow estimate: the same tokens priced at the api tier
        self.api_only_cost +=
            (response.tokens_used.input + response.tokens_used.output) as f64 * api_cost_per_token;
    }

    fn print(&self) {
        let pct = |count: usize| count as f64 * 100.0 / self.total.max(1) as f64;

        println!("\n=== Traffic Simulation Results ===");
        println!("Total requests: {}", self.total);
        if self.failures > 0 {
            println!("Failed requests: {}", self.failures);
        }

        println!("\nRouting distribution:");
        for (tier, count) in &self.tiers {
            println!("  {:>6}: {} ({:.1}%)", tier.as_str(), count, pct(*count));
        }

        println!("\nCache:");
        println!("  Hits:   {} ({:.1}%)", self.cache_hits, pct(self.cache_hits));
        println!("  Misses: {}", self.total - self.failures - self.cache_hits);

        println!("\nCost:");
        println!("  Routed total cost: ${:.4}", self.routed_cost);
        println!("  API-only estimate: ${:.4}", self.api_only_cost);
        if self.api_only_cost > 0.0 {
            println!(
                "  Cost saved: {:.1}%",
                (1.0 - self.routed_cost / self.api_only_cost) * 100.0
            );
        }

        println!("\nLatency:");
        let avg = self.total_latency.as_secs_f64() / self.total.max(1) as f64;
        println!("  Avg latency: {:.3}s", avg);
        println!("  Max latency: {:.3}s", self.max_latency.as_secs_f64());
    }
}

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(matches)?;
    let total = matches.get_one::<usize>("requests").copied().unwrap_or(100);
    let mut rng = match matches.get_one::<u64>("seed") {
        Some(seed) => StdRng::seed_from_u64(*seed),
        None => StdRng::from_entropy(),
    };

    let service = GenerationService::from_config(&config).await?;
    let api_cost_per_token = config.router.models.get(Tier::Api).cost_per_token;
    let exporter = create_exporter(&config.service.metrics)?;
    let export_task = exporter.clone().map(|exporter| {
        spawn_export_loop(
            service.metrics().clone(),
            exporter,
            config.service.metrics.export_interval,
        )
    });

    tracing::info!("Simulating {} requests", total);
    let mut report = SimulationReport {
        total,
        ..Default::default()
    };

    for _ in 0..total {
        let request = Workload::choose(&mut rng).request(&mut rng);
        let start = Instant::now();
        let result = service.generate(request).await;
        let latency = start.elapsed();

        report.total_latency += latency;
        report.max_latency = report.max_latency.max(latency);

        match result {
            Ok(response) => report.record(&response, api_cost_per_token),
            Err(e) => {
                tracing::warn!("Simulated request failed: {}", e);
                report.failures += 1;
            }
        }
    }

    if let Some(task) = export_task {
        task.abort();
    }
    if let Some(exporter) = exporter {
        flush(service.metrics(), exporter.as_ref()).await;
    }

    report.print();
    Ok(())
}
