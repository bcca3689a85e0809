use clap::ArgMatches;
use tiergate_runtime::metrics::{create_exporter, flush};
use tiergate_runtime::GenerationService;

use super::{load_config, request_from_args};

pub async fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let config = load_config(matches)?;
    let request = request_from_args(matches)?.with_debug(matches.get_flag("debug"));

    let service = GenerationService::from_config(&config).await?;
    let exporter = create_exporter(&config.service.metrics)?;

    let result = service.generate(request).await;

    if let Some(exporter) = exporter {
        flush(service.metrics(), exporter.as_ref()).await;
    }

    let response = result?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}
