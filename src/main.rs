#![allow(clippy::multiple_crate_versions)]

use clap::{Arg, ArgAction, Command};

mod commands;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn config_dir_arg() -> Arg {
    Arg::new("config-dir")
        .short('c')
        .long("config-dir")
        .value_name("DIR")
        .env("TIERGATE_CONFIG_DIR")
        .help("Directory holding models.yaml, routing.yaml and service.yaml")
        .default_value("config")
        .global(true)
}

/// Arguments shared by the commands that take a single request
fn request_args(cmd: Command) -> Command {
    cmd.arg(
        Arg::new("prompt")
            .value_name("PROMPT")
            .help("Prompt text")
            .required(true),
    )
    .arg(
        Arg::new("context")
            .long("context")
            .value_name("TEXT")
            .help("Context entry (repeatable)")
            .action(ArgAction::Append),
    )
    .arg(
        Arg::new("context-file")
            .long("context-file")
            .value_name("FILE")
            .help("Read a context entry from a file (repeatable)")
            .action(ArgAction::Append),
    )
    .arg(
        Arg::new("risk-level")
            .long("risk-level")
            .value_name("LEVEL")
            .help("Risk level of the request")
            .value_parser(["low", "medium", "high"])
            .default_value("low"),
    )
    .arg(
        Arg::new("max-latency-ms")
            .long("max-latency-ms")
            .value_name("MS")
            .help("Latency budget in milliseconds")
            .value_parser(clap::value_parser!(u64))
            .default_value("2000"),
    )
    .arg(
        Arg::new("max-cost-usd")
            .long("max-cost-usd")
            .value_name("USD")
            .help("Cost budget in US dollars")
            .value_parser(clap::value_parser!(f64))
            .default_value("0.01"),
    )
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Logs go to stderr so command output stays machine readable
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let matches = Command::new("tiergate")
        .version(VERSION)
        .about("tiergate - tiered LLM routing with a response cache")
        .arg(config_dir_arg())
        .subcommand(request_args(
            Command::new("route").about("Decide a tier for a prompt and print the routing outcome"),
        ))
        .subcommand(
            request_args(
                Command::new("generate").about("Route, run inference and print the response"),
            )
            .arg(
                Arg::new("debug")
                    .long("debug")
                    .help("Include the routing explanation in the response")
                    .action(ArgAction::SetTrue),
            ),
        )
        .subcommand(
            Command::new("check-config").about("Load and validate the configuration directory"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Replay synthetic traffic through the generation pipeline")
                .arg(
                    Arg::new("requests")
                        .short('n')
                        .long("requests")
                        .value_name("COUNT")
                        .help("Number of requests to send")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("100"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_name("SEED")
                        .help("Seed for the workload generator")
                        .value_parser(clap::value_parser!(u64)),
                ),
        )
        .get_matches();

    let result = match matches.subcommand() {
        Some(("route", sub_matches)) => commands::route::run(sub_matches).await,
        Some(("generate", sub_matches)) => commands::generate::run(sub_matches).await,
        Some(("check-config", sub_matches)) => commands::check_config::run(sub_matches).await,
        Some(("simulate", sub_matches)) => commands::simulate::run(sub_matches).await,
        _ => {
            println!("tiergate v{}", VERSION);
            println!("Use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("✗ {:#}", e);
        std::process::exit(1);
    }
}
