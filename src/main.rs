use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;
use tracing::{debug, info};
use watch_harness::config::{Cli, Commands, OutputFormat, Scenario};
use watch_harness::junit::JunitReporter;
use watch_harness::reporter::{HumanReporter, JsonReporter, MultiReporter, Reporter};
use watch_harness::{runner, signals};

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| level.to_string());
    // stderr only: stdout belongs to the JSON reporter
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(env_filter))
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn build_reporter(cli: &Cli) -> Box<dyn Reporter> {
    let base: Box<dyn Reporter> = match cli.format {
        OutputFormat::Human => Box::new(HumanReporter),
        OutputFormat::Json => Box::new(JsonReporter),
    };
    match &cli.junit_xml {
        Some(path) => Box::new(MultiReporter::new(vec![
            base,
            Box::new(JunitReporter::new(path.clone())),
        ])),
        None => base,
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    debug!("watch-harness v{}", env!("CARGO_PKG_VERSION"));

    signals::install_signal_handlers().context("Failed to install signal handlers")?;

    let scenario = Scenario::load(&cli.scenario)?;

    match cli.command.clone().unwrap_or(Commands::Run) {
        Commands::List => {
            for variant in scenario.variants() {
                println!("{}", runner::variant_id(&scenario, &variant));
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run => {
            if scenario.skipped_here() {
                info!("{} is skipped on {}", scenario.name, std::env::consts::OS);
            }
            let mut reporter = build_reporter(&cli);
            let summary =
                runner::run_scenario(&scenario, cli.variant.as_deref(), reporter.as_mut()).await?;
            Ok(if summary.success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}
