//! water-scan - main entry point
//!
//! Runs the potability pipeline once with the default configuration.

use clap::Parser;
use water_scan::cli::{print_banner, print_summary, Cli};
use water_scan::config::PipelineConfig;
use water_scan::pipeline::{connect, run_pipeline};

fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "water_scan=info".into()),
        )
        .init();

    let _cli = Cli::parse();
    print_banner();

    let config = PipelineConfig::from_env();
    let (tracking, registry) = connect(&config)?;
    let report = run_pipeline(&config, tracking, &registry)?;

    print_summary(&report);
    Ok(())
}
