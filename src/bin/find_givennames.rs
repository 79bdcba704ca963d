use anyhow::{Context, Result};
use clap::Parser;
use wikifaces::{init_tracing, install_stop_handler, run_enrichment, EnrichmentCli, QueryClient};

fn main() -> Result<()> {
    init_tracing();
    let cli = EnrichmentCli::parse();
    let config = cli.build_config()?;
    let stop_requested = install_stop_handler().context("failed to install Ctrl-C handler")?;
    let client = QueryClient::http(config.client().clone())
        .context("failed to build SPARQL HTTP client")?;

    let summary = run_enrichment(&config, &client, &stop_requested)?;
    println!(
        "given names: {} accepted, {} below threshold, {} failed, {} invalid",
        summary.accepted, summary.below_threshold, summary.failed, summary.invalid
    );
    println!(
        "records: {} returned, {} saved to {:?}{}",
        summary.returned,
        summary.records,
        config.output_path(),
        if summary.interrupted { " (interrupted)" } else { "" }
    );
    Ok(())
}
