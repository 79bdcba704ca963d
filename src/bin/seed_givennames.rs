use anyhow::{Context, Result};
use clap::Parser;
use wikifaces::{
    init_tracing, install_stop_handler, run_discovery, DiscoveryCli, QueryClient, WriteOutcome,
};

fn main() -> Result<()> {
    init_tracing();
    let cli = DiscoveryCli::parse();
    let config = cli.build_config()?;
    let stop_requested = install_stop_handler().context("failed to install Ctrl-C handler")?;
    let client = QueryClient::http(config.client().clone())
        .context("failed to build SPARQL HTTP client")?;

    let summary = run_discovery(&config, &client, &stop_requested)
        .context("seed given-name discovery failed")?;
    match summary.outcome {
        WriteOutcome::Written(rows) => {
            println!("wrote {rows} given names to {:?}", config.output_path())
        }
        WriteOutcome::Skipped => println!("no given names returned; nothing written"),
    }
    Ok(())
}
