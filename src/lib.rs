#![warn(missing_docs)]
//! Harvests Wikidata people who share a given name and have both a portrait
//! and an English Wikipedia article.

pub mod aggregate;
pub mod client;
pub mod controls;
pub mod extract;
pub mod pipeline;
pub mod sparql;
pub mod table;
pub mod template;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing_subscriber::EnvFilter;

pub use aggregate::{AcceptanceGate, ResultSet};
pub use client::{
    ClientSettings, HttpTransport, Pause, QueryClient, QueryError, RateLimitPolicy, RetryPolicy,
    ThreadPause, Transport, TransportError, TransportResponse,
};
pub use controls::{
    DiscoveryCli, DiscoveryConfig, DiscoveryParams, EnrichmentCli, EnrichmentConfig,
};
pub use extract::{Record, SeedName};
pub use pipeline::{run_discovery, run_enrichment, DiscoverySummary, EnrichmentSummary, RunError};
pub use sparql::{BindingRow, SparqlResults};
pub use table::{TableError, WriteOutcome};
pub use template::{ParamValue, Query, QueryBinding, QueryTemplate, TemplateError};

const DEFAULT_LOG_FILTER: &str = "wikifaces=info";

/// Installs the fmt subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Shared flag flipped by Ctrl-C; runs poll it between units of work.
pub fn install_stop_handler() -> Result<Arc<AtomicBool>, ctrlc::Error> {
    let stop_requested = Arc::new(AtomicBool::new(false));
    let handle = Arc::clone(&stop_requested);
    ctrlc::set_handler(move || {
        if handle.swap(true, Ordering::AcqRel) {
            // second Ctrl-C: the user wants out now
            std::process::exit(130);
        }
        eprintln!("\ninterrupt received; finishing the current query");
    })?;
    Ok(stop_requested)
}
