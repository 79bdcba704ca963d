//! Sequential orchestration of the discovery and enrichment runs.
//!
//! Identifiers are processed strictly one after another, each query (with
//! its retries) finishing before the courtesy delay and the next identifier.
//! Output is written once, after the loop.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tracing::{error, info, info_span, warn};

use crate::aggregate::{AcceptanceGate, ResultSet};
use crate::client::{Pause, QueryClient, QueryError, Transport};
use crate::controls::{DiscoveryConfig, EnrichmentConfig};
use crate::extract::{bare_qid, extract_records, extract_seed_names, SeedName};
use crate::table::{write_rows, Table, TableError, WriteOutcome};
use crate::template::{QueryBinding, QueryTemplate, TemplateError};

/// Input column holding the given-name label.
pub const LABEL_COLUMN: &str = "givennameLabel";
/// Input column holding the given-name identifier.
pub const QID_COLUMN: &str = "qid";

/// Errors that end a run.
#[derive(Debug, Error)]
pub enum RunError {
    /// Template could not be loaded or bound.
    #[error(transparent)]
    Template(#[from] TemplateError),
    /// Input could not be read or output could not be written.
    #[error(transparent)]
    Table(#[from] TableError),
    /// The discovery query failed for good.
    #[error(transparent)]
    Query(#[from] QueryError),
    /// Stop was requested before discovery results were written.
    #[error("interrupted before results were written")]
    Interrupted,
}

/// Counters describing an enrichment run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrichmentSummary {
    /// Identifiers whose query completed and passed the threshold.
    pub accepted: usize,
    /// Identifiers whose query completed below the threshold.
    pub below_threshold: usize,
    /// Identifiers whose query or binding failed.
    pub failed: usize,
    /// Input rows without a usable identifier.
    pub invalid: usize,
    /// Rows the service returned across all completed queries.
    pub returned: usize,
    /// Records written.
    pub records: usize,
    /// True when a stop request cut the loop short.
    pub interrupted: bool,
    /// What happened to the output file.
    pub outcome: WriteOutcome,
}

/// Counters describing a discovery run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoverySummary {
    /// Given names returned by the service.
    pub rows: usize,
    /// What happened to the output file.
    pub outcome: WriteOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KeyOutcome {
    Accepted(usize),
    BelowThreshold(usize),
    Failed,
    Invalid,
}

/// Reads the seed file, keeping rows in file order.
pub fn read_seed_names(path: &Path) -> Result<Vec<SeedName>, TableError> {
    let table = Table::read(path)?;
    let label_idx = table.column(LABEL_COLUMN)?;
    let qid_idx = table.column(QID_COLUMN)?;
    Ok(table
        .rows()
        .iter()
        .map(|row| SeedName {
            label: row.get(label_idx).cloned().unwrap_or_default(),
            qid: row.get(qid_idx).cloned().unwrap_or_default(),
        })
        .collect())
}

/// Runs the per-key enrichment pipeline end to end.
///
/// A failed query only costs its own identifier. On a stop request the loop
/// ends early and whatever was already accepted is still written.
pub fn run_enrichment<T: Transport, P: Pause>(
    config: &EnrichmentConfig,
    client: &QueryClient<T, P>,
    stop_requested: &AtomicBool,
) -> Result<EnrichmentSummary, RunError> {
    info!(path = ?config.template_path(), "loading SPARQL query template");
    let template = QueryTemplate::load(config.template_path())?;
    info!(path = ?config.input_path(), "reading seed given names");
    let seeds = read_seed_names(config.input_path())?;
    info!(count = seeds.len(), "seed given names loaded");

    let gate = AcceptanceGate::new(config.min_results());
    let mut results = ResultSet::new();
    let mut summary = EnrichmentSummary {
        accepted: 0,
        below_threshold: 0,
        failed: 0,
        invalid: 0,
        returned: 0,
        records: 0,
        interrupted: false,
        outcome: WriteOutcome::Skipped,
    };

    for (index, seed) in seeds.iter().enumerate() {
        if index > 0 {
            client.pause(config.courtesy_delay());
        }
        if stop_requested.load(Ordering::Acquire) {
            warn!(remaining = seeds.len() - index, "stop requested; ending run early");
            summary.interrupted = true;
            break;
        }

        let _span = info_span!("given_name", label = %seed.label, qid = %seed.qid).entered();
        match enrich_one(&template, seed, config.result_limit(), &gate, client, &mut results) {
            KeyOutcome::Accepted(rows) => {
                summary.accepted += 1;
                summary.returned += rows;
            }
            KeyOutcome::BelowThreshold(rows) => {
                summary.below_threshold += 1;
                summary.returned += rows;
            }
            KeyOutcome::Failed => summary.failed += 1,
            KeyOutcome::Invalid => summary.invalid += 1,
        }
    }

    summary.records = results.len();
    summary.outcome = write_rows(config.output_path(), results.records())?;
    match summary.outcome {
        WriteOutcome::Written(rows) => {
            info!(rows, path = ?config.output_path(), "saved accepted records")
        }
        WriteOutcome::Skipped => warn!("no results to save; output file not written"),
    }
    Ok(summary)
}

fn enrich_one<T: Transport, P: Pause>(
    template: &QueryTemplate,
    seed: &SeedName,
    limit: u32,
    gate: &AcceptanceGate,
    client: &QueryClient<T, P>,
    results: &mut ResultSet,
) -> KeyOutcome {
    let Some(qid) = bare_qid(&seed.qid) else {
        warn!("input row has no usable identifier; skipping");
        return KeyOutcome::Invalid;
    };
    info!("querying given name");

    let binding = QueryBinding::new().with("qid", qid).with("limit", limit);
    let query = match template.bind(&binding) {
        Ok(query) => query,
        Err(err) => {
            error!(error = %err, "could not build query");
            return KeyOutcome::Failed;
        }
    };
    let response = match client.execute(&query) {
        Ok(response) => response,
        Err(err) if err.is_transient() => {
            warn!(error = %err, "query kept timing out; skipping given name");
            return KeyOutcome::Failed;
        }
        Err(err) => {
            error!(error = %err, "query failed; skipping given name");
            return KeyOutcome::Failed;
        }
    };

    let records = extract_records(qid, &response);
    let rows = records.len();
    if results.offer(gate, records) {
        info!(rows, "results added");
        KeyOutcome::Accepted(rows)
    } else {
        info!(rows, min = gate.min_results(), "skipped, too few results");
        KeyOutcome::BelowThreshold(rows)
    }
}

/// Runs the single-shot seed discovery pipeline.
///
/// Any unrecovered query failure, including a rate-limit answer, fails the
/// run. A stop request observed after the query returns discards the result.
pub fn run_discovery<T: Transport, P: Pause>(
    config: &DiscoveryConfig,
    client: &QueryClient<T, P>,
    stop_requested: &AtomicBool,
) -> Result<DiscoverySummary, RunError> {
    info!(path = ?config.template_path(), "loading SPARQL query template");
    let template = QueryTemplate::load(config.template_path())?;
    let params = config.params();
    let query = template.bind(
        &QueryBinding::new()
            .with("sample_size", params.sample_size)
            .with("limit_results", params.limit_results)
            .with("min_count", params.min_count)
            .with("language", params.language.as_str()),
    )?;

    info!("sending discovery query");
    let response = client.execute(&query).inspect_err(|err| {
        error!(error = %err, "discovery query failed");
    })?;
    if stop_requested.load(Ordering::Acquire) {
        warn!("stop requested; discarding discovery results");
        return Err(RunError::Interrupted);
    }

    let seeds = extract_seed_names(&response);
    info!(rows = seeds.len(), path = ?config.output_path(), "writing seed given names");
    let outcome = write_rows(config.output_path(), &seeds)?;
    if outcome == WriteOutcome::Skipped {
        warn!("discovery returned no rows; output file not written");
    }
    Ok(DiscoverySummary {
        rows: seeds.len(),
        outcome,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use crate::client::{RateLimitPolicy, RetryPolicy};

    #[test]
    fn seed_file_columns_are_found_by_name() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("seeds.csv");
        std::fs::write(&path, "count;qid;givennameLabel\n12;Q1;Anna\n3;Q2;Ben\n").expect("write");
        let seeds = read_seed_names(&path).expect("read");
        assert_eq!(
            seeds,
            vec![
                SeedName {
                    label: "Anna".into(),
                    qid: "Q1".into()
                },
                SeedName {
                    label: "Ben".into(),
                    qid: "Q2".into()
                },
            ]
        );
    }

    #[test]
    fn invalid_identifiers_are_skipped_without_a_request() {
        let template = QueryTemplate::parse("wd:{qid} LIMIT {limit}").expect("template");
        let transport = ScriptedTransport::default();
        let pause = RecordingPause::default();
        let client = QueryClient::new(
            &transport,
            settings(RetryPolicy::default(), RateLimitPolicy::Reject),
        )
        .with_pause(&pause);
        let mut results = ResultSet::new();
        let outcome = enrich_one(
            &template,
            &SeedName {
                label: "Bad".into(),
                qid: "Q1 }".into(),
            },
            6,
            &AcceptanceGate::default(),
            &client,
            &mut results,
        );
        assert_eq!(outcome, KeyOutcome::Invalid);
        assert_eq!(transport.calls(), 0);
    }

    #[test]
    fn entity_uris_from_discovery_are_bound_as_bare_ids() {
        let template = QueryTemplate::parse("wd:{qid} LIMIT {limit}").expect("template");
        let transport = ScriptedTransport::new([ok_json(
            r#"{"results":{"bindings":[{"person":{"value":"p1"}},{"person":{"value":"p2"}}]}}"#,
        )]);
        let pause = RecordingPause::default();
        let client = QueryClient::new(
            &transport,
            settings(RetryPolicy::default(), RateLimitPolicy::Reject),
        )
        .with_pause(&pause);
        let mut results = ResultSet::new();
        let outcome = enrich_one(
            &template,
            &SeedName {
                label: "Anna".into(),
                qid: "http://www.wikidata.org/entity/Q1".into(),
            },
            6,
            &AcceptanceGate::default(),
            &client,
            &mut results,
        );
        assert_eq!(outcome, KeyOutcome::Accepted(2));
        assert_eq!(transport.sent.borrow()[0], "wd:Q1 LIMIT 6");
        assert_eq!(results.records()[0].namekey, "http://www.wikidata.org/entity/Q1");
    }
}
