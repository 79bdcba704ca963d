//! Run configuration for both pipelines, with CLI/env overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use url::Url;

use crate::client::{
    ClientSettings, RateLimitPolicy, RetryPolicy, DEFAULT_USER_AGENT, WIKIDATA_SPARQL_ENDPOINT,
};

/// Rows requested per given name; matches the `LIMIT` in the per-key query.
pub const DEFAULT_RESULT_LIMIT: u32 = 6;
/// Minimum rows before a given name is kept.
pub const DEFAULT_MIN_RESULTS: usize = 2;
/// Attempts per query.
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// First retry delay in seconds.
pub const DEFAULT_INITIAL_BACKOFF_SECS: f64 = 2.0;
/// Pause between consecutive given-name queries.
pub const DEFAULT_COURTESY_DELAY: Duration = Duration::from_secs(1);
/// Per-key request timeout.
pub const DEFAULT_PER_KEY_TIMEOUT: Duration = Duration::from_secs(30);
/// Bulk discovery request timeout; that query returns far more rows.
pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(60);
/// Humans sampled by the discovery query.
pub const DEFAULT_SAMPLE_SIZE: u32 = 750_000;
/// Row cap for the discovery query.
pub const DEFAULT_LIMIT_RESULTS: u32 = 7_500_000;
/// Minimum people per given name in the discovery query.
pub const DEFAULT_MIN_COUNT: u32 = 10;
/// Label language for discovered given names.
pub const DEFAULT_LANGUAGE: &str = "en";

fn default_endpoint() -> Url {
    Url::parse(WIKIDATA_SPARQL_ENDPOINT)
        .unwrap_or_else(|_| unreachable!("constant endpoint parses"))
}

/// Settings for the per-key enrichment run.
#[derive(Clone, Debug, PartialEq)]
pub struct EnrichmentConfig {
    input_path: PathBuf,
    template_path: PathBuf,
    output_path: PathBuf,
    result_limit: u32,
    min_results: usize,
    courtesy_delay: Duration,
    client: ClientSettings,
}

impl EnrichmentConfig {
    /// Constructs a configuration from explicit values.
    pub fn new(
        input_path: PathBuf,
        template_path: PathBuf,
        output_path: PathBuf,
        result_limit: u32,
        min_results: usize,
        courtesy_delay: Duration,
        client: ClientSettings,
    ) -> Self {
        Self {
            input_path,
            template_path,
            output_path,
            result_limit,
            min_results,
            courtesy_delay,
            client,
        }
    }

    /// Seed given-names file.
    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Per-key query template.
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Destination for accepted records.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Value bound to the template's `limit` placeholder.
    pub fn result_limit(&self) -> u32 {
        self.result_limit
    }

    /// Acceptance threshold.
    pub fn min_results(&self) -> usize {
        self.min_results
    }

    /// Delay between identifiers.
    pub fn courtesy_delay(&self) -> Duration {
        self.courtesy_delay
    }

    /// Client settings.
    pub fn client(&self) -> &ClientSettings {
        &self.client
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data/wikifaces-seedgivennames.csv"),
            template_path: PathBuf::from("sparql/find-givennames.rq"),
            output_path: PathBuf::from("data/wikifaces-datacache.csv"),
            result_limit: DEFAULT_RESULT_LIMIT,
            min_results: DEFAULT_MIN_RESULTS,
            courtesy_delay: DEFAULT_COURTESY_DELAY,
            client: ClientSettings::new(
                default_endpoint(),
                DEFAULT_PER_KEY_TIMEOUT,
                RetryPolicy::default(),
                RateLimitPolicy::Reject,
                DEFAULT_USER_AGENT,
            ),
        }
    }
}

/// Parameters bound into the discovery template.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiscoveryParams {
    /// Humans sampled before grouping by given name.
    pub sample_size: u32,
    /// Row cap.
    pub limit_results: u32,
    /// Minimum people per given name.
    pub min_count: u32,
    /// Label language code.
    pub language: String,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            limit_results: DEFAULT_LIMIT_RESULTS,
            min_count: DEFAULT_MIN_COUNT,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }
}

/// Settings for the single-shot seed discovery run.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscoveryConfig {
    template_path: PathBuf,
    output_path: PathBuf,
    params: DiscoveryParams,
    client: ClientSettings,
}

impl DiscoveryConfig {
    /// Constructs a configuration from explicit values.
    pub fn new(
        template_path: PathBuf,
        output_path: PathBuf,
        params: DiscoveryParams,
        client: ClientSettings,
    ) -> Self {
        Self {
            template_path,
            output_path,
            params,
            client,
        }
    }

    /// Discovery query template.
    pub fn template_path(&self) -> &Path {
        &self.template_path
    }

    /// Destination for seed names.
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Template parameters.
    pub fn params(&self) -> &DiscoveryParams {
        &self.params
    }

    /// Client settings.
    pub fn client(&self) -> &ClientSettings {
        &self.client
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            template_path: PathBuf::from("sparql/find-seedgivennames-template.rq"),
            output_path: PathBuf::from("data/wikifaces-seedgivennames.csv"),
            params: DiscoveryParams::default(),
            client: ClientSettings::new(
                default_endpoint(),
                DEFAULT_DISCOVERY_TIMEOUT,
                RetryPolicy::default(),
                RateLimitPolicy::Fatal,
                DEFAULT_USER_AGENT,
            ),
        }
    }
}

fn backoff_from_secs(secs: f64) -> anyhow::Result<Duration> {
    Duration::try_from_secs_f64(secs)
        .map_err(|err| anyhow::anyhow!("invalid backoff of {secs} seconds: {err}"))
}

fn parse_endpoint(raw: &str) -> anyhow::Result<Url> {
    Url::parse(raw).map_err(|err| anyhow::anyhow!("invalid SPARQL endpoint {raw:?}: {err}"))
}

/// Command-line interface for the per-key enrichment binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "find-givennames",
    about = "Find people with portraits and English Wikipedia articles for each seed given name"
)]
pub struct EnrichmentCli {
    /// Semicolon-delimited seed file with `givennameLabel` and `qid` columns
    #[arg(
        long,
        env = "WIKIFACES_INPUT",
        default_value = "data/wikifaces-seedgivennames.csv"
    )]
    pub input: PathBuf,

    /// SPARQL template with `{qid}` and `{limit}` placeholders
    #[arg(
        long,
        env = "WIKIFACES_QUERY",
        default_value = "sparql/find-givennames.rq"
    )]
    pub query: PathBuf,

    /// Output file for accepted records
    #[arg(
        long,
        env = "WIKIFACES_OUTPUT",
        default_value = "data/wikifaces-datacache.csv"
    )]
    pub output: PathBuf,

    /// SPARQL endpoint URL
    #[arg(long, env = "WIKIFACES_ENDPOINT", default_value = WIKIDATA_SPARQL_ENDPOINT)]
    pub endpoint: String,

    /// Maximum people requested per given name
    #[arg(long, env = "WIKIFACES_LIMIT", default_value_t = DEFAULT_RESULT_LIMIT)]
    pub limit: u32,

    /// Minimum people required to keep a given name
    #[arg(long, env = "WIKIFACES_MIN_RESULTS", default_value_t = DEFAULT_MIN_RESULTS)]
    pub min_results: usize,

    /// Attempts per query before giving up on a given name
    #[arg(long, env = "WIKIFACES_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Seconds before the first retry; doubles on each further retry
    #[arg(long, env = "WIKIFACES_BACKOFF_SECS", default_value_t = DEFAULT_INITIAL_BACKOFF_SECS)]
    pub backoff_secs: f64,

    /// Milliseconds to wait between given names
    #[arg(long, env = "WIKIFACES_COURTESY_MS", default_value_t = 1000)]
    pub courtesy_ms: u64,

    /// Request timeout in seconds
    #[arg(long, env = "WIKIFACES_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// User-Agent sent to the query service
    #[arg(long, env = "WIKIFACES_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl EnrichmentCli {
    /// Converts the parsed CLI into an [`EnrichmentConfig`].
    pub fn build_config(&self) -> anyhow::Result<EnrichmentConfig> {
        let client = ClientSettings::new(
            parse_endpoint(&self.endpoint)?,
            Duration::from_secs(self.timeout_secs.max(1)),
            RetryPolicy::new(self.max_retries, backoff_from_secs(self.backoff_secs)?),
            RateLimitPolicy::Reject,
            self.user_agent.clone(),
        );
        Ok(EnrichmentConfig::new(
            self.input.clone(),
            self.query.clone(),
            self.output.clone(),
            self.limit,
            self.min_results,
            Duration::from_millis(self.courtesy_ms),
            client,
        ))
    }
}

/// Command-line interface for the seed discovery binary.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "seed-givennames",
    about = "Discover given names shared by many documented people"
)]
pub struct DiscoveryCli {
    /// SPARQL template with `{sample_size}`, `{limit_results}`, `{min_count}` and `{language}`
    #[arg(
        long,
        env = "WIKIFACES_SEED_QUERY",
        default_value = "sparql/find-seedgivennames-template.rq"
    )]
    pub query: PathBuf,

    /// Output file for discovered given names
    #[arg(
        long,
        env = "WIKIFACES_SEED_OUTPUT",
        default_value = "data/wikifaces-seedgivennames.csv"
    )]
    pub output: PathBuf,

    /// SPARQL endpoint URL
    #[arg(long, env = "WIKIFACES_ENDPOINT", default_value = WIKIDATA_SPARQL_ENDPOINT)]
    pub endpoint: String,

    /// Humans sampled before grouping by given name
    #[arg(long, env = "WIKIFACES_SAMPLE_SIZE", default_value_t = DEFAULT_SAMPLE_SIZE)]
    pub sample_size: u32,

    /// Row cap for the discovery query
    #[arg(long, env = "WIKIFACES_LIMIT_RESULTS", default_value_t = DEFAULT_LIMIT_RESULTS)]
    pub limit_results: u32,

    /// Minimum people sharing a given name
    #[arg(long, env = "WIKIFACES_MIN_COUNT", default_value_t = DEFAULT_MIN_COUNT)]
    pub min_count: u32,

    /// Label language code
    #[arg(long, env = "WIKIFACES_LANGUAGE", default_value = DEFAULT_LANGUAGE)]
    pub language: String,

    /// Attempts before the run fails
    #[arg(long, env = "WIKIFACES_MAX_RETRIES", default_value_t = DEFAULT_MAX_RETRIES)]
    pub max_retries: u32,

    /// Seconds before the first retry; doubles on each further retry
    #[arg(long, env = "WIKIFACES_BACKOFF_SECS", default_value_t = DEFAULT_INITIAL_BACKOFF_SECS)]
    pub backoff_secs: f64,

    /// Request timeout in seconds
    #[arg(long, env = "WIKIFACES_SEED_TIMEOUT_SECS", default_value_t = 60)]
    pub timeout_secs: u64,

    /// User-Agent sent to the query service
    #[arg(long, env = "WIKIFACES_USER_AGENT", default_value = DEFAULT_USER_AGENT)]
    pub user_agent: String,
}

impl DiscoveryCli {
    /// Converts the parsed CLI into a [`DiscoveryConfig`].
    pub fn build_config(&self) -> anyhow::Result<DiscoveryConfig> {
        let client = ClientSettings::new(
            parse_endpoint(&self.endpoint)?,
            Duration::from_secs(self.timeout_secs.max(1)),
            RetryPolicy::new(self.max_retries, backoff_from_secs(self.backoff_secs)?),
            RateLimitPolicy::Fatal,
            self.user_agent.clone(),
        );
        Ok(DiscoveryConfig::new(
            self.query.clone(),
            self.output.clone(),
            DiscoveryParams {
                sample_size: self.sample_size,
                limit_results: self.limit_results,
                min_count: self.min_count,
                language: self.language.clone(),
            },
            client,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_match_config_defaults() {
        let cli = EnrichmentCli::try_parse_from(["find-givennames"]).expect("parse");
        assert_eq!(cli.build_config().expect("config"), EnrichmentConfig::default());

        let cli = DiscoveryCli::try_parse_from(["seed-givennames"]).expect("parse");
        assert_eq!(cli.build_config().expect("config"), DiscoveryConfig::default());
    }

    #[test]
    fn documented_defaults() {
        let config = EnrichmentConfig::default();
        assert_eq!(config.result_limit(), 6);
        assert_eq!(config.min_results(), 2);
        assert_eq!(config.client().retry().max_retries(), 3);
        assert_eq!(config.client().retry().initial_backoff(), Duration::from_secs(2));
        assert_eq!(config.client().timeout(), Duration::from_secs(30));
        assert_eq!(config.client().rate_limit(), RateLimitPolicy::Reject);

        let config = DiscoveryConfig::default();
        assert_eq!(config.params().limit_results, 7_500_000);
        assert_eq!(config.params().min_count, 10);
        assert_eq!(config.client().timeout(), Duration::from_secs(60));
        assert_eq!(config.client().rate_limit(), RateLimitPolicy::Fatal);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = EnrichmentCli::try_parse_from([
            "find-givennames",
            "--min-results",
            "3",
            "--backoff-secs",
            "0.5",
            "--max-retries",
            "5",
        ])
        .expect("parse");
        let config = cli.build_config().expect("config");
        assert_eq!(config.min_results(), 3);
        assert_eq!(
            config.client().retry(),
            RetryPolicy::new(5, Duration::from_millis(500))
        );
    }

    #[test]
    fn rejects_bad_endpoint_and_backoff() {
        let cli = EnrichmentCli::try_parse_from(["find-givennames", "--endpoint", "not a url"])
            .expect("parse");
        assert!(cli.build_config().is_err());
        let cli = DiscoveryCli::try_parse_from(["seed-givennames", "--backoff-secs=-1"])
            .expect("parse");
        assert!(cli.build_config().is_err());
    }
}
