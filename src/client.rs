//! Blocking SPARQL client with bounded retries and failure classification.
//!
//! Network-level failures (timeouts, refused connections, other transport
//! errors) are retried with doubling backoff. Anything the service actually
//! answered, whether a bad status or an unparseable body, is returned after a
//! single attempt since repeating the same query will not change the outcome.

use std::thread;
use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::sparql::SparqlResults;
use crate::template::Query;

/// Public Wikidata query service.
pub const WIKIDATA_SPARQL_ENDPOINT: &str = "https://query.wikidata.org/sparql";
/// Identifies the harvester to the query service, as its usage policy asks.
pub const DEFAULT_USER_AGENT: &str = "wikifaces/0.1 (Wikidata given-name portrait harvester)";
const SPARQL_JSON: &str = "application/sparql-results+json";
const STATUS_TOO_MANY_REQUESTS: u16 = 429;
const BODY_SNIPPET_CHARS: usize = 200;

/// Attempt budget and initial delay for transient failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff: Duration,
}

impl RetryPolicy {
    /// Builds a policy; `max_retries` counts total attempts and is clamped to at least one.
    pub fn new(max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            max_retries: max_retries.max(1),
            initial_backoff,
        }
    }

    /// Total attempts allowed for one query.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before the first retry.
    pub fn initial_backoff(&self) -> Duration {
        self.initial_backoff
    }

    /// Delay slept after failed attempt `attempt` (1-based): `initial * 2^(attempt-1)`.
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        let doublings = attempt.saturating_sub(1).min(31);
        self.initial_backoff.saturating_mul(1u32 << doublings)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// How an HTTP 429 answer is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RateLimitPolicy {
    /// Like any other rejected status: no retry, the caller moves on.
    Reject,
    /// Surfaced as [`QueryError::RateLimited`] so the caller can abort the run.
    Fatal,
}

/// Connection-level knobs for one client.
#[derive(Clone, Debug, PartialEq)]
pub struct ClientSettings {
    endpoint: Url,
    timeout: Duration,
    retry: RetryPolicy,
    rate_limit: RateLimitPolicy,
    user_agent: String,
}

impl ClientSettings {
    /// Constructs settings for an endpoint.
    pub fn new(
        endpoint: Url,
        timeout: Duration,
        retry: RetryPolicy,
        rate_limit: RateLimitPolicy,
        user_agent: impl Into<String>,
    ) -> Self {
        Self {
            endpoint,
            timeout,
            retry,
            rate_limit,
            user_agent: user_agent.into(),
        }
    }

    /// Query service URL.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry budget.
    pub fn retry(&self) -> RetryPolicy {
        self.retry
    }

    /// Rate-limit treatment.
    pub fn rate_limit(&self) -> RateLimitPolicy {
        self.rate_limit
    }

    /// `User-Agent` header value.
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

/// One outgoing query.
#[derive(Debug, Clone, Copy)]
pub struct QueryRequest<'a> {
    /// Service URL without query parameters.
    pub endpoint: &'a Url,
    /// Substituted SPARQL text.
    pub query: &'a str,
    /// Deadline for the whole exchange.
    pub timeout: Duration,
}

impl QueryRequest<'_> {
    /// Full GET URL carrying the query and the JSON format selector.
    pub fn url(&self) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut()
            .append_pair("query", self.query)
            .append_pair("format", "json");
        url
    }
}

/// Raw answer from the service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

/// Failures that happen before the service produced an answer. All are retryable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The request exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),
    /// DNS failure, refused or reset connection.
    #[error("connection failed: {0}")]
    Connect(String),
    /// Any other transport failure.
    #[error("request failed: {0}")]
    Other(String),
}

/// Sends one query over the wire.
pub trait Transport {
    /// Performs the exchange, returning whatever status and body came back.
    fn send(&self, request: &QueryRequest<'_>) -> Result<TransportResponse, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &QueryRequest<'_>) -> Result<TransportResponse, TransportError> {
        (**self).send(request)
    }
}

/// Blocks the current thread between attempts and between identifiers.
pub trait Pause {
    /// Sleeps for `duration`.
    fn pause(&self, duration: Duration);
}

impl<P: Pause + ?Sized> Pause for &P {
    fn pause(&self, duration: Duration) {
        (**self).pause(duration)
    }
}

/// Real sleeping via [`thread::sleep`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadPause;

impl Pause for ThreadPause {
    fn pause(&self, duration: Duration) {
        if !duration.is_zero() {
            thread::sleep(duration);
        }
    }
}

/// [`Transport`] backed by a blocking reqwest client.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Builds the HTTP client with the descriptive user agent and SPARQL JSON accept header.
    pub fn new(user_agent: &str) -> Result<Self, reqwest::Error> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static(SPARQL_JSON));
        let client = Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .build()?;
        Ok(Self { client })
    }

    fn classify(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(err.to_string())
        } else if err.is_connect() {
            TransportError::Connect(err.to_string())
        } else {
            TransportError::Other(err.to_string())
        }
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: &QueryRequest<'_>) -> Result<TransportResponse, TransportError> {
        let response = self
            .client
            .get(request.url())
            .timeout(request.timeout)
            .send()
            .map_err(Self::classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(Self::classify)?;
        Ok(TransportResponse { status, body })
    }
}

/// Classified query failure.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Every attempt failed with a transient error.
    #[error("query failed after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// Error from the final attempt.
        last: TransportError,
    },
    /// The service refused the query with a non-success status.
    #[error("query rejected with HTTP {status}: {detail}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Leading part of the response body.
        detail: String,
    },
    /// The service answered 429 and the client is configured to treat that as fatal.
    #[error("rate limit hit (HTTP 429); try again later")]
    RateLimited,
    /// The body was not a SPARQL JSON result document.
    #[error("malformed SPARQL JSON response: {0}")]
    Malformed(#[source] serde_json::Error),
}

impl QueryError {
    /// True for failures that came from the network rather than from the service's answer.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Exhausted { .. })
    }
}

/// Executes queries one at a time against a single endpoint.
pub struct QueryClient<T = HttpTransport, P = ThreadPause> {
    transport: T,
    pause: P,
    settings: ClientSettings,
}

impl QueryClient {
    /// Client over HTTP using the settings' user agent.
    pub fn http(settings: ClientSettings) -> Result<Self, reqwest::Error> {
        let transport = HttpTransport::new(settings.user_agent())?;
        Ok(QueryClient::new(transport, settings))
    }
}

impl<T: Transport> QueryClient<T, ThreadPause> {
    /// Client over an arbitrary transport, sleeping on the current thread.
    pub fn new(transport: T, settings: ClientSettings) -> Self {
        Self {
            transport,
            pause: ThreadPause,
            settings,
        }
    }
}

impl<T: Transport, P: Pause> QueryClient<T, P> {
    /// Swaps the pause implementation.
    pub fn with_pause<Q: Pause>(self, pause: Q) -> QueryClient<T, Q> {
        QueryClient {
            transport: self.transport,
            pause,
            settings: self.settings,
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Sleeps through the client's pause implementation.
    pub fn pause(&self, duration: Duration) {
        self.pause.pause(duration);
    }

    /// Runs `query`, retrying transient failures with doubling backoff.
    pub fn execute(&self, query: &Query) -> Result<SparqlResults, QueryError> {
        let retry = self.settings.retry;
        let max_attempts = retry.max_retries();
        let request = QueryRequest {
            endpoint: &self.settings.endpoint,
            query: query.as_str(),
            timeout: self.settings.timeout,
        };

        let mut attempt = 1u32;
        loop {
            debug!(attempt, max_attempts, "sending SPARQL query");
            let last = match self.transport.send(&request) {
                Ok(response) => return self.interpret(response),
                Err(err) => err,
            };

            warn!(attempt, max_attempts, error = %last, "transient query failure");
            if attempt >= max_attempts {
                error!(attempts = attempt, "giving up on query");
                return Err(QueryError::Exhausted {
                    attempts: attempt,
                    last,
                });
            }

            let backoff = retry.backoff_after(attempt);
            info!(backoff_ms = backoff.as_millis() as u64, "retrying query");
            self.pause.pause(backoff);
            attempt += 1;
        }
    }

    fn interpret(&self, response: TransportResponse) -> Result<SparqlResults, QueryError> {
        let TransportResponse { status, body } = response;
        if status == STATUS_TOO_MANY_REQUESTS && self.settings.rate_limit == RateLimitPolicy::Fatal
        {
            error!(status, "query service rate limit hit");
            return Err(QueryError::RateLimited);
        }
        if !(200..300).contains(&status) {
            let detail: String = body.chars().take(BODY_SNIPPET_CHARS).collect();
            error!(status, "query rejected by service");
            return Err(QueryError::Rejected { status, detail });
        }
        SparqlResults::from_json(&body).map_err(|err| {
            error!(error = %err, "could not decode SPARQL JSON response");
            QueryError::Malformed(err)
        })
    }
}
