//! Bounded-concurrency, retrying access to the market-data provider.
//!
//! Every outbound request from every strategy goes through one
//! [`RateLimitedFetcher`]. It holds the only resources strategies share:
//!
//! - a semaphore capping in-flight requests at `max_concurrency`
//! - an optional per-minute request quota
//! - success/failure counters for the run summary
//!
//! A run works on a [`RateLimitedFetcher::scoped`] view that adds the run
//! deadline and a fresh single-flight response cache.

use std::fmt::{Display, Formatter};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::cache::SingleFlight;
use crate::http_client::{HttpClient, HttpError, HttpRequest};
use crate::retry::{FailureClass, RetryPolicy};
use crate::throttling::RequestQuota;

/// Provider credential. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// `None` for empty or whitespace-only input.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_owned()))
        }
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Endpoint plus parameters. The credential is attached by the fetcher and
/// is never part of a query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderQuery {
    pub endpoint: String,
    pub params: Vec<(String, String)>,
}

impl ProviderQuery {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            params: Vec::new(),
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.params.push((name.into(), value.to_string()));
        self
    }

    /// Stable, credential-free rendering used for logs, errors and cache keys.
    pub fn describe(&self) -> String {
        if self.params.is_empty() {
            return self.endpoint.clone();
        }

        let params = self
            .params
            .iter()
            .map(|(name, value)| format!("{name}={}", urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{params}", self.endpoint)
    }
}

impl Display for ProviderQuery {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Category of a terminal fetch failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Transient failures persisted through every attempt.
    Exhausted,
    /// Rejected request (4xx other than 408/429, transport refusal).
    NonRetriable,
    /// Credential refused (401/403 or a provider error body).
    Unauthorized,
    /// Response body was not the JSON shape expected.
    Malformed,
    /// The run deadline passed before the call could finish.
    DeadlineExceeded,
}

/// Terminal failure of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    query: String,
    attempts: u32,
    message: String,
}

impl FetchError {
    pub fn new(
        kind: FetchErrorKind,
        query: impl Into<String>,
        attempts: u32,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            query: query.into(),
            attempts,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    /// Credential-free description of the failed query.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last underlying failure.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Only exhausted transient failures may succeed if asked again later.
    pub const fn retriable(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Exhausted)
    }

    pub const fn is_unauthorized(&self) -> bool {
        matches!(self.kind, FetchErrorKind::Unauthorized)
    }

    pub const fn is_deadline(&self) -> bool {
        matches!(self.kind, FetchErrorKind::DeadlineExceeded)
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Exhausted => "fetch.exhausted",
            FetchErrorKind::NonRetriable => "fetch.non_retriable",
            FetchErrorKind::Unauthorized => "fetch.unauthorized",
            FetchErrorKind::Malformed => "fetch.malformed",
            FetchErrorKind::DeadlineExceeded => "fetch.deadline_exceeded",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({}, query '{}', {} attempt(s))",
            self.message,
            self.code(),
            self.query,
            self.attempts
        )
    }
}

impl std::error::Error for FetchError {}

/// Snapshot of fetcher counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FetchStats {
    /// HTTP attempts actually sent.
    pub requests: u64,
    /// Queries that returned data.
    pub successes: u64,
    /// Queries that ended in a [`FetchError`].
    pub failures: u64,
    /// Backoff sleeps taken.
    pub retries: u64,
}

#[derive(Default)]
struct Counters {
    requests: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

/// Static fetcher settings.
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    /// Without trailing slash, e.g. `https://financialmodelingprep.com/api/v3`.
    pub base_url: String,
    pub api_key: ApiKey,
    pub max_concurrency: usize,
    pub requests_per_minute: Option<u32>,
    pub request_timeout_ms: u64,
    pub retry: RetryPolicy,
}

struct Shared {
    http: Arc<dyn HttpClient>,
    base_url: String,
    api_key: ApiKey,
    request_timeout_ms: u64,
    retry: RetryPolicy,
    max_concurrency: usize,
    permits: Semaphore,
    quota: Option<RequestQuota>,
    counters: Counters,
    credential_rejected: AtomicBool,
}

/// Shared provider gateway. Cloning is cheap and every clone uses the same
/// concurrency limiter, quota and counters.
#[derive(Clone)]
pub struct RateLimitedFetcher {
    shared: Arc<Shared>,
    deadline: Option<Instant>,
    responses: Arc<SingleFlight<Arc<Value>>>,
}

enum AttemptFailure {
    Retriable(String),
    Permanent(String),
    Unauthorized(String),
    Malformed(String),
    Deadline,
}

impl RateLimitedFetcher {
    pub fn new(config: FetcherConfig, http: Arc<dyn HttpClient>) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            shared: Arc::new(Shared {
                http,
                base_url: config.base_url.trim_end_matches('/').to_owned(),
                api_key: config.api_key,
                request_timeout_ms: config.request_timeout_ms,
                retry: config.retry,
                max_concurrency,
                permits: Semaphore::new(max_concurrency),
                quota: config.requests_per_minute.map(RequestQuota::per_minute),
                counters: Counters::default(),
                credential_rejected: AtomicBool::new(false),
            }),
            deadline: None,
            responses: Arc::new(SingleFlight::new()),
        }
    }

    /// Run-scoped view: same limiter and counters, the given deadline, and an
    /// empty response cache.
    pub fn scoped(&self, deadline: Option<Instant>) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            deadline,
            responses: Arc::new(SingleFlight::new()),
        }
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn max_concurrency(&self) -> usize {
        self.shared.max_concurrency
    }

    pub fn stats(&self) -> FetchStats {
        let counters = &self.shared.counters;
        FetchStats {
            requests: counters.requests.load(Ordering::Relaxed),
            successes: counters.successes.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            retries: counters.retries.load(Ordering::Relaxed),
        }
    }

    /// Whether the provider has refused the credential at least once.
    pub fn credential_rejected(&self) -> bool {
        self.shared.credential_rejected.load(Ordering::Relaxed)
    }

    fn deadline_passed(&self) -> bool {
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// Issue one query, retrying transient failures with backoff.
    pub async fn fetch(&self, query: &ProviderQuery) -> Result<Value, FetchError> {
        let description = query.describe();
        let max_attempts = self.shared.retry.max_attempts.max(1);
        let mut attempt = 0_u32;

        loop {
            if self.deadline_passed() {
                return Err(self.fail(
                    FetchErrorKind::DeadlineExceeded,
                    &description,
                    attempt,
                    "run deadline reached before the request could start",
                ));
            }

            attempt += 1;
            let failure = match self.attempt(query).await {
                Ok(value) => {
                    self.shared.counters.successes.fetch_add(1, Ordering::Relaxed);
                    debug!(query = %description, attempt, "provider query succeeded");
                    return Ok(value);
                }
                Err(failure) => failure,
            };

            let message = match failure {
                AttemptFailure::Retriable(message) => message,
                AttemptFailure::Permanent(message) => {
                    return Err(self.fail(FetchErrorKind::NonRetriable, &description, attempt, message));
                }
                AttemptFailure::Malformed(message) => {
                    return Err(self.fail(FetchErrorKind::Malformed, &description, attempt, message));
                }
                AttemptFailure::Unauthorized(message) => {
                    self.shared.credential_rejected.store(true, Ordering::Relaxed);
                    return Err(self.fail(FetchErrorKind::Unauthorized, &description, attempt, message));
                }
                AttemptFailure::Deadline => {
                    return Err(self.fail(
                        FetchErrorKind::DeadlineExceeded,
                        &description,
                        attempt - 1,
                        "run deadline reached while waiting for request capacity",
                    ));
                }
            };

            if attempt >= max_attempts {
                return Err(self.fail(FetchErrorKind::Exhausted, &description, attempt, message));
            }

            let delay = self.shared.retry.delay_after(attempt);
            if let Some(deadline) = self.deadline {
                if Instant::now().checked_add(delay).map_or(true, |resume| resume >= deadline) {
                    return Err(self.fail(
                        FetchErrorKind::DeadlineExceeded,
                        &description,
                        attempt,
                        format!("retry would cross the run deadline; last failure: {message}"),
                    ));
                }
            }

            self.shared.counters.retries.fetch_add(1, Ordering::Relaxed);
            warn!(
                query = %description,
                attempt,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %message,
                "transient provider failure, backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    /// Like [`Self::fetch`], but identical queries within one scoped run share a
    /// single provider call. Failures are not remembered.
    pub async fn fetch_shared(&self, query: &ProviderQuery) -> Result<Arc<Value>, FetchError> {
        self.responses
            .get_or_try_init(&query.describe(), || async {
                self.fetch(query).await.map(Arc::new)
            })
            .await
    }

    /// Walk a `limit`/`offset` paginated endpoint and concatenate the rows.
    ///
    /// The walk ends at the first page whose length differs from `page_size`
    /// or after `max_pages` pages.
    pub async fn fetch_pages(
        &self,
        query: &ProviderQuery,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Vec<Value>, FetchError> {
        let page_size = page_size.max(1);
        let mut rows = Vec::new();

        for page in 0..max_pages.max(1) {
            let page_query = query
                .clone()
                .with_param("limit", page_size)
                .with_param("offset", page * page_size);

            let body = self.fetch(&page_query).await?;
            let Value::Array(items) = body else {
                return Err(FetchError::new(
                    FetchErrorKind::Malformed,
                    page_query.describe(),
                    1,
                    "expected a JSON array page",
                ));
            };

            let full_page = items.len() == page_size;
            rows.extend(items);
            if !full_page {
                break;
            }
        }

        Ok(rows)
    }

    /// Paginated walk shared across callers within one scoped run.
    pub async fn fetch_pages_shared(
        &self,
        query: &ProviderQuery,
        page_size: usize,
        max_pages: usize,
    ) -> Result<Arc<Value>, FetchError> {
        let key = format!("{}#pages={page_size}x{max_pages}", query.describe());
        self.responses
            .get_or_try_init(&key, || async {
                self.fetch_pages(query, page_size, max_pages)
                    .await
                    .map(|rows| Arc::new(Value::Array(rows)))
            })
            .await
    }

    async fn attempt(&self, query: &ProviderQuery) -> Result<Value, AttemptFailure> {
        let _permit = match self.deadline {
            Some(deadline) => {
                match tokio::time::timeout_at(deadline, self.shared.permits.acquire()).await {
                    Ok(permit) => permit,
                    Err(_) => return Err(AttemptFailure::Deadline),
                }
            }
            None => self.shared.permits.acquire().await,
        }
        .map_err(|_| AttemptFailure::Permanent(String::from("fetcher is shut down")))?;

        if let Some(quota) = &self.shared.quota {
            if !quota.acquire_until(self.deadline).await {
                return Err(AttemptFailure::Deadline);
            }
        }

        let request = query
            .params
            .iter()
            .fold(
                HttpRequest::get(format!("{}/{}", self.shared.base_url, query.endpoint))
                    .timeout_ms(self.shared.request_timeout_ms),
                |request, (name, value)| request.param(name.as_str(), value.as_str()),
            )
            .param("apikey", self.shared.api_key.expose());

        self.shared.counters.requests.fetch_add(1, Ordering::Relaxed);
        let response = self.shared.http.execute(request).await.map_err(|error| match error {
            HttpError::Transient(message) => AttemptFailure::Retriable(message),
            HttpError::Fatal(message) => AttemptFailure::Permanent(message),
        })?;

        if !response.is_success() {
            let message = format!("provider returned HTTP {}", response.status);
            return Err(match RetryPolicy::classify_status(response.status) {
                FailureClass::Retriable => AttemptFailure::Retriable(message),
                FailureClass::Permanent => AttemptFailure::Permanent(message),
                FailureClass::Unauthorized => AttemptFailure::Unauthorized(message),
            });
        }

        let body: Value = serde_json::from_str(&response.body)
            .map_err(|error| AttemptFailure::Malformed(format!("invalid JSON body: {error}")))?;

        if let Some(message) = body.get("Error Message").and_then(Value::as_str) {
            return Err(AttemptFailure::Unauthorized(format!(
                "provider rejected request: {message}"
            )));
        }

        Ok(body)
    }

    fn fail(
        &self,
        kind: FetchErrorKind,
        query: &str,
        attempts: u32,
        message: impl Into<String>,
    ) -> FetchError {
        self.shared.counters.failures.fetch_add(1, Ordering::Relaxed);
        let error = FetchError::new(kind, query, attempts, message);
        debug!(query, code = error.code(), attempts, "provider query failed");
        error
    }
}
