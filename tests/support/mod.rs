//! Scripted fake provider shared by the behavior tests.
//!
//! Routes match on the endpoint path (the URL after the base) and optionally
//! on one query parameter. Each route replays its replies in order and then
//! repeats the last one. Unmatched requests get HTTP 404.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use divscout_core::{
    ApiKey, BoxFuture, DiscoveryConfig, FetcherConfig, HttpClient, HttpError, HttpRequest,
    HttpResponse, RateLimitedFetcher, RetryPolicy,
};
use serde_json::{json, Value};

pub const BASE_URL: &str = "http://provider.test/api/v3";
pub const API_KEY: &str = "test-key";

#[derive(Debug, Clone)]
pub enum Reply {
    Json(Value),
    /// 200 with a body that is not JSON.
    Raw(&'static str),
    Status(u16),
    /// Transport failure; `true` when a retry may help.
    Transport(bool),
    /// Wait, then answer.
    Delayed(Duration, Box<Reply>),
}

impl Reply {
    pub fn json(value: Value) -> Self {
        Self::Json(value)
    }

    pub fn after(self, delay: Duration) -> Self {
        Self::Delayed(delay, Box::new(self))
    }
}

struct Route {
    endpoint: String,
    exact: bool,
    param: Option<(String, String)>,
    replies: VecDeque<Reply>,
}

impl Route {
    fn matches(&self, endpoint: &str, request: &HttpRequest) -> bool {
        let path_ok = if self.exact {
            endpoint == self.endpoint
        } else {
            endpoint.starts_with(&self.endpoint)
        };
        let param_ok = match &self.param {
            Some((name, value)) => request.query_param(name) == Some(value.as_str()),
            None => true,
        };
        path_ok && param_ok
    }

    fn next_reply(&mut self) -> Reply {
        if self.replies.len() > 1 {
            self.replies.pop_front().unwrap_or(Reply::Status(404))
        } else {
            self.replies.front().cloned().unwrap_or(Reply::Status(404))
        }
    }
}

#[derive(Default)]
pub struct ScriptedProvider {
    routes: Mutex<Vec<Route>>,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    latency: Mutex<Duration>,
}

impl ScriptedProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every response waits this long; makes concurrency observable.
    pub fn with_latency(self: Arc<Self>, latency: Duration) -> Arc<Self> {
        *self.latency.lock().expect("latency poisoned") = latency;
        self
    }

    /// Exact endpoint match.
    pub fn on(&self, endpoint: &str, replies: Vec<Reply>) {
        self.push(endpoint, true, None, replies);
    }

    /// Endpoint prefix match, e.g. `quote-short/` for every quote.
    pub fn on_prefix(&self, prefix: &str, replies: Vec<Reply>) {
        self.push(prefix, false, None, replies);
    }

    /// Exact endpoint plus one query parameter.
    pub fn on_param(&self, endpoint: &str, name: &str, value: &str, replies: Vec<Reply>) {
        self.push(
            endpoint,
            true,
            Some((name.to_owned(), value.to_owned())),
            replies,
        );
    }

    fn push(&self, endpoint: &str, exact: bool, param: Option<(String, String)>, replies: Vec<Reply>) {
        // Later registrations take precedence.
        self.routes.lock().expect("routes poisoned").insert(
            0,
            Route {
                endpoint: endpoint.to_owned(),
                exact,
                param,
                replies: replies.into(),
            },
        );
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("requests poisoned").clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().expect("requests poisoned").len()
    }

    /// Requests whose endpoint starts with `prefix`.
    pub fn calls_to(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| endpoint_of(request).starts_with(prefix))
            .count()
    }

    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    fn reply_for(&self, request: &HttpRequest) -> Reply {
        let endpoint = endpoint_of(request);
        let mut routes = self.routes.lock().expect("routes poisoned");
        routes
            .iter_mut()
            .find(|route| route.matches(endpoint, request))
            .map(Route::next_reply)
            .unwrap_or(Reply::Status(404))
    }
}

fn endpoint_of(request: &HttpRequest) -> &str {
    request
        .url
        .strip_prefix(BASE_URL)
        .unwrap_or(&request.url)
        .trim_start_matches('/')
}

async fn resolve(reply: Reply) -> Result<HttpResponse, HttpError> {
    let mut reply = reply;
    loop {
        match reply {
            Reply::Json(value) => return Ok(HttpResponse::ok(value.to_string())),
            Reply::Raw(body) => return Ok(HttpResponse::ok(body)),
            Reply::Status(status) => {
                return Ok(HttpResponse::new(status, r#"{"error":"scripted"}"#))
            }
            Reply::Transport(true) => return Err(HttpError::Transient("connection reset".into())),
            Reply::Transport(false) => return Err(HttpError::Fatal("connection refused".into())),
            Reply::Delayed(delay, inner) => {
                tokio::time::sleep(delay).await;
                reply = *inner;
            }
        }
    }
}

impl HttpClient for ScriptedProvider {
    fn execute<'a>(&'a self, request: HttpRequest) -> BoxFuture<'a, Result<HttpResponse, HttpError>> {
        let reply = self.reply_for(&request);
        self.requests
            .lock()
            .expect("requests poisoned")
            .push(request);
        let latency = *self.latency.lock().expect("latency poisoned");

        Box::pin(async move {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
            if !latency.is_zero() {
                tokio::time::sleep(latency).await;
            }
            let outcome = resolve(reply).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            outcome
        })
    }
}

/// Retries without waiting, so exhaustion tests stay fast.
pub fn quick_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::fixed(Duration::from_millis(1), max_attempts)
}

pub fn fetcher(
    provider: &Arc<ScriptedProvider>,
    max_concurrency: usize,
    retry: RetryPolicy,
) -> RateLimitedFetcher {
    let http: Arc<dyn HttpClient> = provider.clone();
    RateLimitedFetcher::new(
        FetcherConfig {
            base_url: BASE_URL.to_owned(),
            api_key: ApiKey::new(API_KEY).expect("non-empty key"),
            max_concurrency,
            requests_per_minute: None,
            request_timeout_ms: 1_000,
            retry,
        },
        http,
    )
}

/// Configuration pointed at the scripted provider with fast retries and
/// every strategy disabled; tests enable what they exercise.
pub fn config() -> DiscoveryConfig {
    let mut config = DiscoveryConfig::default().with_api_key(API_KEY);
    config.provider.base_url = BASE_URL.to_owned();
    config.provider.requests_per_minute = None;
    config.provider.retry.max_attempts = 2;
    config.provider.retry.base_delay_ms = 1;
    config.provider.retry.max_delay_ms = 1;
    config.provider.retry.jitter = false;
    config.run.shutdown_grace_ms = 50;

    let strategies = &mut config.strategies;
    strategies.high_yield_stocks.enabled = false;
    strategies.dividend_aristocrats.enabled = false;
    strategies.sector_leaders.enabled = false;
    strategies.consistent_payers.enabled = false;
    strategies.etf_families.enabled = false;
    strategies.new_etf_launches.enabled = false;
    strategies.dividend_etfs.enabled = false;
    strategies.international_markets.enabled = false;
    config
}

pub fn stock(symbol: &str, dividend_yield: f64, market_cap: f64) -> Value {
    json!({
        "symbol": symbol,
        "companyName": format!("{symbol} Holdings"),
        "marketCap": market_cap,
        "sector": "Utilities",
        "exchangeShortName": "NYSE",
        "price": 50.0,
        "dividendYield": dividend_yield,
        "isEtf": false,
        "isFund": false,
    })
}

pub fn etf(symbol: &str, name: &str, inception: Option<&str>) -> Value {
    json!({
        "symbol": symbol,
        "name": name,
        "price": 25.0,
        "exchange": "NYSE ARCA",
        "inceptionDate": inception,
        "type": "etf",
    })
}

pub fn tradable_quote(symbol: &str) -> Reply {
    Reply::json(json!([{ "symbol": symbol, "price": 42.0, "volume": 125000 }]))
}

pub fn dead_quote(symbol: &str) -> Reply {
    Reply::json(json!([{ "symbol": symbol, "price": 0.0, "volume": 0 }]))
}
