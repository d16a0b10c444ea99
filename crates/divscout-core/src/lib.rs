//! # Divscout Core
//!
//! Dividend symbol discovery engine.
//!
//! ## Overview
//!
//! A discovery run executes several independent strategies against one
//! rate-limited market-data provider, validates what they find, and merges the
//! survivors into a deduplicated symbol set with per-symbol provenance:
//!
//! - **Rate-limited fetcher** shared by every strategy (concurrency cap,
//!   per-minute quota, retry with backoff, run deadline)
//! - **Strategies** as a closed set of screener, behavioral and ETF methods
//! - **Validation gate** that records failures in a durable exclusion list
//! - **Aggregator** that merges candidates commutatively
//! - **Orchestrator** that fans strategies out and isolates their failures
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`aggregator`] | Deduplicating, provenance-preserving merge |
//! | [`cache`] | Single-flight memoization |
//! | [`config`] | YAML configuration and credential lookup |
//! | [`domain`] | Symbols, candidates, discovered symbols, exclusions |
//! | [`error`] | Validation and configuration errors |
//! | [`exclusion`] | Exclusion store contract and in-memory store |
//! | [`fetcher`] | Bounded, retrying provider access |
//! | [`http_client`] | HTTP client abstraction |
//! | [`orchestrator`] | Run lifecycle and summary |
//! | [`persistence`] | Symbol sink, run reporter, warehouse bindings |
//! | [`provider`] | Provider endpoints and wire rows |
//! | [`retry`] | Backoff and failure classification |
//! | [`strategies`] | Discovery strategies and registry |
//! | [`throttling`] | Per-minute request quota |
//! | [`validation`] | Tradability checks and the validation gate |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use divscout_core::{run_discovery, DiscoveryConfig, DiscoveryServices, ReqwestHttpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DiscoveryConfig::load(None)?;
//!     let services = DiscoveryServices::new(Arc::new(ReqwestHttpClient::new()));
//!     let output = run_discovery(config, services).await?;
//!     println!("{} symbols", output.run.total_unique);
//!     Ok(())
//! }
//! ```
//!
//! ## Security
//!
//! - The API key is read from the environment only and never logged
//! - Query descriptions used in logs and errors never carry the key

use std::future::Future;
use std::pin::Pin;

pub mod aggregator;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod exclusion;
pub mod fetcher;
pub mod http_client;
pub mod orchestrator;
pub mod persistence;
pub mod provider;
pub mod retry;
pub mod strategies;
pub mod throttling;
pub mod validation;

/// Boxed, sendable future used at the trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Aggregation
pub use aggregator::{AggregateSummary, ResultAggregator};

// Configuration
pub use config::{
    api_key_from_env, DiscoveryConfig, ProviderConfig, RunConfig, StrategiesConfig, API_KEY_ENV,
    FALLBACK_API_KEY_ENV,
};

// Domain models
pub use domain::{
    Candidate, DiscoveredSymbol, ExclusionRecord, InstrumentType, Symbol, SymbolAttributes,
    UtcDateTime,
};

// Error types
pub use error::{ConfigError, ValidationError};

// Exclusions
pub use exclusion::{ExclusionError, ExclusionStore, MemoryExclusionStore};

// Fetcher
pub use fetcher::{
    ApiKey, FetchError, FetchErrorKind, FetchStats, FetcherConfig, ProviderQuery,
    RateLimitedFetcher,
};

// HTTP client types
pub use http_client::{HttpClient, HttpError, HttpRequest, HttpResponse, ReqwestHttpClient};

// Orchestration
pub use orchestrator::{
    run_discovery, DiscoveryError, DiscoveryOrchestrator, DiscoveryOutput, DiscoveryRun,
    DiscoveryServices, RunState, RunStatus, StrategyReport, StrategyStatus,
};

// Persistence
pub use persistence::{
    LogRunReporter, MemorySymbolSink, PersistError, PublishReport, RunReporter, RunStamp,
    SymbolSink,
};

// Retry logic
pub use retry::{Backoff, RetryPolicy, RetrySettings};

// Strategies
pub use strategies::{Strategy, StrategyError, StrategyId, StrategyRegistry};

// Validation
pub use validation::{AdmitAll, GateVerdict, QuoteValidator, SymbolValidator, ValidationGate, Validity};

// Warehouse (re-exported from divscout-warehouse)
pub use divscout_warehouse::{Warehouse, WarehouseConfig, WarehouseError};
