//! Discovery configuration.
//!
//! Every section has defaults, so an absent or partial YAML file is valid.
//! The credential never comes from the file: it is read from
//! `DIVSCOUT_API_KEY`, falling back to `FMP_API_KEY`.
//!
//! ```yaml
//! provider:
//!   max_concurrency: 5
//!   requests_per_minute: 250
//! run:
//!   timeout_secs: 600
//! strategies:
//!   new_etf_launches:
//!     window_days: 90
//!   international_markets:
//!     enabled: false
//! ```

use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::error::ConfigError;
use crate::fetcher::{ApiKey, FetcherConfig};
use crate::retry::{RetryPolicy, RetrySettings};
use crate::strategies::{
    AristocratsCriteria, ConsistentPayersCriteria, DividendEtfsCriteria, EtfFamiliesCriteria,
    HighYieldCriteria, InternationalCriteria, NewEtfLaunchesCriteria, Paging,
    SectorLeadersCriteria,
};

pub const API_KEY_ENV: &str = "DIVSCOUT_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "FMP_API_KEY";

time::serde::format_description!(config_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    /// In-flight request ceiling; match the provider plan.
    pub max_concurrency: usize,
    pub requests_per_minute: Option<u32>,
    pub request_timeout_ms: u64,
    pub retry: RetrySettings,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: String::from("https://financialmodelingprep.com/api/v3"),
            max_concurrency: 10,
            requests_per_minute: Some(300),
            request_timeout_ms: 15_000,
            retry: RetrySettings::default(),
        }
    }
}

impl ProviderConfig {
    pub fn fetcher_config(&self, api_key: ApiKey) -> FetcherConfig {
        FetcherConfig {
            base_url: self.base_url.clone(),
            api_key,
            max_concurrency: self.max_concurrency,
            requests_per_minute: self.requests_per_minute,
            request_timeout_ms: self.request_timeout_ms,
            retry: RetryPolicy::from(&self.retry),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub timeout_secs: u64,
    /// How long in-flight attempts may run past the deadline before abort.
    pub shutdown_grace_ms: u64,
    /// Skip validation (and exclusion bookkeeping) for symbols already excluded.
    pub skip_known_excluded: bool,
    pub validate: bool,
    /// Validation lookups in flight at once per strategy.
    pub validation_concurrency: usize,
    /// Run date override; defaults to today (UTC).
    #[serde(with = "config_date::option")]
    pub as_of: Option<Date>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 900,
            shutdown_grace_ms: 2_000,
            skip_known_excluded: true,
            validate: true,
            validation_concurrency: 8,
            as_of: None,
        }
    }
}

impl RunConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub paging: Paging,
    pub high_yield_stocks: HighYieldCriteria,
    pub dividend_aristocrats: AristocratsCriteria,
    pub sector_leaders: SectorLeadersCriteria,
    pub consistent_payers: ConsistentPayersCriteria,
    pub etf_families: EtfFamiliesCriteria,
    pub new_etf_launches: NewEtfLaunchesCriteria,
    pub dividend_etfs: DividendEtfsCriteria,
    pub international_markets: InternationalCriteria,
}

/// Full configuration for one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub provider: ProviderConfig,
    pub run: RunConfig,
    pub strategies: StrategiesConfig,
    #[serde(skip)]
    pub api_key: Option<ApiKey>,
}

impl DiscoveryConfig {
    /// Load from an optional YAML file, then pick up the credential from the
    /// environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => {
                let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_yaml_str(&raw).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };

        config.api_key = api_key_from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, serde_yaml::Error> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(raw)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = ApiKey::new(api_key);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.max_concurrency == 0 {
            return Err(ConfigError::invalid(
                "provider.max_concurrency",
                "must be at least 1",
            ));
        }
        if self.provider.requests_per_minute == Some(0) {
            return Err(ConfigError::invalid(
                "provider.requests_per_minute",
                "must be at least 1 when set",
            ));
        }
        if !self.provider.base_url.starts_with("http") {
            return Err(ConfigError::invalid(
                "provider.base_url",
                format!("'{}' is not an http(s) URL", self.provider.base_url),
            ));
        }
        if self.run.timeout_secs == 0 {
            return Err(ConfigError::invalid("run.timeout_secs", "must be positive"));
        }
        if self.strategies.paging.page_size == 0 {
            return Err(ConfigError::invalid(
                "strategies.paging.page_size",
                "must be positive",
            ));
        }
        if self.strategies.new_etf_launches.window_days < 0 {
            return Err(ConfigError::invalid(
                "strategies.new_etf_launches.window_days",
                "must not be negative",
            ));
        }
        Ok(())
    }
}

/// `DIVSCOUT_API_KEY`, else `FMP_API_KEY`. Blank values count as unset.
pub fn api_key_from_env() -> Option<ApiKey> {
    [API_KEY_ENV, FALLBACK_API_KEY_ENV]
        .into_iter()
        .filter_map(|name| env::var(name).ok())
        .find_map(ApiKey::new)
}
