//! Discovery strategies.
//!
//! Each strategy is a criteria set plus a query routine that turns provider
//! data into [`Candidate`] records. The set is closed: [`Strategy`] has one
//! variant per discovery method and [`StrategyId`] names it for provenance.
//!
//! | Id | Source data |
//! |----|-------------|
//! | `high_yield_stocks` | screener |
//! | `dividend_aristocrats` | screener |
//! | `sector_leaders` | screener, one query per sector |
//! | `consistent_payers` | screener pool + dividend history |
//! | `etf_families` | ETF universe |
//! | `new_etf_launches` | ETF universe |
//! | `dividend_etfs` | ETF universe |
//! | `international_markets` | screener, one query per exchange |

mod behavioral;
mod etf;
mod screener;

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::Date;

use crate::config::StrategiesConfig;
use crate::fetcher::{FetchError, RateLimitedFetcher};
use crate::{Candidate, ValidationError};

pub use behavioral::{consistent_payment_streak, ConsistentPayersCriteria};
pub use etf::{
    matches_family, matches_keyword, within_launch_window, DividendEtfsCriteria,
    EtfFamiliesCriteria, NewEtfLaunchesCriteria,
};
pub use screener::{
    AristocratsCriteria, ExchangeThreshold, HighYieldCriteria, InternationalCriteria,
    SectorLeadersCriteria, SectorThreshold,
};

/// Stable strategy identifier. Declaration order is priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    HighYieldStocks,
    DividendAristocrats,
    SectorLeaders,
    ConsistentPayers,
    EtfFamilies,
    NewEtfLaunches,
    DividendEtfs,
    InternationalMarkets,
}

impl StrategyId {
    pub const ALL: [Self; 8] = [
        Self::HighYieldStocks,
        Self::DividendAristocrats,
        Self::SectorLeaders,
        Self::ConsistentPayers,
        Self::EtfFamilies,
        Self::NewEtfLaunches,
        Self::DividendEtfs,
        Self::InternationalMarkets,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::HighYieldStocks => "high_yield_stocks",
            Self::DividendAristocrats => "dividend_aristocrats",
            Self::SectorLeaders => "sector_leaders",
            Self::ConsistentPayers => "consistent_payers",
            Self::EtfFamilies => "etf_families",
            Self::NewEtfLaunches => "new_etf_launches",
            Self::DividendEtfs => "dividend_etfs",
            Self::InternationalMarkets => "international_markets",
        }
    }

    /// Merge priority; lower wins.
    pub const fn priority(self) -> u8 {
        self as u8
    }

    pub const fn description(self) -> &'static str {
        match self {
            Self::HighYieldStocks => "stocks with yield and market cap above thresholds",
            Self::DividendAristocrats => "large caps with a sustained minimum yield",
            Self::SectorLeaders => "per-sector yield leaders across a fixed sector list",
            Self::ConsistentPayers => "payers with steady yearly payment counts over consecutive years",
            Self::EtfFamilies => "ETFs whose name or ticker matches a fund-family fragment",
            Self::NewEtfLaunches => "ETFs launched within a trailing window",
            Self::DividendEtfs => "ETFs whose name carries a dividend keyword",
            Self::InternationalMarkets => "per-exchange yield leaders on non-domestic exchanges",
        }
    }
}

impl Display for StrategyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or(ValidationError::UnknownStrategy {
                value: value.trim().to_owned(),
            })
    }
}

/// Pagination bounds for list endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Paging {
    pub page_size: usize,
    pub max_pages: usize,
}

impl Default for Paging {
    fn default() -> Self {
        Self {
            page_size: 1_000,
            max_pages: 10,
        }
    }
}

/// Inputs a strategy runs against.
#[derive(Clone, Copy)]
pub struct StrategyContext<'a> {
    pub fetcher: &'a RateLimitedFetcher,
    /// Run date; windows and complete years are measured from it.
    pub today: Date,
    pub paging: Paging,
}

/// Terminal failure of one strategy.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("could not decode response for '{query}': {message}")]
    Decode { query: String, message: String },
}

impl StrategyError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Fetch(error) if error.is_deadline())
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Fetch(error) if error.is_unauthorized())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Fetch(error) => error.code(),
            Self::Decode { .. } => "strategy.decode",
        }
    }
}

/// One discovery method with its criteria.
#[derive(Debug, Clone, PartialEq)]
pub enum Strategy {
    HighYieldStocks(HighYieldCriteria),
    DividendAristocrats(AristocratsCriteria),
    SectorLeaders(SectorLeadersCriteria),
    ConsistentPayers(ConsistentPayersCriteria),
    EtfFamilies(EtfFamiliesCriteria),
    NewEtfLaunches(NewEtfLaunchesCriteria),
    DividendEtfs(DividendEtfsCriteria),
    InternationalMarkets(InternationalCriteria),
}

impl Strategy {
    pub const fn id(&self) -> StrategyId {
        match self {
            Self::HighYieldStocks(_) => StrategyId::HighYieldStocks,
            Self::DividendAristocrats(_) => StrategyId::DividendAristocrats,
            Self::SectorLeaders(_) => StrategyId::SectorLeaders,
            Self::ConsistentPayers(_) => StrategyId::ConsistentPayers,
            Self::EtfFamilies(_) => StrategyId::EtfFamilies,
            Self::NewEtfLaunches(_) => StrategyId::NewEtfLaunches,
            Self::DividendEtfs(_) => StrategyId::DividendEtfs,
            Self::InternationalMarkets(_) => StrategyId::InternationalMarkets,
        }
    }

    /// Criteria as JSON, for listings.
    pub fn criteria(&self) -> Value {
        let rendered = match self {
            Self::HighYieldStocks(criteria) => serde_json::to_value(criteria),
            Self::DividendAristocrats(criteria) => serde_json::to_value(criteria),
            Self::SectorLeaders(criteria) => serde_json::to_value(criteria),
            Self::ConsistentPayers(criteria) => serde_json::to_value(criteria),
            Self::EtfFamilies(criteria) => serde_json::to_value(criteria),
            Self::NewEtfLaunches(criteria) => serde_json::to_value(criteria),
            Self::DividendEtfs(criteria) => serde_json::to_value(criteria),
            Self::InternationalMarkets(criteria) => serde_json::to_value(criteria),
        };
        rendered.unwrap_or(Value::Null)
    }

    /// Query the provider and return raw candidates. Never mutates shared state.
    pub async fn run(&self, ctx: &StrategyContext<'_>) -> Result<Vec<Candidate>, StrategyError> {
        match self {
            Self::HighYieldStocks(criteria) => screener::high_yield(ctx, criteria).await,
            Self::DividendAristocrats(criteria) => screener::aristocrats(ctx, criteria).await,
            Self::SectorLeaders(criteria) => screener::sector_leaders(ctx, criteria).await,
            Self::ConsistentPayers(criteria) => behavioral::consistent_payers(ctx, criteria).await,
            Self::EtfFamilies(criteria) => etf::families(ctx, criteria).await,
            Self::NewEtfLaunches(criteria) => etf::new_launches(ctx, criteria).await,
            Self::DividendEtfs(criteria) => etf::dividend_focused(ctx, criteria).await,
            Self::InternationalMarkets(criteria) => screener::international(ctx, criteria).await,
        }
    }
}

/// Ordered, duplicate-free set of strategies for a run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyRegistry {
    strategies: Vec<Strategy>,
    paging: Paging,
}

impl StrategyRegistry {
    /// Keeps the first strategy per id and orders by priority.
    pub fn new(strategies: Vec<Strategy>, paging: Paging) -> Self {
        let mut ordered: Vec<Strategy> = Vec::with_capacity(strategies.len());
        for strategy in strategies {
            if !ordered.iter().any(|existing| existing.id() == strategy.id()) {
                ordered.push(strategy);
            }
        }
        ordered.sort_by_key(Strategy::id);
        Self {
            strategies: ordered,
            paging,
        }
    }

    /// Every enabled strategy in the configuration.
    pub fn from_config(config: &StrategiesConfig) -> Self {
        let mut strategies = Vec::new();
        if config.high_yield_stocks.enabled {
            strategies.push(Strategy::HighYieldStocks(config.high_yield_stocks.clone()));
        }
        if config.dividend_aristocrats.enabled {
            strategies.push(Strategy::DividendAristocrats(
                config.dividend_aristocrats.clone(),
            ));
        }
        if config.sector_leaders.enabled {
            strategies.push(Strategy::SectorLeaders(config.sector_leaders.clone()));
        }
        if config.consistent_payers.enabled {
            strategies.push(Strategy::ConsistentPayers(config.consistent_payers.clone()));
        }
        if config.etf_families.enabled {
            strategies.push(Strategy::EtfFamilies(config.etf_families.clone()));
        }
        if config.new_etf_launches.enabled {
            strategies.push(Strategy::NewEtfLaunches(config.new_etf_launches.clone()));
        }
        if config.dividend_etfs.enabled {
            strategies.push(Strategy::DividendEtfs(config.dividend_etfs.clone()));
        }
        if config.international_markets.enabled {
            strategies.push(Strategy::InternationalMarkets(
                config.international_markets.clone(),
            ));
        }
        Self::new(strategies, config.paging)
    }

    /// Narrow to `ids`; the remaining strategies are untouched.
    pub fn only(&self, ids: &[StrategyId]) -> Self {
        Self {
            strategies: self
                .strategies
                .iter()
                .filter(|strategy| ids.contains(&strategy.id()))
                .cloned()
                .collect(),
            paging: self.paging,
        }
    }

    pub fn with(mut self, strategy: Strategy) -> Self {
        self.strategies.retain(|existing| existing.id() != strategy.id());
        self.strategies.push(strategy);
        self.strategies.sort_by_key(Strategy::id);
        self
    }

    pub fn without(mut self, id: StrategyId) -> Self {
        self.strategies.retain(|strategy| strategy.id() != id);
        self
    }

    pub fn get(&self, id: StrategyId) -> Option<&Strategy> {
        self.strategies.iter().find(|strategy| strategy.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Strategy> {
        self.strategies.iter()
    }

    pub fn ids(&self) -> Vec<StrategyId> {
        self.strategies.iter().map(Strategy::id).collect()
    }

    pub const fn paging(&self) -> Paging {
        self.paging
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}
