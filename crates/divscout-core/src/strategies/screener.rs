use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{StrategyContext, StrategyError, StrategyId};
use crate::provider::{decode_rows, ListingRow, ScreenerFilter};
use crate::Candidate;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HighYieldCriteria {
    pub enabled: bool,
    /// Percent.
    pub min_yield: f64,
    pub min_market_cap: f64,
}

impl Default for HighYieldCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            min_yield: 4.0,
            min_market_cap: 1.0e9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AristocratsCriteria {
    pub enabled: bool,
    pub min_market_cap: f64,
    pub min_yield: f64,
}

impl Default for AristocratsCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            min_market_cap: 1.0e10,
            min_yield: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorThreshold {
    pub sector: String,
    pub min_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectorLeadersCriteria {
    pub enabled: bool,
    pub min_market_cap: f64,
    pub sectors: Vec<SectorThreshold>,
}

impl Default for SectorLeadersCriteria {
    fn default() -> Self {
        let sectors = [
            ("Utilities", 3.0),
            ("Real Estate", 3.5),
            ("Energy", 3.5),
            ("Financial Services", 3.0),
            ("Consumer Defensive", 2.5),
            ("Communication Services", 3.0),
            ("Basic Materials", 3.0),
            ("Healthcare", 2.0),
            ("Industrials", 2.0),
            ("Technology", 1.5),
        ];
        Self {
            enabled: true,
            min_market_cap: 1.0e9,
            sectors: sectors
                .into_iter()
                .map(|(sector, min_yield)| SectorThreshold {
                    sector: sector.to_owned(),
                    min_yield,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExchangeThreshold {
    pub exchange: String,
    pub min_yield: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InternationalCriteria {
    pub enabled: bool,
    pub min_market_cap: f64,
    pub exchanges: Vec<ExchangeThreshold>,
}

impl Default for InternationalCriteria {
    fn default() -> Self {
        let exchanges = [
            ("TSX", 4.0),
            ("LSE", 4.0),
            ("ASX", 4.0),
            ("EURONEXT", 3.5),
            ("XETRA", 3.0),
            ("HKSE", 4.0),
        ];
        Self {
            enabled: true,
            min_market_cap: 5.0e8,
            exchanges: exchanges
                .into_iter()
                .map(|(exchange, min_yield)| ExchangeThreshold {
                    exchange: exchange.to_owned(),
                    min_yield,
                })
                .collect(),
        }
    }
}

/// Whether a row clears both numeric floors. Missing values never pass.
fn clears(row: &ListingRow, min_yield: f64, min_market_cap: f64) -> bool {
    let yield_ok = row
        .yield_percent()
        .map(|value| value >= min_yield && value > 0.0)
        .unwrap_or(false);
    let cap_ok = row
        .market_cap
        .map(|cap| cap >= min_market_cap)
        .unwrap_or(false);
    yield_ok && cap_ok && !row.is_etf()
}

/// Run one screener walk and keep the rows that pass `accept` client-side.
pub(super) async fn screen(
    ctx: &StrategyContext<'_>,
    strategy: StrategyId,
    filter: ScreenerFilter,
    accept: impl Fn(&ListingRow) -> bool,
) -> Result<Vec<Candidate>, StrategyError> {
    let query = filter.query();
    let rows = ctx
        .fetcher
        .fetch_pages(&query, ctx.paging.page_size, ctx.paging.max_pages)
        .await?;
    let rows: Vec<ListingRow> = decode_rows(&rows);
    let fetched = rows.len();

    let candidates: Vec<Candidate> = rows
        .iter()
        .filter(|row| accept(*row))
        .filter_map(|row| {
            let symbol = row.symbol()?;
            let mut attributes = row.attributes();
            if attributes.sector.is_none() {
                attributes.sector = filter.sector.clone();
            }
            if attributes.exchange.is_none() {
                attributes.exchange = filter.exchange.clone();
            }
            Some(Candidate::new(symbol, row.instrument_type(), strategy).with_attributes(attributes))
        })
        .collect();

    debug!(
        strategy = strategy.as_str(),
        query = %query,
        fetched,
        kept = candidates.len(),
        "screener walk finished"
    );
    Ok(candidates)
}

pub(super) async fn high_yield(
    ctx: &StrategyContext<'_>,
    criteria: &HighYieldCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let filter = ScreenerFilter {
        dividend_yield_more_than: Some(criteria.min_yield),
        market_cap_more_than: Some(criteria.min_market_cap),
        is_etf: Some(false),
        ..ScreenerFilter::default()
    };
    screen(ctx, StrategyId::HighYieldStocks, filter, |row| {
        clears(row, criteria.min_yield, criteria.min_market_cap)
    })
    .await
}

pub(super) async fn aristocrats(
    ctx: &StrategyContext<'_>,
    criteria: &AristocratsCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let filter = ScreenerFilter {
        dividend_yield_more_than: Some(criteria.min_yield),
        market_cap_more_than: Some(criteria.min_market_cap),
        is_etf: Some(false),
        ..ScreenerFilter::default()
    };
    screen(ctx, StrategyId::DividendAristocrats, filter, |row| {
        clears(row, criteria.min_yield, criteria.min_market_cap)
    })
    .await
}

pub(super) async fn sector_leaders(
    ctx: &StrategyContext<'_>,
    criteria: &SectorLeadersCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let walks = criteria.sectors.iter().map(|threshold| {
        let filter = ScreenerFilter {
            dividend_yield_more_than: Some(threshold.min_yield),
            market_cap_more_than: Some(criteria.min_market_cap),
            sector: Some(threshold.sector.clone()),
            is_etf: Some(false),
            ..ScreenerFilter::default()
        };
        screen(ctx, StrategyId::SectorLeaders, filter, move |row| {
            clears(row, threshold.min_yield, criteria.min_market_cap)
        })
    });

    Ok(try_join_all(walks).await?.into_iter().flatten().collect())
}

pub(super) async fn international(
    ctx: &StrategyContext<'_>,
    criteria: &InternationalCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let walks = criteria.exchanges.iter().map(|threshold| {
        let filter = ScreenerFilter {
            dividend_yield_more_than: Some(threshold.min_yield),
            market_cap_more_than: Some(criteria.min_market_cap),
            exchange: Some(threshold.exchange.clone()),
            is_etf: Some(false),
            ..ScreenerFilter::default()
        };
        screen(ctx, StrategyId::InternationalMarkets, filter, move |row| {
            clears(row, threshold.min_yield, criteria.min_market_cap)
        })
    });

    Ok(try_join_all(walks).await?.into_iter().flatten().collect())
}
