use std::collections::{BTreeMap, BTreeSet};

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use time::Date;
use tracing::{debug, warn};

use super::{StrategyContext, StrategyError, StrategyId};
use crate::provider::{
    decode_rows, dividend_history_query, DividendHistory, ListingRow, ScreenerFilter,
};
use crate::{Candidate, Symbol};

/// Behavioral discovery: classify by payment calendar, not by label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistentPayersCriteria {
    pub enabled: bool,
    pub min_payments_per_year: u32,
    pub min_consecutive_years: u32,
    pub min_market_cap: f64,
    /// Largest screener pool whose history is inspected.
    pub pool_size: usize,
    /// History lookups in flight at once from this strategy.
    pub history_concurrency: usize,
}

impl Default for ConsistentPayersCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            min_payments_per_year: 4,
            min_consecutive_years: 4,
            min_market_cap: 1.0e9,
            pool_size: 200,
            history_concurrency: 8,
        }
    }
}

/// Consecutive complete calendar years, ending with the year before `today`,
/// in which at least `min_payments_per_year` distinct payment dates fall.
pub fn consistent_payment_streak(
    payments: impl IntoIterator<Item = Date>,
    today: Date,
    min_payments_per_year: u32,
) -> u32 {
    let last_complete_year = today.year() - 1;
    let minimum = min_payments_per_year.max(1);

    let distinct: BTreeSet<Date> = payments
        .into_iter()
        .filter(|date| date.year() <= last_complete_year)
        .collect();
    let mut per_year: BTreeMap<i32, u32> = BTreeMap::new();
    for date in distinct {
        *per_year.entry(date.year()).or_default() += 1;
    }

    let mut streak = 0;
    let mut year = last_complete_year;
    while per_year.get(&year).copied().unwrap_or(0) >= minimum {
        streak += 1;
        year -= 1;
    }
    streak
}

fn qualifies(history: &DividendHistory, today: Date, criteria: &ConsistentPayersCriteria) -> bool {
    let payments = history.historical.iter().filter_map(|event| event.paid_on());
    consistent_payment_streak(payments, today, criteria.min_payments_per_year)
        >= criteria.min_consecutive_years
}

pub(super) async fn consistent_payers(
    ctx: &StrategyContext<'_>,
    criteria: &ConsistentPayersCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let filter = ScreenerFilter {
        dividend_yield_more_than: Some(0.0),
        market_cap_more_than: Some(criteria.min_market_cap),
        is_etf: Some(false),
        ..ScreenerFilter::default()
    };
    let rows = ctx
        .fetcher
        .fetch_pages(&filter.query(), ctx.paging.page_size, ctx.paging.max_pages)
        .await?;

    let mut pool: Vec<(Symbol, ListingRow)> = decode_rows::<ListingRow>(&rows)
        .into_iter()
        .filter(|row| !row.is_etf() && row.yield_percent().map(|value| value > 0.0).unwrap_or(false))
        .filter_map(|row| row.symbol().map(|symbol| (symbol, row)))
        .collect();
    pool.sort_by(|(left_symbol, left), (right_symbol, right)| {
        right
            .market_cap
            .unwrap_or(0.0)
            .total_cmp(&left.market_cap.unwrap_or(0.0))
            .then_with(|| left_symbol.cmp(right_symbol))
    });
    pool.dedup_by(|(left, _), (right, _)| left == right);
    pool.truncate(criteria.pool_size);
    let pool_len = pool.len();

    let lookups = stream::iter(pool)
        .map(|(symbol, row)| async move {
            let query = dividend_history_query(&symbol);
            let outcome = ctx.fetcher.fetch(&query).await;
            (symbol, row, query, outcome)
        })
        .buffer_unordered(criteria.history_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut candidates = Vec::new();
    for (symbol, row, query, outcome) in lookups {
        let body = match outcome {
            Ok(body) => body,
            Err(error) if error.is_deadline() || error.is_unauthorized() => {
                return Err(error.into());
            }
            Err(error) => {
                warn!(
                    strategy = StrategyId::ConsistentPayers.as_str(),
                    symbol = %symbol,
                    error = %error,
                    "skipping symbol with unavailable dividend history"
                );
                continue;
            }
        };

        let history = match DividendHistory::deserialize(&body) {
            Ok(history) => history,
            Err(error) => {
                warn!(query = %query, %error, "skipping undecodable dividend history");
                continue;
            }
        };

        if qualifies(&history, ctx.today, criteria) {
            candidates.push(
                Candidate::new(symbol, row.instrument_type(), StrategyId::ConsistentPayers)
                    .with_attributes(row.attributes()),
            );
        }
    }

    debug!(
        strategy = StrategyId::ConsistentPayers.as_str(),
        pool = pool_len,
        kept = candidates.len(),
        "payment-calendar screen finished"
    );
    Ok(candidates)
}
