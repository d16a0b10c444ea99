use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;
use tracing::debug;

use super::{StrategyContext, StrategyError, StrategyId};
use crate::provider::{decode_rows, etf_list_query, ListingRow};
use crate::{Candidate, InstrumentType};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtfFamiliesCriteria {
    pub enabled: bool,
    /// Fund-family fragments, matched against names (substring) and tickers (prefix).
    pub families: Vec<String>,
}

impl Default for EtfFamiliesCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            families: [
                "Vanguard",
                "iShares",
                "SPDR",
                "Schwab",
                "Invesco",
                "Global X",
                "WisdomTree",
                "First Trust",
                "JPMorgan",
                "Amplify",
            ]
            .into_iter()
            .map(str::to_owned)
            .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewEtfLaunchesCriteria {
    pub enabled: bool,
    pub window_days: i64,
}

impl Default for NewEtfLaunchesCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            window_days: 180,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DividendEtfsCriteria {
    pub enabled: bool,
    pub keywords: Vec<String>,
}

impl Default for DividendEtfsCriteria {
    fn default() -> Self {
        Self {
            enabled: true,
            keywords: ["dividend", "income", "yield", "distribution", "aristocrat", "payout"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
        }
    }
}

/// Case-insensitive: `fragment` is a substring of `name` or a prefix of `ticker`.
pub fn matches_family(ticker: &str, name: Option<&str>, fragment: &str) -> bool {
    let fragment = fragment.trim();
    if fragment.is_empty() {
        return false;
    }
    let lowered = fragment.to_lowercase();
    let in_name = name
        .map(|name| name.to_lowercase().contains(&lowered))
        .unwrap_or(false);
    in_name || ticker.to_uppercase().starts_with(&fragment.to_uppercase())
}

/// Case-insensitive substring match of any keyword against `name`.
pub fn matches_keyword(name: &str, keywords: &[String]) -> bool {
    let name = name.to_lowercase();
    keywords
        .iter()
        .map(|keyword| keyword.trim().to_lowercase())
        .any(|keyword| !keyword.is_empty() && name.contains(&keyword))
}

/// `0 <= today - listed <= window_days`, both edges inclusive.
pub fn within_launch_window(listed: Date, today: Date, window_days: i64) -> bool {
    let age = (today - listed).whole_days();
    (0..=window_days).contains(&age)
}

/// The ETF universe, fetched once per run and shared by every ETF strategy.
async fn etf_universe(ctx: &StrategyContext<'_>) -> Result<Vec<ListingRow>, StrategyError> {
    let query = etf_list_query();
    let body = ctx
        .fetcher
        .fetch_pages_shared(&query, ctx.paging.page_size, ctx.paging.max_pages)
        .await?;

    match body.as_ref() {
        Value::Array(rows) => Ok(decode_rows(rows)),
        _ => Err(StrategyError::Decode {
            query: query.describe(),
            message: String::from("expected an array of ETF rows"),
        }),
    }
}

fn select(
    rows: &[ListingRow],
    strategy: StrategyId,
    keep: impl Fn(&ListingRow, &str) -> bool,
) -> Vec<Candidate> {
    let candidates: Vec<Candidate> = rows
        .iter()
        .filter_map(|row| {
            let symbol = row.symbol()?;
            keep(row, symbol.as_str()).then(|| {
                Candidate::new(symbol, InstrumentType::Etf, strategy)
                    .with_attributes(row.attributes())
            })
        })
        .collect();

    debug!(
        strategy = strategy.as_str(),
        universe = rows.len(),
        kept = candidates.len(),
        "ETF universe filtered"
    );
    candidates
}

pub(super) async fn families(
    ctx: &StrategyContext<'_>,
    criteria: &EtfFamiliesCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let rows = etf_universe(ctx).await?;
    Ok(select(&rows, StrategyId::EtfFamilies, |row, ticker| {
        criteria
            .families
            .iter()
            .any(|fragment| matches_family(ticker, row.display_name(), fragment))
    }))
}

pub(super) async fn new_launches(
    ctx: &StrategyContext<'_>,
    criteria: &NewEtfLaunchesCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let rows = etf_universe(ctx).await?;
    let today = ctx.today;
    Ok(select(&rows, StrategyId::NewEtfLaunches, |row, _| {
        row.listing_date()
            .map(|listed| within_launch_window(listed, today, criteria.window_days))
            .unwrap_or(false)
    }))
}

pub(super) async fn dividend_focused(
    ctx: &StrategyContext<'_>,
    criteria: &DividendEtfsCriteria,
) -> Result<Vec<Candidate>, StrategyError> {
    let rows = etf_universe(ctx).await?;
    Ok(select(&rows, StrategyId::DividendEtfs, |row, _| {
        row.display_name()
            .map(|name| matches_keyword(name, &criteria.keywords))
            .unwrap_or(false)
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn family_matches_name_substring_or_ticker_prefix() {
        assert!(matches_family("VYM", Some("Vanguard High Dividend Yield ETF"), "vanguard"));
        assert!(matches_family("SPYD", None, "spy"));
        assert!(!matches_family("XSPY", Some("Other Fund"), "SPY"));
        assert!(!matches_family("VYM", Some("Vanguard"), "  "));
    }

    #[test]
    fn keyword_match_is_case_insensitive() {
        let keywords = vec![String::from("Dividend"), String::from("income")];
        assert!(matches_keyword("Schwab US DIVIDEND Equity ETF", &keywords));
        assert!(matches_keyword("JPMorgan Equity Premium Income ETF", &keywords));
        assert!(!matches_keyword("Invesco QQQ Trust", &keywords));
    }

    #[test]
    fn launch_window_edges_are_inclusive() {
        let today = date!(2025 - 07 - 01);
        assert!(within_launch_window(today, today, 180));
        assert!(within_launch_window(date!(2025 - 01 - 02), today, 180));
        assert!(!within_launch_window(date!(2025 - 01 - 01), today, 180));
        assert!(!within_launch_window(date!(2025 - 07 - 02), today, 180));
    }
}
