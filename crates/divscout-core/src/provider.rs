//! Provider wire shapes and query builders.
//!
//! The provider speaks Financial-Modeling-Prep-style JSON. Every field is
//! optional on the wire; rows without a usable symbol are dropped.

use serde::Deserialize;
use serde_json::Value;
use time::macros::format_description;
use time::Date;
use tracing::debug;

use crate::fetcher::ProviderQuery;
use crate::{InstrumentType, Symbol, SymbolAttributes};

pub const SCREENER_ENDPOINT: &str = "stock-screener";
pub const ETF_LIST_ENDPOINT: &str = "etf/list";

/// Screener filters. Unset filters are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScreenerFilter {
    pub dividend_yield_more_than: Option<f64>,
    pub market_cap_more_than: Option<f64>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    pub is_etf: Option<bool>,
}

impl ScreenerFilter {
    pub fn query(&self) -> ProviderQuery {
        let mut query = ProviderQuery::new(SCREENER_ENDPOINT);
        if let Some(value) = self.dividend_yield_more_than {
            query = query.with_param("dividendYieldMoreThan", value);
        }
        if let Some(value) = self.market_cap_more_than {
            query = query.with_param("marketCapMoreThan", format!("{value:.0}"));
        }
        if let Some(value) = &self.sector {
            query = query.with_param("sector", value);
        }
        if let Some(value) = &self.exchange {
            query = query.with_param("exchange", value);
        }
        if let Some(value) = self.is_etf {
            query = query.with_param("isEtf", value);
        }
        query.with_param("isActivelyTrading", true)
    }
}

pub fn etf_list_query() -> ProviderQuery {
    ProviderQuery::new(ETF_LIST_ENDPOINT)
}

pub fn dividend_history_query(symbol: &Symbol) -> ProviderQuery {
    ProviderQuery::new(format!(
        "historical-price-full/stock_dividend/{}",
        urlencoding::encode(symbol.as_str())
    ))
}

pub fn quote_query(symbol: &Symbol) -> ProviderQuery {
    ProviderQuery::new(format!("quote-short/{}", urlencoding::encode(symbol.as_str())))
}

/// One screener or ETF-list row.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ListingRow {
    pub symbol: Option<String>,
    pub company_name: Option<String>,
    pub name: Option<String>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    pub exchange_short_name: Option<String>,
    pub price: Option<f64>,
    pub last_annual_dividend: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub is_etf: Option<bool>,
    pub is_fund: Option<bool>,
    pub inception_date: Option<String>,
    pub ipo_date: Option<String>,
    #[serde(rename = "type")]
    pub asset_type: Option<String>,
}

impl ListingRow {
    pub fn symbol(&self) -> Option<Symbol> {
        self.symbol.as_deref().and_then(|raw| Symbol::parse(raw).ok())
    }

    pub fn display_name(&self) -> Option<&str> {
        self.company_name
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }

    /// Yield in percent, derived from the trailing dividend when not reported.
    pub fn yield_percent(&self) -> Option<f64> {
        if let Some(reported) = self.dividend_yield.filter(|value| value.is_finite()) {
            return Some(reported);
        }
        match (self.last_annual_dividend, self.price) {
            (Some(dividend), Some(price)) if price > 0.0 && dividend.is_finite() => {
                Some(dividend / price * 100.0)
            }
            _ => None,
        }
    }

    pub fn is_etf(&self) -> bool {
        self.is_etf.unwrap_or(false)
            || self
                .asset_type
                .as_deref()
                .map(|kind| kind.eq_ignore_ascii_case("etf"))
                .unwrap_or(false)
    }

    pub fn instrument_type(&self) -> InstrumentType {
        InstrumentType::classify(
            self.is_etf(),
            self.is_fund.unwrap_or(false),
            self.display_name(),
        )
    }

    pub fn listing_date(&self) -> Option<Date> {
        self.inception_date
            .as_deref()
            .or(self.ipo_date.as_deref())
            .and_then(parse_provider_date)
    }

    pub fn attributes(&self) -> SymbolAttributes {
        SymbolAttributes {
            name: self.display_name().map(str::to_owned),
            price: self.price.filter(|price| price.is_finite()),
            dividend_yield: self.yield_percent(),
            market_cap: self.market_cap.filter(|cap| cap.is_finite()),
            sector: self.sector.clone().filter(|sector| !sector.is_empty()),
            exchange: self
                .exchange_short_name
                .clone()
                .or_else(|| self.exchange.clone())
                .filter(|exchange| !exchange.is_empty()),
            listing_date: self.listing_date(),
        }
    }
}

/// One dividend event.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DividendEvent {
    pub date: Option<String>,
    pub payment_date: Option<String>,
    pub dividend: Option<f64>,
}

impl DividendEvent {
    /// Payment date when known, otherwise the ex-date.
    pub fn paid_on(&self) -> Option<Date> {
        self.payment_date
            .as_deref()
            .and_then(parse_provider_date)
            .or_else(|| self.date.as_deref().and_then(parse_provider_date))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct DividendHistory {
    pub symbol: Option<String>,
    pub historical: Vec<DividendEvent>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct QuoteRow {
    pub symbol: Option<String>,
    pub price: Option<f64>,
    pub volume: Option<f64>,
}

/// Accepts `YYYY-MM-DD`, optionally followed by a time part.
pub fn parse_provider_date(raw: &str) -> Option<Date> {
    let day = raw.trim().get(..10)?;
    Date::parse(day, format_description!("[year]-[month]-[day]")).ok()
}

/// Decode an array of rows, skipping the ones that do not fit `T`.
pub fn decode_rows<T>(rows: &[Value]) -> Vec<T>
where
    T: for<'de> Deserialize<'de>,
{
    rows.iter()
        .filter_map(|row| match T::deserialize(row) {
            Ok(decoded) => Some(decoded),
            Err(error) => {
                debug!(%error, "skipping undecodable provider row");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::date;

    #[test]
    fn yield_falls_back_to_trailing_dividend() {
        let row: ListingRow = serde_json::from_value(json!({
            "symbol": "O",
            "companyName": "Realty Income Corporation",
            "price": 50.0,
            "lastAnnualDividend": 3.0
        }))
        .expect("row");

        assert_eq!(row.yield_percent(), Some(6.0));
    }

    #[test]
    fn reported_yield_wins_over_derived() {
        let row = ListingRow {
            dividend_yield: Some(4.5),
            last_annual_dividend: Some(3.0),
            price: Some(50.0),
            ..ListingRow::default()
        };
        assert_eq!(row.yield_percent(), Some(4.5));
    }

    #[test]
    fn etf_list_rows_classify_as_etf() {
        let row: ListingRow = serde_json::from_value(json!({
            "symbol": "SCHD",
            "name": "Schwab US Dividend Equity ETF",
            "exchangeShortName": "AMEX",
            "type": "etf",
            "inceptionDate": "2011-10-20"
        }))
        .expect("row");

        assert_eq!(row.instrument_type(), InstrumentType::Etf);
        let attributes = row.attributes();
        assert_eq!(attributes.exchange.as_deref(), Some("AMEX"));
        assert_eq!(attributes.listing_date, Some(date!(2011 - 10 - 20)));
    }

    #[test]
    fn payment_date_preferred_over_ex_date() {
        let event = DividendEvent {
            date: Some(String::from("2023-12-28")),
            payment_date: Some(String::from("2024-01-15")),
            dividend: Some(0.25),
        };
        assert_eq!(event.paid_on(), Some(date!(2024 - 01 - 15)));

        let ex_only = DividendEvent {
            payment_date: Some(String::new()),
            ..event
        };
        assert_eq!(ex_only.paid_on(), Some(date!(2023 - 12 - 28)));
    }

    #[test]
    fn screener_query_sends_only_set_filters() {
        let query = ScreenerFilter {
            dividend_yield_more_than: Some(4.0),
            market_cap_more_than: Some(1.0e9),
            ..ScreenerFilter::default()
        }
        .query();

        assert_eq!(
            query.describe(),
            "stock-screener?dividendYieldMoreThan=4&marketCapMoreThan=1000000000&isActivelyTrading=true"
        );
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let rows = vec![json!({"symbol": "O"}), json!("not a row"), json!({"symbol": 5})];
        let decoded: Vec<ListingRow> = decode_rows(&rows);
        assert_eq!(decoded.len(), 1);
    }
}
