use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use time::Date;

use crate::strategies::StrategyId;
use crate::{Symbol, UtcDateTime};

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

/// Instrument class of a discovered symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstrumentType {
    Stock,
    Etf,
    Trust,
}

impl InstrumentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stock => "stock",
            Self::Etf => "etf",
            Self::Trust => "trust",
        }
    }

    /// Higher is more specific; merges keep the more specific class.
    pub const fn specificity(self) -> u8 {
        match self {
            Self::Stock => 0,
            Self::Trust => 1,
            Self::Etf => 2,
        }
    }

    /// Classify a provider row.
    pub fn classify(is_etf: bool, is_fund: bool, name: Option<&str>) -> Self {
        if is_etf {
            return Self::Etf;
        }
        let trust_name = name
            .map(|name| name.trim().to_ascii_lowercase().ends_with("trust"))
            .unwrap_or(false);
        if is_fund || trust_name {
            Self::Trust
        } else {
            Self::Stock
        }
    }
}

/// Best-known snapshot of a symbol. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolAttributes {
    pub name: Option<String>,
    pub price: Option<f64>,
    /// Percent, e.g. `4.2` for 4.2%.
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    #[serde(default, with = "iso_date::option")]
    pub listing_date: Option<Date>,
}

/// One raw record produced by one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: Symbol,
    pub instrument_type: InstrumentType,
    pub attributes: SymbolAttributes,
    pub strategy: StrategyId,
}

impl Candidate {
    pub fn new(symbol: Symbol, instrument_type: InstrumentType, strategy: StrategyId) -> Self {
        Self {
            symbol,
            instrument_type,
            attributes: SymbolAttributes::default(),
            strategy,
        }
    }

    pub fn with_attributes(mut self, attributes: SymbolAttributes) -> Self {
        self.attributes = attributes;
        self
    }
}

/// Merged, provenance-tagged output record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveredSymbol {
    pub ticker: Symbol,
    pub instrument_type: InstrumentType,
    /// Never empty.
    pub discovery_methods: BTreeSet<StrategyId>,
    pub attributes: SymbolAttributes,
}

/// Persisted state for a ticker that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExclusionRecord {
    pub symbol: Symbol,
    pub reason: String,
    pub source: String,
    pub excluded_at: UtcDateTime,
    pub updated_at: UtcDateTime,
    pub validation_attempts: u32,
}
