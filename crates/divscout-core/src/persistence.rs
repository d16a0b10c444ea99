//! Storage collaborators: symbol upserts, run reports and the durable
//! exclusion list, with DuckDB-backed implementations on [`Warehouse`].

use std::collections::BTreeMap;
use std::sync::Mutex;

use divscout_warehouse::{ExclusionRow, RunRow, SymbolRow, Warehouse, WarehouseError};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::exclusion::{ExclusionError, ExclusionStore};
use crate::orchestrator::DiscoveryRun;
use crate::{BoxFuture, DiscoveredSymbol, ExclusionRecord, Symbol, UtcDateTime};

#[derive(Debug, Error)]
pub enum PersistError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(String),
}

/// Run identity stamped onto every upserted symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStamp {
    pub run_id: Uuid,
    pub seen_at: UtcDateTime,
}

/// Outcome of handing a finalized run to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishReport {
    pub upserted: usize,
    pub failed: usize,
    pub run_reported: bool,
}

/// Upsert contract for the discovered symbol universe.
pub trait SymbolSink: Send + Sync {
    fn upsert<'a>(
        &'a self,
        symbol: &'a DiscoveredSymbol,
        stamp: RunStamp,
    ) -> BoxFuture<'a, Result<(), PersistError>>;
}

/// Receives each finalized run summary.
pub trait RunReporter: Send + Sync {
    fn report<'a>(&'a self, run: &'a DiscoveryRun) -> BoxFuture<'a, Result<(), PersistError>>;
}

/// Keeps the latest upsert per ticker in memory.
#[derive(Debug, Default)]
pub struct MemorySymbolSink {
    symbols: Mutex<BTreeMap<Symbol, (DiscoveredSymbol, RunStamp)>>,
}

impl MemorySymbolSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn symbols(&self) -> Vec<DiscoveredSymbol> {
        self.symbols
            .lock()
            .expect("symbol sink poisoned")
            .values()
            .map(|(symbol, _)| symbol.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.symbols.lock().expect("symbol sink poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SymbolSink for MemorySymbolSink {
    fn upsert<'a>(
        &'a self,
        symbol: &'a DiscoveredSymbol,
        stamp: RunStamp,
    ) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            self.symbols
                .lock()
                .expect("symbol sink poisoned")
                .insert(symbol.ticker.clone(), (symbol.clone(), stamp));
            Ok(())
        })
    }
}

/// Emits the run summary as one structured log line.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogRunReporter;

impl RunReporter for LogRunReporter {
    fn report<'a>(&'a self, run: &'a DiscoveryRun) -> BoxFuture<'a, Result<(), PersistError>> {
        Box::pin(async move {
            let summary = serde_json::to_string(run)?;
            info!(run_id = %run.run_id, summary = %summary, "discovery run summary");
            Ok(())
        })
    }
}

async fn blocking<T, F>(task: F) -> Result<T, PersistError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, WarehouseError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|error| PersistError::Task(error.to_string()))?
        .map_err(PersistError::from)
}

fn exclusion_from_row(row: ExclusionRow) -> Result<ExclusionRecord, ExclusionError> {
    let symbol = Symbol::parse(&row.symbol)
        .map_err(|error| ExclusionError::Store(format!("stored symbol '{}': {error}", row.symbol)))?;
    let excluded_at = UtcDateTime::from_unix_micros(row.excluded_at_us)
        .map_err(|error| ExclusionError::Store(error.to_string()))?;
    let updated_at = UtcDateTime::from_unix_micros(row.updated_at_us)
        .map_err(|error| ExclusionError::Store(error.to_string()))?;

    Ok(ExclusionRecord {
        symbol,
        reason: row.reason.unwrap_or_default(),
        source: row.source.unwrap_or_default(),
        excluded_at,
        updated_at,
        validation_attempts: u32::try_from(row.validation_attempts).unwrap_or(u32::MAX),
    })
}

fn store_error(error: PersistError) -> ExclusionError {
    ExclusionError::Store(error.to_string())
}

impl ExclusionStore for Warehouse {
    fn record_failure<'a>(
        &'a self,
        symbol: &'a Symbol,
        reason: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExclusionRecord, ExclusionError>> {
        let warehouse = self.clone();
        let ticker = symbol.as_str().to_owned();
        let reason = reason.to_owned();
        let source = source.to_owned();
        Box::pin(async move {
            let at_us = UtcDateTime::now().unix_micros();
            let row = blocking(move || warehouse.record_exclusion(&ticker, &reason, &source, at_us))
                .await
                .map_err(store_error)?;
            exclusion_from_row(row)
        })
    }

    fn is_excluded<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, Result<bool, ExclusionError>> {
        let warehouse = self.clone();
        let ticker = symbol.as_str().to_owned();
        Box::pin(async move {
            blocking(move || warehouse.is_excluded(&ticker))
                .await
                .map_err(store_error)
        })
    }

    fn lookup<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Option<ExclusionRecord>, ExclusionError>> {
        let warehouse = self.clone();
        let ticker = symbol.as_str().to_owned();
        Box::pin(async move {
            let row = blocking(move || warehouse.exclusion(&ticker))
                .await
                .map_err(store_error)?;
            row.map(exclusion_from_row).transpose()
        })
    }
}

pub fn symbol_row(symbol: &DiscoveredSymbol, stamp: RunStamp) -> SymbolRow {
    let seen_at_us = stamp.seen_at.unix_micros();
    let attributes = &symbol.attributes;
    SymbolRow {
        ticker: symbol.ticker.as_str().to_owned(),
        instrument_type: symbol.instrument_type.as_str().to_owned(),
        discovery_methods: symbol
            .discovery_methods
            .iter()
            .map(|method| method.as_str().to_owned())
            .collect(),
        name: attributes.name.clone(),
        price: attributes.price,
        dividend_yield: attributes.dividend_yield,
        market_cap: attributes.market_cap,
        sector: attributes.sector.clone(),
        exchange: attributes.exchange.clone(),
        listing_date: attributes.listing_date.map(|date| date.to_string()),
        first_seen_at_us: seen_at_us,
        last_seen_at_us: seen_at_us,
        last_run_id: stamp.run_id.to_string(),
    }
}

impl SymbolSink for Warehouse {
    fn upsert<'a>(
        &'a self,
        symbol: &'a DiscoveredSymbol,
        stamp: RunStamp,
    ) -> BoxFuture<'a, Result<(), PersistError>> {
        let warehouse = self.clone();
        let row = symbol_row(symbol, stamp);
        Box::pin(async move { blocking(move || warehouse.upsert_symbol(&row)).await })
    }
}

impl RunReporter for Warehouse {
    fn report<'a>(&'a self, run: &'a DiscoveryRun) -> BoxFuture<'a, Result<(), PersistError>> {
        let warehouse = self.clone();
        Box::pin(async move {
            let row = RunRow {
                run_id: run.run_id.to_string(),
                started_at_us: run.started_at.unix_micros(),
                finished_at_us: run.finished_at.unix_micros(),
                status: run.status.as_str().to_owned(),
                total_unique: i64::try_from(run.total_unique).unwrap_or(i64::MAX),
                excluded_count: i64::try_from(run.excluded_count).unwrap_or(i64::MAX),
                elapsed_ms: i64::try_from(run.elapsed_ms).unwrap_or(i64::MAX),
                summary: serde_json::to_value(run)?,
            };
            blocking(move || warehouse.record_run(&row)).await
        })
    }
}
