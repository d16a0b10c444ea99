//! # Divscout Warehouse
//!
//! DuckDB-backed persistence for the dividend symbol discovery engine.
//!
//! ## Overview
//!
//! The warehouse owns three durable datasets:
//!
//! - the **exclusion list**: symbols that failed validation, with attempt counts
//! - the **symbol universe**: the deduplicated discovery output, upserted by ticker
//! - the **run log**: one JSON summary per finalized discovery run
//!
//! All values are bound as query parameters; nothing user- or provider-supplied is
//! interpolated into SQL. Timestamps cross this API as Unix microseconds.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use divscout_warehouse::{Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let warehouse = Warehouse::open(WarehouseConfig::default())?;
//!     let record = warehouse.record_exclusion("ZZZZ", "no price data", "high_yield_stocks", 0)?;
//!     println!("{} excluded after {} attempt(s)", record.symbol, record.validation_attempts);
//!     Ok(())
//! }
//! ```
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `excluded_symbols` | Symbols that failed validation |
//! | `dividend_symbols` | Discovered symbol universe |
//! | `discovery_runs` | Finalized run summaries |
//! | `schema_migrations` | Applied migration versions |

pub mod duckdb;
pub mod migrations;
pub mod views;

use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::duckdb::{Connection, ToSql};
use serde::Serialize;
use thiserror::Error;

pub use duckdb::{ConnectionPool, Lease};

/// Width of the `excluded_symbols.symbol` column.
pub const MAX_SYMBOL_LEN: usize = 20;
/// Width of the `excluded_symbols.source` column.
pub const MAX_SOURCE_LEN: usize = 50;

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Serialization of a stored payload failed.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    /// The write was rejected before reaching the database.
    #[error("write rejected: {0}")]
    Rejected(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Maximum number of idle connections kept in the pool.
    pub max_pool_size: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            db_path: resolve_divscout_home().join("warehouse.duckdb"),
            max_pool_size: 4,
        }
    }
}

impl WarehouseConfig {
    pub fn at(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

/// Stored exclusion state for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExclusionRow {
    pub symbol: String,
    pub reason: Option<String>,
    pub source: Option<String>,
    /// First failure, Unix microseconds. Never changes once written.
    pub excluded_at_us: i64,
    /// Most recent failure, Unix microseconds.
    pub updated_at_us: i64,
    pub validation_attempts: i64,
}

/// One row of the discovered symbol universe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SymbolRow {
    pub ticker: String,
    pub instrument_type: String,
    pub discovery_methods: Vec<String>,
    pub name: Option<String>,
    pub price: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub market_cap: Option<f64>,
    pub sector: Option<String>,
    pub exchange: Option<String>,
    /// `YYYY-MM-DD`.
    pub listing_date: Option<String>,
    pub first_seen_at_us: i64,
    pub last_seen_at_us: i64,
    pub last_run_id: String,
}

/// One finalized discovery run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunRow {
    pub run_id: String,
    pub started_at_us: i64,
    pub finished_at_us: i64,
    pub status: String,
    pub total_unique: i64,
    pub excluded_count: i64,
    pub elapsed_ms: i64,
    pub summary: serde_json::Value,
}

/// Per-key mutual exclusion so read-modify-write cycles on one symbol never
/// interleave while different symbols proceed independently.
#[derive(Default)]
struct KeyedLocks {
    slots: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl KeyedLocks {
    fn slot(&self, key: &str) -> Arc<Mutex<()>> {
        let mut slots = self.slots.lock().expect("keyed lock table poisoned");
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }
}

/// The main warehouse interface.
#[derive(Clone)]
pub struct Warehouse {
    pool: ConnectionPool,
    locks: Arc<KeyedLocks>,
}

impl Warehouse {
    /// Open a warehouse with default configuration.
    pub fn open_default() -> Result<Self, WarehouseError> {
        Self::open(WarehouseConfig::default())
    }

    /// Open a warehouse, creating the file and applying migrations as needed.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let pool = ConnectionPool::open(config.db_path, config.max_pool_size)?;
        let warehouse = Self {
            pool,
            locks: Arc::new(KeyedLocks::default()),
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Apply migrations and (re)create views.
    pub fn initialize(&self) -> Result<(), WarehouseError> {
        let connection = self.pool.lease()?;
        migrations::apply_migrations(&connection)?;
        views::create_views(&connection)?;
        Ok(())
    }

    pub fn db_path(&self) -> &Path {
        self.pool.path()
    }

    /// Record one validation failure for `symbol`.
    ///
    /// The first failure inserts a row with `validation_attempts = 1`. Later
    /// failures increment the attempt count and refresh `reason` and
    /// `updated_at`; `excluded_at` and `source` keep their first values.
    pub fn record_exclusion(
        &self,
        symbol: &str,
        reason: &str,
        source: &str,
        at_us: i64,
    ) -> Result<ExclusionRow, WarehouseError> {
        if symbol.is_empty() || symbol.chars().count() > MAX_SYMBOL_LEN {
            return Err(WarehouseError::Rejected(format!(
                "symbol '{symbol}' must be 1..={MAX_SYMBOL_LEN} characters"
            )));
        }
        let source: String = source.chars().take(MAX_SOURCE_LEN).collect();

        let slot = self.locks.slot(symbol);
        let _guard = slot.lock().expect("exclusion key lock poisoned");

        let connection = self.pool.lease()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<ExclusionRow, WarehouseError> {
            let exists = fetch_exclusion(&connection, symbol)?.is_some();
            if exists {
                let params: [&dyn ToSql; 3] = [&reason, &at_us, &symbol];
                connection.execute(
                    "UPDATE excluded_symbols \
                     SET reason = ?, \
                         updated_at = make_timestamp(CAST(? AS BIGINT)), \
                         validation_attempts = validation_attempts + 1 \
                     WHERE symbol = ?",
                    params.as_slice(),
                )?;
            } else {
                let params: [&dyn ToSql; 5] = [&symbol, &reason, &at_us, &at_us, &source];
                connection.execute(
                    "INSERT INTO excluded_symbols \
                     (symbol, reason, excluded_at, updated_at, source, validation_attempts) \
                     VALUES (?, ?, make_timestamp(CAST(? AS BIGINT)), make_timestamp(CAST(? AS BIGINT)), ?, 1)",
                    params.as_slice(),
                )?;
            }

            fetch_exclusion(&connection, symbol)?.ok_or_else(|| {
                WarehouseError::Rejected(format!("exclusion for '{symbol}' vanished mid-transaction"))
            })
        })();

        finalize_transaction(&connection, result)
    }

    /// Look up the exclusion row for `symbol`, if any.
    pub fn exclusion(&self, symbol: &str) -> Result<Option<ExclusionRow>, WarehouseError> {
        let connection = self.pool.lease()?;
        fetch_exclusion(&connection, symbol)
    }

    pub fn is_excluded(&self, symbol: &str) -> Result<bool, WarehouseError> {
        Ok(self.exclusion(symbol)?.is_some())
    }

    /// Most recently touched exclusions first.
    pub fn list_exclusions(&self, limit: usize) -> Result<Vec<ExclusionRow>, WarehouseError> {
        let connection = self.pool.lease()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = connection.prepare(&format!(
            "{EXCLUSION_SELECT} FROM excluded_symbols ORDER BY updated_at DESC, symbol LIMIT ?"
        ))?;
        let mut rows = statement.query([limit])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            output.push(read_exclusion(row)?);
        }
        Ok(output)
    }

    /// Symbols that failed validation at least three times.
    pub fn repeat_exclusions(&self) -> Result<Vec<ExclusionRow>, WarehouseError> {
        let connection = self.pool.lease()?;
        let mut statement = connection.prepare(&format!(
            "{EXCLUSION_SELECT} FROM vw_repeat_exclusions ORDER BY validation_attempts DESC, symbol"
        ))?;
        let mut rows = statement.query([])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            output.push(read_exclusion(row)?);
        }
        Ok(output)
    }

    /// Insert or update one symbol of the discovered universe.
    ///
    /// `first_seen_at` is preserved across upserts; every other column takes
    /// the incoming value.
    pub fn upsert_symbol(&self, row: &SymbolRow) -> Result<(), WarehouseError> {
        if row.ticker.is_empty() || row.ticker.chars().count() > MAX_SYMBOL_LEN {
            return Err(WarehouseError::Rejected(format!(
                "ticker '{}' must be 1..={MAX_SYMBOL_LEN} characters",
                row.ticker
            )));
        }
        let methods = row.discovery_methods.join(",");

        let slot = self.locks.slot(&row.ticker);
        let _guard = slot.lock().expect("symbol key lock poisoned");

        let connection = self.pool.lease()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<(), WarehouseError> {
            let exists: i64 = connection.query_row(
                "SELECT COUNT(*) FROM dividend_symbols WHERE ticker = ?",
                [&row.ticker],
                |r| r.get(0),
            )?;

            if exists > 0 {
                let params: [&dyn ToSql; 12] = [
                    &row.instrument_type,
                    &methods,
                    &row.name,
                    &row.price,
                    &row.dividend_yield,
                    &row.market_cap,
                    &row.sector,
                    &row.exchange,
                    &row.listing_date,
                    &row.last_seen_at_us,
                    &row.last_run_id,
                    &row.ticker,
                ];
                connection.execute(
                    "UPDATE dividend_symbols SET \
                     instrument_type = ?, discovery_methods = ?, name = ?, price = ?, \
                     dividend_yield = ?, market_cap = ?, sector = ?, exchange = ?, \
                     listing_date = TRY_CAST(? AS DATE), \
                     last_seen_at = make_timestamp(CAST(? AS BIGINT)), last_run_id = ? \
                     WHERE ticker = ?",
                    params.as_slice(),
                )?;
            } else {
                let params: [&dyn ToSql; 13] = [
                    &row.ticker,
                    &row.instrument_type,
                    &methods,
                    &row.name,
                    &row.price,
                    &row.dividend_yield,
                    &row.market_cap,
                    &row.sector,
                    &row.exchange,
                    &row.listing_date,
                    &row.first_seen_at_us,
                    &row.last_seen_at_us,
                    &row.last_run_id,
                ];
                connection.execute(
                    "INSERT INTO dividend_symbols \
                     (ticker, instrument_type, discovery_methods, name, price, dividend_yield, \
                      market_cap, sector, exchange, listing_date, first_seen_at, last_seen_at, last_run_id) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, TRY_CAST(? AS DATE), \
                             make_timestamp(CAST(? AS BIGINT)), make_timestamp(CAST(? AS BIGINT)), ?)",
                    params.as_slice(),
                )?;
            }
            Ok(())
        })();

        finalize_transaction(&connection, result)
    }

    pub fn symbol(&self, ticker: &str) -> Result<Option<SymbolRow>, WarehouseError> {
        let connection = self.pool.lease()?;
        let mut statement = connection.prepare(
            "SELECT ticker, instrument_type, discovery_methods, name, price, dividend_yield, \
                    market_cap, sector, exchange, CAST(listing_date AS VARCHAR), \
                    epoch_us(first_seen_at), epoch_us(last_seen_at), last_run_id \
             FROM dividend_symbols WHERE ticker = ?",
        )?;
        let mut rows = statement.query([ticker])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };

        let methods: String = row.get(2)?;
        Ok(Some(SymbolRow {
            ticker: row.get(0)?,
            instrument_type: row.get(1)?,
            discovery_methods: split_methods(&methods),
            name: row.get(3)?,
            price: row.get(4)?,
            dividend_yield: row.get(5)?,
            market_cap: row.get(6)?,
            sector: row.get(7)?,
            exchange: row.get(8)?,
            listing_date: row.get(9)?,
            first_seen_at_us: row.get(10)?,
            last_seen_at_us: row.get(11)?,
            last_run_id: row.get(12)?,
        }))
    }

    pub fn symbol_count(&self) -> Result<i64, WarehouseError> {
        let connection = self.pool.lease()?;
        Ok(connection.query_row("SELECT COUNT(*) FROM dividend_symbols", [], |row| row.get(0))?)
    }

    /// Number of stored symbols per discovery method, by method name.
    pub fn method_coverage(&self) -> Result<Vec<(String, i64)>, WarehouseError> {
        let connection = self.pool.lease()?;
        let mut statement =
            connection.prepare("SELECT method, symbol_count FROM vw_method_coverage ORDER BY method")?;
        let mut rows = statement.query([])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            output.push((row.get(0)?, row.get(1)?));
        }
        Ok(output)
    }

    /// Store a finalized run summary. Re-recording the same run id replaces it.
    pub fn record_run(&self, run: &RunRow) -> Result<(), WarehouseError> {
        let summary = serde_json::to_string(&run.summary)?;
        let connection = self.pool.lease()?;
        let params: [&dyn ToSql; 8] = [
            &run.run_id,
            &run.started_at_us,
            &run.finished_at_us,
            &run.status,
            &run.total_unique,
            &run.excluded_count,
            &run.elapsed_ms,
            &summary,
        ];
        connection.execute(
            "INSERT OR REPLACE INTO discovery_runs \
             (run_id, started_at, finished_at, status, total_unique, excluded_count, elapsed_ms, summary) \
             VALUES (?, make_timestamp(CAST(? AS BIGINT)), make_timestamp(CAST(? AS BIGINT)), ?, ?, ?, ?, ?)",
            params.as_slice(),
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn recent_runs(&self, limit: usize) -> Result<Vec<RunRow>, WarehouseError> {
        let connection = self.pool.lease()?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let mut statement = connection.prepare(
            "SELECT run_id, epoch_us(started_at), epoch_us(finished_at), status, \
                    total_unique, excluded_count, elapsed_ms, summary \
             FROM discovery_runs ORDER BY started_at DESC LIMIT ?",
        )?;
        let mut rows = statement.query([limit])?;
        let mut output = Vec::new();
        while let Some(row) = rows.next()? {
            let summary: String = row.get(7)?;
            output.push(RunRow {
                run_id: row.get(0)?,
                started_at_us: row.get(1)?,
                finished_at_us: row.get(2)?,
                status: row.get(3)?,
                total_unique: row.get(4)?,
                excluded_count: row.get(5)?,
                elapsed_ms: row.get(6)?,
                summary: serde_json::from_str(&summary)?,
            });
        }
        Ok(output)
    }
}

const EXCLUSION_SELECT: &str = "SELECT symbol, reason, source, epoch_us(excluded_at), \
     epoch_us(updated_at), CAST(validation_attempts AS BIGINT)";

fn fetch_exclusion(
    connection: &Connection,
    symbol: &str,
) -> Result<Option<ExclusionRow>, WarehouseError> {
    let mut statement =
        connection.prepare(&format!("{EXCLUSION_SELECT} FROM excluded_symbols WHERE symbol = ?"))?;
    let mut rows = statement.query([symbol])?;
    match rows.next()? {
        Some(row) => Ok(Some(read_exclusion(row)?)),
        None => Ok(None),
    }
}

fn read_exclusion(row: &::duckdb::Row<'_>) -> Result<ExclusionRow, ::duckdb::Error> {
    Ok(ExclusionRow {
        symbol: row.get(0)?,
        reason: row.get(1)?,
        source: row.get(2)?,
        excluded_at_us: row.get(3)?,
        updated_at_us: row.get(4)?,
        validation_attempts: row.get(5)?,
    })
}

fn split_methods(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .filter(|method| !method.is_empty())
        .map(str::to_owned)
        .collect()
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            let _ = connection.execute_batch("ROLLBACK");
            Err(error)
        }
    }
}

/// Resolve the divscout home directory from environment or default.
pub fn resolve_divscout_home() -> PathBuf {
    if let Some(path) = env::var_os("DIVSCOUT_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".divscout");
    }

    PathBuf::from(".divscout")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, Warehouse) {
        let temp = tempdir().expect("tempdir");
        let warehouse = Warehouse::open(WarehouseConfig {
            db_path: temp.path().join("divscout").join("warehouse.duckdb"),
            max_pool_size: 2,
        })
        .expect("warehouse open");
        (temp, warehouse)
    }

    fn symbol_row(ticker: &str, methods: &[&str], seen_at_us: i64, run_id: &str) -> SymbolRow {
        SymbolRow {
            ticker: ticker.to_owned(),
            instrument_type: String::from("stock"),
            discovery_methods: methods.iter().map(|m| (*m).to_owned()).collect(),
            name: Some(format!("{ticker} Corp")),
            price: Some(42.5),
            dividend_yield: Some(4.2),
            market_cap: Some(2.0e9),
            sector: Some(String::from("Utilities")),
            exchange: Some(String::from("NYSE")),
            listing_date: Some(String::from("1999-03-01")),
            first_seen_at_us: seen_at_us,
            last_seen_at_us: seen_at_us,
            last_run_id: run_id.to_owned(),
        }
    }

    #[test]
    fn first_failure_creates_single_attempt_row() {
        let (_temp, warehouse) = open_temp();

        let row = warehouse
            .record_exclusion("ZZZZ", "no price data", "high_yield_stocks", 1_000_000)
            .expect("record");

        assert_eq!(row.symbol, "ZZZZ");
        assert_eq!(row.validation_attempts, 1);
        assert_eq!(row.excluded_at_us, 1_000_000);
        assert_eq!(row.updated_at_us, 1_000_000);
        assert_eq!(row.source.as_deref(), Some("high_yield_stocks"));
    }

    #[test]
    fn repeated_failure_increments_attempts_and_keeps_first_seen() {
        let (_temp, warehouse) = open_temp();

        warehouse
            .record_exclusion("ZZZZ", "no price data", "high_yield_stocks", 1_000_000)
            .expect("first");
        let row = warehouse
            .record_exclusion("ZZZZ", "delisted", "sector_leaders", 2_000_000)
            .expect("second");

        assert_eq!(row.validation_attempts, 2);
        assert_eq!(row.excluded_at_us, 1_000_000);
        assert_eq!(row.updated_at_us, 2_000_000);
        assert_eq!(row.reason.as_deref(), Some("delisted"));
        assert_eq!(row.source.as_deref(), Some("high_yield_stocks"));
        assert_eq!(warehouse.list_exclusions(10).expect("list").len(), 1);
    }

    #[test]
    fn exclusion_rejects_oversized_symbol() {
        let (_temp, warehouse) = open_temp();
        let error = warehouse
            .record_exclusion("ABCDEFGHIJKLMNOPQRSTUVWXYZ", "bad", "test", 0)
            .expect_err("should reject");
        assert!(matches!(error, WarehouseError::Rejected(_)));
    }

    #[test]
    fn exclusion_values_are_bound_not_interpolated() {
        let (_temp, warehouse) = open_temp();
        let reason = r#"x'); DROP TABLE excluded_symbols; --"#;

        warehouse
            .record_exclusion("EVIL", reason, "test", 5)
            .expect("record");

        let row = warehouse.exclusion("EVIL").expect("lookup").expect("present");
        assert_eq!(row.reason.as_deref(), Some(reason));
    }

    #[test]
    fn repeat_exclusions_view_lists_three_strike_symbols() {
        let (_temp, warehouse) = open_temp();
        for attempt in 0..3 {
            warehouse
                .record_exclusion("FLAKY", "no price data", "dividend_etfs", attempt)
                .expect("record");
        }
        warehouse
            .record_exclusion("ONCE", "no price data", "dividend_etfs", 0)
            .expect("record");

        let repeats = warehouse.repeat_exclusions().expect("view");
        assert_eq!(repeats.len(), 1);
        assert_eq!(repeats[0].symbol, "FLAKY");
        assert_eq!(repeats[0].validation_attempts, 3);
    }

    #[test]
    fn symbol_upsert_preserves_first_seen() {
        let (_temp, warehouse) = open_temp();

        warehouse
            .upsert_symbol(&symbol_row("O", &["high_yield_stocks"], 10, "run-1"))
            .expect("first upsert");
        warehouse
            .upsert_symbol(&symbol_row(
                "O",
                &["high_yield_stocks", "consistent_payers"],
                20,
                "run-2",
            ))
            .expect("second upsert");

        let stored = warehouse.symbol("O").expect("lookup").expect("present");
        assert_eq!(stored.first_seen_at_us, 10);
        assert_eq!(stored.last_seen_at_us, 20);
        assert_eq!(stored.last_run_id, "run-2");
        assert_eq!(
            stored.discovery_methods,
            vec![String::from("high_yield_stocks"), String::from("consistent_payers")]
        );
        assert_eq!(stored.listing_date.as_deref(), Some("1999-03-01"));
        assert_eq!(warehouse.symbol_count().expect("count"), 1);
    }

    #[test]
    fn method_coverage_counts_each_method() {
        let (_temp, warehouse) = open_temp();
        warehouse
            .upsert_symbol(&symbol_row("O", &["high_yield_stocks", "consistent_payers"], 1, "r"))
            .expect("upsert");
        warehouse
            .upsert_symbol(&symbol_row("MAIN", &["consistent_payers"], 1, "r"))
            .expect("upsert");

        let coverage = warehouse.method_coverage().expect("coverage");
        assert_eq!(
            coverage,
            vec![
                (String::from("consistent_payers"), 2),
                (String::from("high_yield_stocks"), 1),
            ]
        );
    }

    #[test]
    fn run_summaries_round_trip_through_json() {
        let (_temp, warehouse) = open_temp();
        let run = RunRow {
            run_id: String::from("run-1"),
            started_at_us: 1_000,
            finished_at_us: 9_000,
            status: String::from("completed"),
            total_unique: 12,
            excluded_count: 3,
            elapsed_ms: 8,
            summary: serde_json::json!({ "per_strategy_counts": { "high_yield_stocks": 10 } }),
        };

        warehouse.record_run(&run).expect("record run");
        let runs = warehouse.recent_runs(5).expect("runs");

        assert_eq!(runs, vec![run]);
    }
}
