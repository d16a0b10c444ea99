//! Exclusion bookkeeping contract.
//!
//! An exclusion is advisory: it lets a run skip symbols already known to be
//! invalid. It never removes a symbol that a run has admitted.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::{BoxFuture, ExclusionRecord, Symbol, UtcDateTime};

#[derive(Debug, Error)]
pub enum ExclusionError {
    #[error("exclusion store failure: {0}")]
    Store(String),
}

/// Durable, idempotent record of symbols that failed validation.
///
/// Writes for different symbols must not block each other; concurrent writes
/// for one symbol must never lose an attempt increment.
pub trait ExclusionStore: Send + Sync {
    /// First failure creates the record with one attempt. Later failures bump
    /// the attempt count and refresh `reason` and `updated_at`; `excluded_at`
    /// and `source` keep their first values.
    fn record_failure<'a>(
        &'a self,
        symbol: &'a Symbol,
        reason: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExclusionRecord, ExclusionError>>;

    fn is_excluded<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, Result<bool, ExclusionError>>;

    fn lookup<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Option<ExclusionRecord>, ExclusionError>>;
}

/// Process-local store, used for dry runs and tests.
#[derive(Debug, Default)]
pub struct MemoryExclusionStore {
    records: Mutex<HashMap<Symbol, ExclusionRecord>>,
}

impl MemoryExclusionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record, e.g. to exercise skip-hints.
    pub fn insert(&self, record: ExclusionRecord) {
        self.records
            .lock()
            .expect("exclusion map poisoned")
            .insert(record.symbol.clone(), record);
    }

    pub fn records(&self) -> Vec<ExclusionRecord> {
        let records = self.records.lock().expect("exclusion map poisoned");
        let mut output: Vec<ExclusionRecord> = records.values().cloned().collect();
        output.sort_by(|left, right| left.symbol.cmp(&right.symbol));
        output
    }

    pub fn len(&self) -> usize {
        self.records.lock().expect("exclusion map poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply(&self, symbol: &Symbol, reason: &str, source: &str) -> ExclusionRecord {
        let now = UtcDateTime::now();
        let mut records = self.records.lock().expect("exclusion map poisoned");
        let record = records
            .entry(symbol.clone())
            .and_modify(|existing| {
                existing.reason = reason.to_owned();
                existing.updated_at = now;
                existing.validation_attempts = existing.validation_attempts.saturating_add(1);
            })
            .or_insert_with(|| ExclusionRecord {
                symbol: symbol.clone(),
                reason: reason.to_owned(),
                source: source.chars().take(50).collect(),
                excluded_at: now,
                updated_at: now,
                validation_attempts: 1,
            });
        record.clone()
    }
}

impl ExclusionStore for MemoryExclusionStore {
    fn record_failure<'a>(
        &'a self,
        symbol: &'a Symbol,
        reason: &'a str,
        source: &'a str,
    ) -> BoxFuture<'a, Result<ExclusionRecord, ExclusionError>> {
        Box::pin(async move { Ok(self.apply(symbol, reason, source)) })
    }

    fn is_excluded<'a>(&'a self, symbol: &'a Symbol) -> BoxFuture<'a, Result<bool, ExclusionError>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .expect("exclusion map poisoned")
                .contains_key(symbol))
        })
    }

    fn lookup<'a>(
        &'a self,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Option<ExclusionRecord>, ExclusionError>> {
        Box::pin(async move {
            Ok(self
                .records
                .lock()
                .expect("exclusion map poisoned")
                .get(symbol)
                .cloned())
        })
    }
}
