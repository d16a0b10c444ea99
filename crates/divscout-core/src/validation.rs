//! Tradability checks applied to every candidate before it is admitted.

use std::collections::HashSet;
use std::convert::Infallible;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::SingleFlight;
use crate::fetcher::{FetchError, RateLimitedFetcher};
use crate::provider::{quote_query, QuoteRow};
use crate::{BoxFuture, Candidate, ExclusionStore, Symbol};

pub const NO_PRICE_DATA: &str = "no price data";
pub const NO_TRADING_ACTIVITY: &str = "no trading activity";

/// Result of a successful validator lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid { reason: String },
}

impl Validity {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }
}

/// Confirms that a symbol is tradable. A lookup error means "unknown", not
/// "invalid".
pub trait SymbolValidator: Send + Sync {
    fn validate<'a>(
        &'a self,
        fetcher: &'a RateLimitedFetcher,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Validity, FetchError>>;
}

/// Checks the short quote: a positive price and non-zero volume.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuoteValidator;

impl QuoteValidator {
    pub fn judge(body: &Value) -> Validity {
        let Some(row) = body.as_array().and_then(|rows| rows.first()) else {
            return Validity::invalid(NO_PRICE_DATA);
        };
        let Ok(quote) = serde_json::from_value::<QuoteRow>(row.clone()) else {
            return Validity::invalid(NO_PRICE_DATA);
        };

        match (quote.price, quote.volume) {
            (Some(price), _) if !price.is_finite() || price <= 0.0 => {
                Validity::invalid(NO_PRICE_DATA)
            }
            (None, _) => Validity::invalid(NO_PRICE_DATA),
            (Some(_), Some(volume)) if volume <= 0.0 => Validity::invalid(NO_TRADING_ACTIVITY),
            _ => Validity::Valid,
        }
    }
}

impl SymbolValidator for QuoteValidator {
    fn validate<'a>(
        &'a self,
        fetcher: &'a RateLimitedFetcher,
        symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Validity, FetchError>> {
        Box::pin(async move {
            let body = fetcher.fetch_shared(&quote_query(symbol)).await?;
            Ok(Self::judge(&body))
        })
    }
}

/// Admits everything; used when validation is switched off.
#[derive(Debug, Clone, Copy, Default)]
pub struct AdmitAll;

impl SymbolValidator for AdmitAll {
    fn validate<'a>(
        &'a self,
        _fetcher: &'a RateLimitedFetcher,
        _symbol: &'a Symbol,
    ) -> BoxFuture<'a, Result<Validity, FetchError>> {
        Box::pin(async { Ok(Validity::Valid) })
    }
}

/// Per-run verdict for one ticker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateVerdict {
    Admit,
    /// Failed validation; an exclusion was recorded.
    Exclude { reason: String },
    /// Already on the exclusion list; not re-checked.
    Skip,
    /// The validator could not reach a conclusion.
    Unverified { message: String },
    /// The run deadline stopped the lookup before it ran.
    CutOff,
}

/// Run-scoped validation gate. One verdict per ticker per run, and at most one
/// exclusion write per ticker per run.
pub struct ValidationGate {
    validator: Arc<dyn SymbolValidator>,
    exclusions: Arc<dyn ExclusionStore>,
    fetcher: RateLimitedFetcher,
    skip_known_excluded: bool,
    verdicts: SingleFlight<GateVerdict>,
    excluded: Mutex<HashSet<Symbol>>,
}

impl ValidationGate {
    pub fn new(
        validator: Arc<dyn SymbolValidator>,
        exclusions: Arc<dyn ExclusionStore>,
        fetcher: RateLimitedFetcher,
        skip_known_excluded: bool,
    ) -> Self {
        Self {
            validator,
            exclusions,
            fetcher,
            skip_known_excluded,
            verdicts: SingleFlight::new(),
            excluded: Mutex::new(HashSet::new()),
        }
    }

    pub async fn check(&self, candidate: &Candidate) -> GateVerdict {
        let outcome = self
            .verdicts
            .get_or_try_init(candidate.symbol.as_str(), || async {
                Ok::<_, Infallible>(self.evaluate(candidate).await)
            })
            .await;
        match outcome {
            Ok(verdict) => verdict,
            Err(never) => match never {},
        }
    }

    /// Distinct symbols excluded during this run.
    pub fn excluded_count(&self) -> usize {
        self.excluded.lock().expect("excluded set poisoned").len()
    }

    async fn evaluate(&self, candidate: &Candidate) -> GateVerdict {
        let symbol = &candidate.symbol;

        if self.skip_known_excluded {
            match self.exclusions.is_excluded(symbol).await {
                Ok(true) => {
                    debug!(symbol = %symbol, "skipping known-excluded symbol");
                    return GateVerdict::Skip;
                }
                Ok(false) => {}
                Err(error) => warn!(symbol = %symbol, %error, "exclusion lookup failed"),
            }
        }

        match self.validator.validate(&self.fetcher, symbol).await {
            Ok(Validity::Valid) => GateVerdict::Admit,
            Ok(Validity::Invalid { reason }) => {
                let source = candidate.strategy.as_str();
                match self.exclusions.record_failure(symbol, &reason, source).await {
                    Ok(record) => debug!(
                        symbol = %symbol,
                        reason = %reason,
                        attempts = record.validation_attempts,
                        "symbol excluded"
                    ),
                    Err(error) => warn!(symbol = %symbol, %error, "failed to record exclusion"),
                }
                self.excluded
                    .lock()
                    .expect("excluded set poisoned")
                    .insert(symbol.clone());
                GateVerdict::Exclude { reason }
            }
            Err(error) if error.is_deadline() => {
                debug!(symbol = %symbol, "validation cut off by the run deadline");
                GateVerdict::CutOff
            }
            Err(error) => {
                debug!(symbol = %symbol, %error, "validation inconclusive");
                GateVerdict::Unverified {
                    message: error.to_string(),
                }
            }
        }
    }
}
