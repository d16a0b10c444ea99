//! Merge per-strategy candidates into one deduplicated, provenance-tagged set.
//!
//! Merging is order-independent. For every attribute the kept value is the
//! minimum under this order:
//!
//! 1. present beats absent
//! 2. lower strategy priority number beats higher (see [`StrategyId::priority`])
//! 3. same strategy: larger number, lexicographically smaller string,
//!    earlier date
//!
//! Each field remembers the priority that supplied it, so folding candidates
//! in any order, or merging partial aggregators, yields the same result.
//! Instrument type keeps the most specific class: etf, then trust, then stock.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use time::Date;

use crate::strategies::StrategyId;
use crate::{Candidate, DiscoveredSymbol, InstrumentType, Symbol, SymbolAttributes};

#[derive(Debug, Clone, PartialEq)]
struct Sourced<T> {
    value: T,
    priority: u8,
}

/// Replace `slot` when `incoming` ranks ahead of it. `better` decides ties
/// between values from the same priority.
fn merge_field<T>(
    slot: &mut Option<Sourced<T>>,
    incoming: Option<T>,
    priority: u8,
    better: impl Fn(&T, &T) -> bool,
) {
    let Some(value) = incoming else {
        return;
    };
    let replace = match slot {
        None => true,
        Some(existing) => match priority.cmp(&existing.priority) {
            Ordering::Less => true,
            Ordering::Greater => false,
            Ordering::Equal => better(&value, &existing.value),
        },
    };
    if replace {
        *slot = Some(Sourced { value, priority });
    }
}

fn larger(incoming: &f64, existing: &f64) -> bool {
    incoming.total_cmp(existing) == Ordering::Greater
}

fn smaller_text(incoming: &String, existing: &String) -> bool {
    incoming < existing
}

fn earlier(incoming: &Date, existing: &Date) -> bool {
    incoming < existing
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    instrument_type: InstrumentType,
    methods: BTreeSet<StrategyId>,
    name: Option<Sourced<String>>,
    price: Option<Sourced<f64>>,
    dividend_yield: Option<Sourced<f64>>,
    market_cap: Option<Sourced<f64>>,
    sector: Option<Sourced<String>>,
    exchange: Option<Sourced<String>>,
    listing_date: Option<Sourced<Date>>,
}

impl Entry {
    fn new(instrument_type: InstrumentType) -> Self {
        Self {
            instrument_type,
            methods: BTreeSet::new(),
            name: None,
            price: None,
            dividend_yield: None,
            market_cap: None,
            sector: None,
            exchange: None,
            listing_date: None,
        }
    }

    fn absorb(&mut self, candidate: Candidate) {
        let priority = candidate.strategy.priority();
        if candidate.instrument_type.specificity() > self.instrument_type.specificity() {
            self.instrument_type = candidate.instrument_type;
        }
        self.methods.insert(candidate.strategy);

        let attributes = candidate.attributes;
        merge_field(&mut self.name, attributes.name, priority, smaller_text);
        merge_field(&mut self.price, attributes.price, priority, larger);
        merge_field(&mut self.dividend_yield, attributes.dividend_yield, priority, larger);
        merge_field(&mut self.market_cap, attributes.market_cap, priority, larger);
        merge_field(&mut self.sector, attributes.sector, priority, smaller_text);
        merge_field(&mut self.exchange, attributes.exchange, priority, smaller_text);
        merge_field(&mut self.listing_date, attributes.listing_date, priority, earlier);
    }

    fn combine(&mut self, other: Entry) {
        if other.instrument_type.specificity() > self.instrument_type.specificity() {
            self.instrument_type = other.instrument_type;
        }
        self.methods.extend(other.methods);

        fn take<T>(
            slot: &mut Option<Sourced<T>>,
            other: Option<Sourced<T>>,
            better: impl Fn(&T, &T) -> bool,
        ) {
            if let Some(Sourced { value, priority }) = other {
                merge_field(slot, Some(value), priority, better);
            }
        }
        take(&mut self.name, other.name, smaller_text);
        take(&mut self.price, other.price, larger);
        take(&mut self.dividend_yield, other.dividend_yield, larger);
        take(&mut self.market_cap, other.market_cap, larger);
        take(&mut self.sector, other.sector, smaller_text);
        take(&mut self.exchange, other.exchange, smaller_text);
        take(&mut self.listing_date, other.listing_date, earlier);
    }

    fn to_symbol(&self, ticker: &Symbol) -> DiscoveredSymbol {
        DiscoveredSymbol {
            ticker: ticker.clone(),
            instrument_type: self.instrument_type,
            discovery_methods: self.methods.clone(),
            attributes: SymbolAttributes {
                name: self.name.as_ref().map(|field| field.value.clone()),
                price: self.price.as_ref().map(|field| field.value),
                dividend_yield: self.dividend_yield.as_ref().map(|field| field.value),
                market_cap: self.market_cap.as_ref().map(|field| field.value),
                sector: self.sector.as_ref().map(|field| field.value.clone()),
                exchange: self.exchange.as_ref().map(|field| field.value.clone()),
                listing_date: self.listing_date.as_ref().map(|field| field.value),
            },
        }
    }
}

/// Finalized aggregation output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregateSummary {
    /// Raw candidate count per strategy, before validation.
    pub per_strategy_counts: BTreeMap<StrategyId, usize>,
    /// Merged symbols attributed to each method.
    pub per_method_counts: BTreeMap<StrategyId, usize>,
    pub total_unique: usize,
}

/// Single-writer accumulator for one run's merged symbol set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultAggregator {
    entries: BTreeMap<Symbol, Entry>,
    raw_counts: BTreeMap<StrategyId, usize>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit one validated candidate.
    pub fn add(&mut self, candidate: Candidate) {
        let instrument_type = candidate.instrument_type;
        self.entries
            .entry(candidate.symbol.clone())
            .or_insert_with(|| Entry::new(instrument_type))
            .absorb(candidate);
    }

    pub fn extend(&mut self, candidates: impl IntoIterator<Item = Candidate>) {
        for candidate in candidates {
            self.add(candidate);
        }
    }

    /// Record how many raw candidates a strategy produced. Repeated calls add up.
    pub fn record_raw_count(&mut self, strategy: StrategyId, count: usize) {
        *self.raw_counts.entry(strategy).or_default() += count;
    }

    /// Fold another aggregator into this one.
    pub fn merge(&mut self, other: ResultAggregator) {
        for (symbol, entry) in other.entries {
            match self.entries.get_mut(&symbol) {
                Some(existing) => existing.combine(entry),
                None => {
                    self.entries.insert(symbol, entry);
                }
            }
        }
        for (strategy, count) in other.raw_counts {
            self.record_raw_count(strategy, count);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ticker: &Symbol) -> Option<DiscoveredSymbol> {
        self.entries.get(ticker).map(|entry| entry.to_symbol(ticker))
    }

    /// Merged symbols ordered by ticker.
    pub fn symbols(&self) -> Vec<DiscoveredSymbol> {
        self.entries
            .iter()
            .map(|(ticker, entry)| entry.to_symbol(ticker))
            .collect()
    }

    pub fn summary(&self) -> AggregateSummary {
        let mut per_method_counts: BTreeMap<StrategyId, usize> = BTreeMap::new();
        for entry in self.entries.values() {
            for method in &entry.methods {
                *per_method_counts.entry(*method).or_default() += 1;
            }
        }
        AggregateSummary {
            per_strategy_counts: self.raw_counts.clone(),
            per_method_counts,
            total_unique: self.entries.len(),
        }
    }

    pub fn finish(self) -> (Vec<DiscoveredSymbol>, AggregateSummary) {
        let summary = self.summary();
        (self.symbols(), summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(ticker: &str, strategy: StrategyId, attributes: SymbolAttributes) -> Candidate {
        Candidate::new(
            Symbol::parse(ticker).expect("symbol"),
            InstrumentType::Stock,
            strategy,
        )
        .with_attributes(attributes)
    }

    #[test]
    fn higher_priority_value_wins_regardless_of_order() {
        let screener = candidate(
            "O",
            StrategyId::HighYieldStocks,
            SymbolAttributes {
                market_cap: Some(4.0e10),
                ..SymbolAttributes::default()
            },
        );
        let behavioral = candidate(
            "O",
            StrategyId::ConsistentPayers,
            SymbolAttributes {
                market_cap: Some(4.2e10),
                sector: Some(String::from("Real Estate")),
                ..SymbolAttributes::default()
            },
        );

        let mut forward = ResultAggregator::new();
        forward.extend([screener.clone(), behavioral.clone()]);
        let mut backward = ResultAggregator::new();
        backward.extend([behavioral, screener]);

        assert_eq!(forward.symbols(), backward.symbols());
        let merged = forward.symbols().remove(0);
        assert_eq!(merged.attributes.market_cap, Some(4.0e10));
        assert_eq!(merged.attributes.sector.as_deref(), Some("Real Estate"));
    }

    #[test]
    fn same_strategy_ties_break_on_value() {
        let mut aggregator = ResultAggregator::new();
        for (yield_pct, name) in [(3.1, "Beta Corp"), (3.4, "Alpha Corp")] {
            aggregator.add(candidate(
                "ABC",
                StrategyId::SectorLeaders,
                SymbolAttributes {
                    dividend_yield: Some(yield_pct),
                    name: Some(String::from(name)),
                    ..SymbolAttributes::default()
                },
            ));
        }

        let merged = aggregator.symbols().remove(0);
        assert_eq!(merged.attributes.dividend_yield, Some(3.4));
        assert_eq!(merged.attributes.name.as_deref(), Some("Alpha Corp"));
    }

    #[test]
    fn instrument_type_keeps_most_specific() {
        let mut aggregator = ResultAggregator::new();
        aggregator.add(candidate("SCHD", StrategyId::HighYieldStocks, SymbolAttributes::default()));
        aggregator.add(Candidate::new(
            Symbol::parse("schd").expect("symbol"),
            InstrumentType::Etf,
            StrategyId::DividendEtfs,
        ));

        let merged = aggregator.symbols().remove(0);
        assert_eq!(merged.instrument_type, InstrumentType::Etf);
        assert_eq!(merged.discovery_methods.len(), 2);
    }

    #[test]
    fn partial_aggregators_merge_like_a_single_fold() {
        let a = candidate(
            "MAIN",
            StrategyId::DividendAristocrats,
            SymbolAttributes {
                price: Some(45.0),
                ..SymbolAttributes::default()
            },
        );
        let b = candidate(
            "MAIN",
            StrategyId::HighYieldStocks,
            SymbolAttributes {
                exchange: Some(String::from("NYSE")),
                ..SymbolAttributes::default()
            },
        );
        let c = candidate("T", StrategyId::ConsistentPayers, SymbolAttributes::default());

        let mut single = ResultAggregator::new();
        single.extend([a.clone(), b.clone(), c.clone()]);

        let mut left = ResultAggregator::new();
        left.extend([c]);
        let mut right = ResultAggregator::new();
        right.extend([b, a]);
        left.merge(right);

        assert_eq!(left.symbols(), single.symbols());
    }

    #[test]
    fn summary_counts_methods_per_merged_symbol() {
        let mut aggregator = ResultAggregator::new();
        aggregator.record_raw_count(StrategyId::HighYieldStocks, 3);
        aggregator.add(candidate("O", StrategyId::HighYieldStocks, SymbolAttributes::default()));
        aggregator.add(candidate("O", StrategyId::ConsistentPayers, SymbolAttributes::default()));
        aggregator.add(candidate("T", StrategyId::HighYieldStocks, SymbolAttributes::default()));

        let summary = aggregator.summary();
        assert_eq!(summary.total_unique, 2);
        assert_eq!(summary.per_method_counts[&StrategyId::HighYieldStocks], 2);
        assert_eq!(summary.per_method_counts[&StrategyId::ConsistentPayers], 1);
        assert_eq!(summary.per_strategy_counts[&StrategyId::HighYieldStocks], 3);
    }
}
