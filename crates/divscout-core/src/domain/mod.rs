//! # Domain Models
//!
//! Canonical domain types for dividend symbol discovery.
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Symbol`] | Validated, case-normalized ticker |
//! | [`InstrumentType`] | stock, etf or trust |
//! | [`SymbolAttributes`] | Best-known attribute snapshot |
//! | [`Candidate`] | One raw strategy record |
//! | [`DiscoveredSymbol`] | Merged output record with provenance |
//! | [`ExclusionRecord`] | Stored validation-failure state |
//! | [`UtcDateTime`] | UTC timestamp |

mod models;
mod symbol;
mod timestamp;

pub use models::{
    Candidate, DiscoveredSymbol, ExclusionRecord, InstrumentType, SymbolAttributes,
};
pub use symbol::{Symbol, MAX_SYMBOL_LEN};
pub use timestamp::UtcDateTime;
