//! CLI argument definitions for divscout.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `discover` | Run every enabled strategy and publish the results |
//! | `strategies` | List registered strategies and their criteria |
//! | `exclusions` | Inspect the exclusion list |
//! | `runs` | Show recent run summaries |
//! | `coverage` | Symbols per discovery method in the warehouse |
//!
//! # Examples
//!
//! ```bash
//! divscout discover --pretty
//! divscout discover --strategy dividend-etfs --strategy etf-families --dry-run
//! divscout exclusions list --limit 20
//! divscout exclusions show ZZZZ
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use divscout_core::StrategyId;

/// Dividend symbol discovery.
///
/// The provider credential is read from DIVSCOUT_API_KEY (or FMP_API_KEY).
/// Logs go to stderr and honor RUST_LOG; results are JSON on stdout.
#[derive(Debug, Parser)]
#[command(name = "divscout", author, version, about = "Dividend symbol discovery")]
pub struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// DuckDB warehouse file (default: $DIVSCOUT_HOME/warehouse.duckdb).
    #[arg(long, global = true)]
    pub warehouse: Option<PathBuf>,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a discovery pass and print the run summary.
    ///
    /// # Examples
    ///
    ///   divscout discover
    ///   divscout discover --max-concurrency 4 --timeout-secs 300
    ///   divscout discover --strategy high-yield-stocks --dry-run --symbols
    Discover(DiscoverArgs),

    /// List registered strategies and their criteria.
    Strategies,

    /// Inspect the exclusion list.
    Exclusions(ExclusionsArgs),

    /// Show recent run summaries from the warehouse.
    Runs(RunsArgs),

    /// Count stored symbols per discovery method.
    Coverage,
}

#[derive(Debug, Args)]
pub struct DiscoverArgs {
    /// Override `provider.max_concurrency`.
    #[arg(long)]
    pub max_concurrency: Option<usize>,

    /// Override `run.timeout_secs`.
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Run only these strategies (repeatable).
    #[arg(long = "strategy", value_name = "ID", value_parser = parse_strategy)]
    pub strategies: Vec<StrategyId>,

    /// Keep exclusions in memory and skip publishing.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,

    /// Include the merged symbol list in the output.
    #[arg(long, default_value_t = false)]
    pub symbols: bool,
}

#[derive(Debug, Args)]
pub struct ExclusionsArgs {
    #[command(subcommand)]
    pub command: ExclusionsCommand,
}

#[derive(Debug, Subcommand)]
pub enum ExclusionsCommand {
    /// Most recently updated exclusions first.
    List {
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
    /// One symbol's exclusion record.
    Show { symbol: String },
    /// Symbols that failed validation at least three times.
    Repeat,
}

#[derive(Debug, Args)]
pub struct RunsArgs {
    #[arg(long, default_value_t = 10)]
    pub limit: usize,
}

fn parse_strategy(raw: &str) -> Result<StrategyId, String> {
    raw.parse::<StrategyId>().map_err(|error| error.to_string())
}
