use divscout_core::{Warehouse, WarehouseConfig};
use serde_json::json;

use crate::cli::Cli;
use crate::error::CliError;

use super::CommandResult;

/// Open the warehouse named on the command line, else the default one.
pub fn open(cli: &Cli) -> Result<Warehouse, CliError> {
    let warehouse = match &cli.warehouse {
        Some(path) => Warehouse::open(WarehouseConfig::at(path))?,
        None => Warehouse::open_default()?,
    };
    Ok(warehouse)
}

pub fn runs(cli: &Cli, limit: usize) -> Result<CommandResult, CliError> {
    let warehouse = open(cli)?;
    let runs = warehouse.recent_runs(limit)?;
    Ok(CommandResult::ok(json!({ "runs": runs })))
}

pub fn coverage(cli: &Cli) -> Result<CommandResult, CliError> {
    let warehouse = open(cli)?;
    let methods = warehouse
        .method_coverage()?
        .into_iter()
        .map(|(method, symbols)| json!({ "method": method, "symbols": symbols }))
        .collect::<Vec<_>>();
    Ok(CommandResult::ok(json!({
        "total_symbols": warehouse.symbol_count()?,
        "methods": methods,
    })))
}
