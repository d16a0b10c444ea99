use divscout_core::Symbol;
use serde_json::json;

use crate::cli::{Cli, ExclusionsArgs, ExclusionsCommand};
use crate::error::CliError;

use super::{warehouse, CommandResult};

pub fn run(cli: &Cli, args: &ExclusionsArgs) -> Result<CommandResult, CliError> {
    let warehouse = warehouse::open(cli)?;

    match &args.command {
        ExclusionsCommand::List { limit } => {
            let exclusions = warehouse.list_exclusions(*limit)?;
            Ok(CommandResult::ok(json!({
                "count": exclusions.len(),
                "exclusions": exclusions,
            })))
        }
        ExclusionsCommand::Show { symbol } => {
            let symbol = Symbol::parse(symbol)?;
            let record = warehouse.exclusion(symbol.as_str())?;
            Ok(CommandResult::ok(json!({
                "symbol": symbol,
                "excluded": record.is_some(),
                "record": record,
            })))
        }
        ExclusionsCommand::Repeat => {
            let exclusions = warehouse.repeat_exclusions()?;
            Ok(CommandResult::ok(json!({
                "count": exclusions.len(),
                "exclusions": exclusions,
            })))
        }
    }
}
