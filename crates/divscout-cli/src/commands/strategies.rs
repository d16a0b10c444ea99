use divscout_core::{DiscoveryConfig, StrategyId, StrategyRegistry};
use serde_json::json;

use crate::cli::Cli;
use crate::error::CliError;

use super::CommandResult;

pub fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    let config = DiscoveryConfig::load(cli.config.as_deref())?;
    let registry = StrategyRegistry::from_config(&config.strategies);

    let strategies = StrategyId::ALL
        .into_iter()
        .map(|id| {
            let strategy = registry.get(id);
            json!({
                "id": id,
                "priority": id.priority(),
                "enabled": strategy.is_some(),
                "description": id.description(),
                "criteria": strategy.map(|strategy| strategy.criteria()),
            })
        })
        .collect::<Vec<_>>();

    Ok(CommandResult::ok(json!({
        "paging": registry.paging(),
        "strategies": strategies,
    })))
}
