mod discover;
mod exclusions;
mod strategies;
mod warehouse;

use serde_json::Value;

use crate::cli::{Cli, Command};
use crate::error::CliError;

pub struct CommandResult {
    pub data: Value,
    /// The command finished but something needs attention (exit code 1).
    pub degraded: bool,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            degraded: false,
        }
    }

    pub fn degraded(mut self, degraded: bool) -> Self {
        self.degraded = degraded;
        self
    }
}

pub async fn run(cli: &Cli) -> Result<CommandResult, CliError> {
    match &cli.command {
        Command::Discover(args) => discover::run(cli, args).await,
        Command::Strategies => strategies::run(cli),
        Command::Exclusions(args) => exclusions::run(cli, args),
        Command::Runs(args) => warehouse::runs(cli, args.limit),
        Command::Coverage => warehouse::coverage(cli),
    }
}
