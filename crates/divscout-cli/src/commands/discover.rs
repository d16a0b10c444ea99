use std::sync::Arc;

use divscout_core::{
    DiscoveryConfig, DiscoveryOrchestrator, DiscoveryServices, LogRunReporter, ReqwestHttpClient,
};
use serde_json::json;
use tracing::info;

use crate::cli::{Cli, DiscoverArgs};
use crate::error::CliError;

use super::{warehouse, CommandResult};

pub async fn run(cli: &Cli, args: &DiscoverArgs) -> Result<CommandResult, CliError> {
    let mut config = DiscoveryConfig::load(cli.config.as_deref())?;
    if let Some(max_concurrency) = args.max_concurrency {
        config.provider.max_concurrency = max_concurrency;
    }
    if let Some(timeout_secs) = args.timeout_secs {
        config.run.timeout_secs = timeout_secs;
    }

    let mut services = DiscoveryServices::new(Arc::new(ReqwestHttpClient::new()));
    if args.dry_run {
        info!("dry run: exclusions stay in memory and nothing is published");
        services = services.with_reporter(Arc::new(LogRunReporter));
    } else {
        let warehouse = Arc::new(warehouse::open(cli)?);
        services = services
            .with_exclusions(warehouse.clone())
            .with_sink(warehouse.clone())
            .with_reporter(warehouse);
    }

    let mut orchestrator = DiscoveryOrchestrator::new(config, services);
    if !args.strategies.is_empty() {
        let registry = orchestrator.registry().only(&args.strategies);
        orchestrator = orchestrator.with_registry(registry);
    }

    let output = orchestrator.run().await?;
    let degraded = !output.run.escalations.is_empty();

    let mut data = json!({
        "run": serde_json::to_value(&output.run)?,
        "publish": serde_json::to_value(output.publish)?,
    });
    if args.symbols {
        data["symbols"] = serde_json::to_value(&output.symbols)?;
    }

    Ok(CommandResult::ok(data).degraded(degraded))
}
