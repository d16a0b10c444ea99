//! Run orchestration.
//!
//! One run fans every registered strategy out as its own task. All of them
//! share a single [`RateLimitedFetcher`], and each sends exactly one
//! [`StrategyOutcome`] to the aggregation loop, which is the only writer of
//! the merged symbol set. Strategy failures are recorded in the summary and
//! never abort the run. Only missing preconditions do.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use thiserror::Error;
use time::Date;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::aggregator::ResultAggregator;
use crate::config::DiscoveryConfig;
use crate::error::ConfigError;
use crate::exclusion::{ExclusionStore, MemoryExclusionStore};
use crate::fetcher::{FetchStats, RateLimitedFetcher};
use crate::http_client::HttpClient;
use crate::persistence::{PublishReport, RunReporter, RunStamp, SymbolSink};
use crate::strategies::{Paging, Strategy, StrategyContext, StrategyId, StrategyRegistry};
use crate::validation::{AdmitAll, GateVerdict, QuoteValidator, SymbolValidator, ValidationGate};
use crate::{Candidate, DiscoveredSymbol, UtcDateTime};

/// Orchestrator lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed,
}

/// Run-level precondition failures. Nothing else fails a run.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("no provider credential; set DIVSCOUT_API_KEY or FMP_API_KEY")]
    MissingCredential,

    #[error("no discovery strategies are enabled")]
    EmptyRegistry,

    #[error("orchestrator has already run (state: {state:?})")]
    AlreadyStarted { state: RunState },

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}

impl DiscoveryError {
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingCredential => "discovery.missing_credential",
            Self::EmptyRegistry => "discovery.empty_registry",
            Self::AlreadyStarted { .. } => "discovery.already_started",
            Self::InvalidConfig(_) => "discovery.invalid_config",
        }
    }
}

/// Collaborators a run talks to.
#[derive(Clone)]
pub struct DiscoveryServices {
    pub http: Arc<dyn HttpClient>,
    pub exclusions: Arc<dyn ExclusionStore>,
    pub validator: Arc<dyn SymbolValidator>,
    pub sink: Option<Arc<dyn SymbolSink>>,
    pub reporter: Option<Arc<dyn RunReporter>>,
}

impl DiscoveryServices {
    /// In-memory exclusions, quote validation, no publishing.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            exclusions: Arc::new(MemoryExclusionStore::new()),
            validator: Arc::new(QuoteValidator),
            sink: None,
            reporter: None,
        }
    }

    pub fn with_exclusions(mut self, exclusions: Arc<dyn ExclusionStore>) -> Self {
        self.exclusions = exclusions;
        self
    }

    pub fn with_validator(mut self, validator: Arc<dyn SymbolValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn SymbolSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn RunReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }
}

/// Terminal state of one strategy within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum StrategyStatus {
    Completed,
    Failed { code: String, error: String },
    TimedOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyReport {
    pub strategy: StrategyId,
    #[serde(flatten)]
    pub status: StrategyStatus,
    /// Candidates returned before validation.
    pub raw_count: usize,
    pub admitted: usize,
    pub excluded: usize,
    pub skipped: usize,
    pub unverified: usize,
    /// Candidates whose validation the run deadline prevented.
    pub cut_off: usize,
    pub elapsed_ms: u64,
}

impl StrategyReport {
    fn incomplete(strategy: StrategyId, status: StrategyStatus, elapsed_ms: u64) -> Self {
        Self {
            strategy,
            status,
            raw_count: 0,
            admitted: 0,
            excluded: 0,
            skipped: 0,
            unverified: 0,
            cut_off: 0,
            elapsed_ms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every strategy completed.
    Completed,
    /// At least one strategy failed; none timed out.
    Partial,
    /// The deadline cut at least one strategy short.
    TimedOut,
}

impl RunStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::TimedOut => "timed_out",
        }
    }

    fn from_reports(reports: &[StrategyReport]) -> Self {
        if reports
            .iter()
            .any(|report| report.status == StrategyStatus::TimedOut)
        {
            Self::TimedOut
        } else if reports
            .iter()
            .any(|report| matches!(report.status, StrategyStatus::Failed { .. }))
        {
            Self::Partial
        } else {
            Self::Completed
        }
    }
}

/// Finalized run summary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiscoveryRun {
    pub run_id: Uuid,
    pub started_at: UtcDateTime,
    pub finished_at: UtcDateTime,
    pub elapsed_ms: u64,
    pub status: RunStatus,
    pub timed_out: bool,
    pub per_strategy_counts: BTreeMap<StrategyId, usize>,
    pub per_method_counts: BTreeMap<StrategyId, usize>,
    pub strategies: Vec<StrategyReport>,
    pub total_unique: usize,
    /// Distinct symbols newly excluded during this run.
    pub excluded_count: usize,
    pub credential_rejected: bool,
    pub escalations: Vec<String>,
    pub fetch: FetchStats,
}

impl DiscoveryRun {
    pub fn report(&self, strategy: StrategyId) -> Option<&StrategyReport> {
        self.strategies
            .iter()
            .find(|report| report.strategy == strategy)
    }
}

#[derive(Debug, Clone)]
pub struct DiscoveryOutput {
    pub run: DiscoveryRun,
    pub symbols: Vec<DiscoveredSymbol>,
    /// `None` when no sink was configured.
    pub publish: Option<PublishReport>,
}

/// What a strategy task sends back to the aggregation loop.
struct StrategyOutcome {
    report: StrategyReport,
    admitted: Vec<Candidate>,
}

struct TaskInputs {
    fetcher: RateLimitedFetcher,
    gate: Arc<ValidationGate>,
    today: Date,
    paging: Paging,
    validation_concurrency: usize,
}

pub struct DiscoveryOrchestrator {
    config: DiscoveryConfig,
    services: DiscoveryServices,
    registry: StrategyRegistry,
    timeout: Duration,
    state: RunState,
}

impl DiscoveryOrchestrator {
    pub fn new(config: DiscoveryConfig, services: DiscoveryServices) -> Self {
        let registry = StrategyRegistry::from_config(&config.strategies);
        let timeout = config.run.timeout();
        Self {
            config,
            services,
            registry,
            timeout,
            state: RunState::Idle,
        }
    }

    pub fn with_registry(mut self, registry: StrategyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Overrides `run.timeout_secs` with a finer-grained deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub const fn state(&self) -> RunState {
        self.state
    }

    pub fn registry(&self) -> &StrategyRegistry {
        &self.registry
    }

    /// Execute one run. An orchestrator runs at most once.
    pub async fn run(&mut self) -> Result<DiscoveryOutput, DiscoveryError> {
        if self.state != RunState::Idle {
            return Err(DiscoveryError::AlreadyStarted { state: self.state });
        }

        let fetcher = match self.preconditions() {
            Ok(fetcher) => fetcher,
            Err(error) => {
                self.state = RunState::Failed;
                error!(code = error.code(), %error, "discovery run cannot start");
                return Err(error);
            }
        };

        self.state = RunState::Running;
        let output = self.execute(fetcher).await;
        self.state = RunState::Completed;
        Ok(output)
    }

    fn preconditions(&self) -> Result<RateLimitedFetcher, DiscoveryError> {
        self.config.validate()?;
        let api_key = self
            .config
            .api_key
            .clone()
            .ok_or(DiscoveryError::MissingCredential)?;
        if self.registry.is_empty() {
            return Err(DiscoveryError::EmptyRegistry);
        }

        Ok(RateLimitedFetcher::new(
            self.config.provider.fetcher_config(api_key),
            Arc::clone(&self.services.http),
        ))
    }

    async fn execute(&self, base: RateLimitedFetcher) -> DiscoveryOutput {
        let run_id = Uuid::new_v4();
        let started_at = UtcDateTime::now();
        let started = Instant::now();
        // A deadline past the clock's range means the run is unbounded.
        let deadline = started.checked_add(self.timeout);
        let hard_stop =
            deadline.and_then(|deadline| deadline.checked_add(self.config.run.shutdown_grace()));
        let fetcher = base.scoped(deadline);
        let today = self
            .config
            .run
            .as_of
            .unwrap_or_else(|| started_at.date());

        let validator: Arc<dyn SymbolValidator> = if self.config.run.validate {
            Arc::clone(&self.services.validator)
        } else {
            Arc::new(AdmitAll)
        };
        let gate = Arc::new(ValidationGate::new(
            validator,
            Arc::clone(&self.services.exclusions),
            fetcher.clone(),
            self.config.run.skip_known_excluded,
        ));

        info!(
            %run_id,
            strategies = self.registry.len(),
            max_concurrency = fetcher.max_concurrency(),
            timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            %today,
            "discovery run started"
        );

        let (sender, mut receiver) = mpsc::channel::<StrategyOutcome>(self.registry.len().max(1));
        let mut handles: Vec<(StrategyId, JoinHandle<()>)> = Vec::with_capacity(self.registry.len());
        for strategy in self.registry.iter().cloned() {
            let id = strategy.id();
            let sender = sender.clone();
            let inputs = TaskInputs {
                fetcher: fetcher.clone(),
                gate: Arc::clone(&gate),
                today,
                paging: self.registry.paging(),
                validation_concurrency: self.config.run.validation_concurrency.max(1),
            };
            let handle = tokio::spawn(async move {
                let outcome = run_strategy(strategy, inputs).await;
                if sender.send(outcome).await.is_err() {
                    debug!(strategy = %id, "aggregation loop closed before outcome was sent");
                }
            });
            handles.push((id, handle));
        }
        drop(sender);

        let mut pending: BTreeSet<StrategyId> = self.registry.ids().into_iter().collect();
        let mut aggregator = ResultAggregator::new();
        let mut reports = Vec::with_capacity(self.registry.len());
        let mut deadline_hit = false;

        loop {
            let received = match hard_stop {
                Some(hard_stop) => tokio::time::timeout_at(hard_stop, receiver.recv()).await,
                None => Ok(receiver.recv().await),
            };
            match received {
                Ok(Some(outcome)) => {
                    let strategy = outcome.report.strategy;
                    pending.remove(&strategy);
                    if outcome.report.status == StrategyStatus::Completed {
                        aggregator.record_raw_count(strategy, outcome.report.raw_count);
                        aggregator.extend(outcome.admitted);
                    } else {
                        aggregator.record_raw_count(strategy, 0);
                    }
                    reports.push(outcome.report);
                }
                Ok(None) => break,
                Err(_) => {
                    deadline_hit = true;
                    break;
                }
            }
        }

        let elapsed_ms = elapsed_ms(started);
        for (id, handle) in &handles {
            if pending.contains(id) {
                handle.abort();
            }
        }
        for strategy in pending {
            let status = if deadline_hit {
                warn!(strategy = %strategy, "strategy cut off by the run deadline");
                StrategyStatus::TimedOut
            } else {
                error!(strategy = %strategy, "strategy task ended without reporting");
                StrategyStatus::Failed {
                    code: String::from("strategy.aborted"),
                    error: String::from("strategy task ended without reporting an outcome"),
                }
            };
            aggregator.record_raw_count(strategy, 0);
            reports.push(StrategyReport::incomplete(strategy, status, elapsed_ms));
        }
        reports.sort_by_key(|report| report.strategy);

        let credential_rejected = fetcher.credential_rejected();
        let escalations = escalations(&reports, credential_rejected);
        for message in &escalations {
            error!(%run_id, escalation = %message, "operator attention required");
        }

        let (symbols, summary) = aggregator.finish();
        let status = RunStatus::from_reports(&reports);
        let run = DiscoveryRun {
            run_id,
            started_at,
            finished_at: UtcDateTime::now(),
            elapsed_ms,
            status,
            timed_out: status == RunStatus::TimedOut,
            per_strategy_counts: summary.per_strategy_counts,
            per_method_counts: summary.per_method_counts,
            strategies: reports,
            total_unique: summary.total_unique,
            excluded_count: gate.excluded_count(),
            credential_rejected,
            escalations,
            fetch: fetcher.stats(),
        };

        info!(
            %run_id,
            status = run.status.as_str(),
            total_unique = run.total_unique,
            excluded = run.excluded_count,
            elapsed_ms = run.elapsed_ms,
            "discovery run finished"
        );

        let publish = self.publish(&run, &symbols).await;
        DiscoveryOutput {
            run,
            symbols,
            publish,
        }
    }

    async fn publish(
        &self,
        run: &DiscoveryRun,
        symbols: &[DiscoveredSymbol],
    ) -> Option<PublishReport> {
        let mut report = PublishReport::default();

        if let Some(reporter) = &self.services.reporter {
            match reporter.report(run).await {
                Ok(()) => report.run_reported = true,
                Err(error) => warn!(run_id = %run.run_id, %error, "failed to report run summary"),
            }
        }

        let sink = self.services.sink.as_ref()?;
        let stamp = RunStamp {
            run_id: run.run_id,
            seen_at: run.finished_at,
        };
        for symbol in symbols {
            match sink.upsert(symbol, stamp).await {
                Ok(()) => report.upserted += 1,
                Err(error) => {
                    report.failed += 1;
                    warn!(symbol = %symbol.ticker, %error, "symbol upsert failed");
                }
            }
        }
        info!(
            run_id = %run.run_id,
            upserted = report.upserted,
            failed = report.failed,
            "published discovered symbols"
        );
        Some(report)
    }
}

/// Convenience entry point: build an orchestrator and run it once.
pub async fn run_discovery(
    config: DiscoveryConfig,
    services: DiscoveryServices,
) -> Result<DiscoveryOutput, DiscoveryError> {
    DiscoveryOrchestrator::new(config, services).run().await
}

async fn run_strategy(strategy: Strategy, inputs: TaskInputs) -> StrategyOutcome {
    let id = strategy.id();
    let started = Instant::now();
    let ctx = StrategyContext {
        fetcher: &inputs.fetcher,
        today: inputs.today,
        paging: inputs.paging,
    };

    let candidates = match strategy.run(&ctx).await {
        Ok(candidates) => candidates,
        Err(failure) => {
            let status = if failure.is_timeout() {
                warn!(strategy = %id, error = %failure, "strategy hit the run deadline");
                StrategyStatus::TimedOut
            } else {
                warn!(strategy = %id, code = failure.code(), error = %failure, "strategy failed");
                StrategyStatus::Failed {
                    code: failure.code().to_owned(),
                    error: failure.to_string(),
                }
            };
            return StrategyOutcome {
                report: StrategyReport::incomplete(id, status, elapsed_ms(started)),
                admitted: Vec::new(),
            };
        }
    };

    let raw_count = candidates.len();
    let verdicts: Vec<(Candidate, GateVerdict)> = stream::iter(candidates)
        .map(|candidate| {
            let gate = Arc::clone(&inputs.gate);
            async move {
                let verdict = gate.check(&candidate).await;
                (candidate, verdict)
            }
        })
        .buffer_unordered(inputs.validation_concurrency)
        .collect()
        .await;

    let mut report = StrategyReport::incomplete(id, StrategyStatus::Completed, 0);
    report.raw_count = raw_count;
    let mut admitted = Vec::with_capacity(verdicts.len());
    for (candidate, verdict) in verdicts {
        match verdict {
            GateVerdict::Admit => admitted.push(candidate),
            GateVerdict::Exclude { .. } => report.excluded += 1,
            GateVerdict::Skip => report.skipped += 1,
            GateVerdict::Unverified { .. } => report.unverified += 1,
            GateVerdict::CutOff => report.cut_off += 1,
        }
    }
    report.admitted = admitted.len();
    report.elapsed_ms = elapsed_ms(started);

    if report.cut_off > 0 {
        warn!(
            strategy = %id,
            cut_off = report.cut_off,
            "run deadline stopped validation; strategy results are incomplete"
        );
        report.status = StrategyStatus::TimedOut;
        return StrategyOutcome {
            report,
            admitted: Vec::new(),
        };
    }

    info!(
        strategy = %id,
        raw = report.raw_count,
        admitted = report.admitted,
        excluded = report.excluded,
        skipped = report.skipped,
        unverified = report.unverified,
        elapsed_ms = report.elapsed_ms,
        "strategy completed"
    );

    StrategyOutcome { report, admitted }
}

fn escalations(reports: &[StrategyReport], credential_rejected: bool) -> Vec<String> {
    let mut messages: Vec<String> = reports
        .iter()
        .filter_map(|report| match &report.status {
            StrategyStatus::Failed { code, error } if code == "fetch.unauthorized" => Some(format!(
                "{}: provider refused the credential ({error})",
                report.strategy
            )),
            _ => None,
        })
        .collect();

    if credential_rejected && messages.is_empty() {
        messages.push(String::from(
            "provider refused the credential on at least one request; check DIVSCOUT_API_KEY",
        ));
    }
    messages
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
