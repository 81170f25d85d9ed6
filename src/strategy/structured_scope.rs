use super::{abandon_scope, join_scope, settle_wait, BenchmarkStrategy, RunRequest, UnitContext};
use crate::{errors::Result, gate::CompletionGate, model::Metrics, scope::TaskScope, task::TaskSimulator};
use std::{sync::Arc, time::Instant};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StructuredScopeConfig {
    pub diagnostics: bool,
    pub wait_timeout: Duration,
}

impl Default for StructuredScopeConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            wait_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Все задачи запускаются детьми одного scope.
///
/// Ошибки ловятся внутри тела задачи и до scope не доходят, поэтому join
/// всегда успешен. После ожидания ворот scope собирается в любом случае:
/// ни одна задача не завершается после возврата из `execute`.
#[derive(Clone)]
pub struct StructuredScopeStrategy {
    config: StructuredScopeConfig,
    simulator: Arc<dyn TaskSimulator>,
}

impl StructuredScopeStrategy {
    pub const THREAD_TYPE: &'static str = "StructuredScope";

    pub fn new(simulator: Arc<dyn TaskSimulator>) -> Self {
        Self {
            config: StructuredScopeConfig::default(),
            simulator,
        }
    }

    pub fn with_config(config: StructuredScopeConfig, simulator: Arc<dyn TaskSimulator>) -> Result<Self> {
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &StructuredScopeConfig {
        &self.config
    }
}

impl BenchmarkStrategy for StructuredScopeStrategy {
    fn thread_type(&self) -> &'static str {
        Self::THREAD_TYPE
    }

    async fn execute_until(&self, task_type: &str, task_count: i64, cancel: &CancellationToken) -> Result<Metrics> {
        let request = RunRequest::parse(task_type, task_count)?;
        let gate = Arc::new(CompletionGate::new(request.task_count));
        let unit = UnitContext::new(
            Self::THREAD_TYPE,
            self.simulator.clone(),
            request.task_type,
            self.config.diagnostics,
            gate.clone(),
        );
        let mut scope = TaskScope::new(Self::THREAD_TYPE);

        let start = Instant::now();
        for seq in 0..request.task_count {
            scope.fork(unit.clone().run_async(seq));
        }

        let outcome = gate.wait_until(self.config.wait_timeout, cancel).await;
        if let Err(e) = settle_wait(Self::THREAD_TYPE, outcome, self.config.wait_timeout, &gate) {
            abandon_scope(&mut scope).await;
            return Err(e);
        }
        let report = join_scope(&mut scope, cancel).await?;
        let end = Instant::now();
        debug!(strategy = Self::THREAD_TYPE, joined = report.joined, "scope closed");

        Ok(Metrics::calculate(
            Self::THREAD_TYPE,
            request.task_type,
            start,
            end,
            request.task_count,
            unit.completed(),
        ))
    }
}
