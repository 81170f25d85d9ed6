use super::{abandon_scope, join_scope, require_positive, settle_wait, BenchmarkStrategy, RunRequest, UnitContext};
use crate::{errors::Result, gate::CompletionGate, model::Metrics, scope::TaskScope, task::TaskSimulator};
use std::{ops::Range, sync::Arc, time::Instant};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct StructuredBatchConfig {
    pub batch_size: usize,
    pub diagnostics: bool,
    /// Ограничение ожидания для каждой пачки отдельно.
    pub wait_timeout: Duration,
}

impl Default for StructuredBatchConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            diagnostics: false,
            wait_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Диапазоны индексов задач по пачкам, в порядке исполнения.
/// Последняя пачка может быть меньше `batch_size`.
pub fn plan_batches(task_count: usize, batch_size: usize) -> impl Iterator<Item = Range<usize>> {
    let batch_size = batch_size.max(1);
    (0..task_count)
        .step_by(batch_size)
        .map(move |start| start..task_count.min(start.saturating_add(batch_size)))
}

/// Задачи идут пачками: внутри пачки параллельно, пачки строго по очереди.
/// Каждая пачка живёт в собственном scope, счётчик общий на весь прогон.
#[derive(Clone)]
pub struct StructuredBatchStrategy {
    config: StructuredBatchConfig,
    simulator: Arc<dyn TaskSimulator>,
}

impl StructuredBatchStrategy {
    pub const THREAD_TYPE: &'static str = "StructuredBatch";

    pub fn new(simulator: Arc<dyn TaskSimulator>) -> Self {
        Self {
            config: StructuredBatchConfig::default(),
            simulator,
        }
    }

    pub fn with_config(config: StructuredBatchConfig, simulator: Arc<dyn TaskSimulator>) -> Result<Self> {
        require_positive(config.batch_size, "batch size")?;
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &StructuredBatchConfig {
        &self.config
    }
}

impl BenchmarkStrategy for StructuredBatchStrategy {
    fn thread_type(&self) -> &'static str {
        Self::THREAD_TYPE
    }

    async fn execute_until(&self, task_type: &str, task_count: i64, cancel: &CancellationToken) -> Result<Metrics> {
        let request = RunRequest::parse(task_type, task_count)?;
        // ворота подменяются на каждую пачку, счётчик остаётся общим
        let unit = UnitContext::new(
            Self::THREAD_TYPE,
            self.simulator.clone(),
            request.task_type,
            self.config.diagnostics,
            Arc::new(CompletionGate::new(0)),
        );

        let start = Instant::now();
        for (batch, range) in plan_batches(request.task_count, self.config.batch_size).enumerate() {
            let size = range.len();
            let gate = Arc::new(CompletionGate::new(size));
            let batch_unit = unit.with_gate(gate.clone());
            let mut scope = TaskScope::new(Self::THREAD_TYPE);

            for seq in range {
                scope.fork(batch_unit.clone().run_async(seq));
            }

            let outcome = gate.wait_until(self.config.wait_timeout, cancel).await;
            if let Err(e) = settle_wait(Self::THREAD_TYPE, outcome, self.config.wait_timeout, &gate) {
                abandon_scope(&mut scope).await;
                return Err(e);
            }
            join_scope(&mut scope, cancel).await?;
            debug!(strategy = Self::THREAD_TYPE, batch, size, completed = unit.completed(), "batch closed");
        }
        let end = Instant::now();

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
