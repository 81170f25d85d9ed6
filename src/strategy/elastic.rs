use super::{settle_wait, BenchmarkStrategy, RunRequest, UnitContext};
use crate::{
    errors::{BenchError, Result},
    gate::CompletionGate,
    model::Metrics,
    task::TaskSimulator,
};
use std::{sync::Arc, time::Instant};
use tokio::time::Duration;
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::{debug, info_span, Instrument};

#[derive(Debug, Clone)]
pub struct ElasticConfig {
    pub diagnostics: bool,
    pub warmup_runs: usize,
    pub wait_timeout: Duration,
}

impl Default for ElasticConfig {
    fn default() -> Self {
        Self {
            diagnostics: false,
            warmup_runs: 100,
            wait_timeout: Duration::from_secs(5 * 60),
        }
    }
}

/// Одна лёгкая tokio-задача на каждую единицу работы, без переиспользования.
///
/// Перед замером выполняется прогрев: `warmup_runs` последовательных
/// запусков вне измеряемого окна.
#[derive(Clone)]
pub struct ElasticStrategy {
    config: ElasticConfig,
    simulator: Arc<dyn TaskSimulator>,
}

impl ElasticStrategy {
    pub const THREAD_TYPE: &'static str = "ElasticPerTask";

    pub fn new(simulator: Arc<dyn TaskSimulator>) -> Self {
        Self {
            config: ElasticConfig::default(),
            simulator,
        }
    }

    pub fn with_config(config: ElasticConfig, simulator: Arc<dyn TaskSimulator>) -> Result<Self> {
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &ElasticConfig {
        &self.config
    }
}

impl BenchmarkStrategy for ElasticStrategy {
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

        // пустой прогон нечего прогревать
        if request.task_count > 0 {
            for _ in 0..self.config.warmup_runs {
                if cancel.is_cancelled() {
                    return Err(BenchError::Interrupted);
                }
                if let Err(e) = unit.attempt().await {
                    debug!(strategy = Self::THREAD_TYPE, %e, "warm-up run failed");
                }
            }
        }

        let tracker = TaskTracker::new();
        let start = Instant::now();
        for seq in 1..=request.task_count {
            let task = unit.clone().run_async(seq);
            if self.config.diagnostics {
                tracker.spawn(task.instrument(info_span!("elastic_task", seq)));
            } else {
                tracker.spawn(task);
            }
        }

        let outcome = gate.wait_until(self.config.wait_timeout, cancel).await;
        let end = Instant::now();
        let completed = unit.completed();

        // задачи не переиспользуются, ждать их завершения не нужно
        tracker.close();
        settle_wait(Self::THREAD_TYPE, outcome, self.config.wait_timeout, &gate)?;
        debug!(strategy = Self::THREAD_TYPE, still_running = tracker.len(), "tracker closed");

        Ok(Metrics::calculate(
            Self::THREAD_TYPE,
            request.task_type,
            start,
            end,
            request.task_count,
            completed,
        ))
    }
}
