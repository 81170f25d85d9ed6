use super::{require_positive, BenchmarkStrategy, PooledRun, RunRequest};
use crate::{errors::Result, model::Metrics, pool::PoolConfig, task::TaskSimulator};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WorkStealingConfig {
    pub parallelism: usize,
    pub diagnostics: bool,
    pub wait_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for WorkStealingConfig {
    fn default() -> Self {
        Self {
            parallelism: num_cpus::get(),
            diagnostics: false,
            wait_timeout: Duration::from_secs(10 * 60),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Пул с кражей работы: простаивающие воркеры забирают задачи из чужих деков.
#[derive(Clone)]
pub struct WorkStealingStrategy {
    config: WorkStealingConfig,
    simulator: Arc<dyn TaskSimulator>,
}

impl WorkStealingStrategy {
    pub const THREAD_TYPE: &'static str = "WorkStealing";

    pub fn new(simulator: Arc<dyn TaskSimulator>) -> Self {
        Self {
            config: WorkStealingConfig::default(),
            simulator,
        }
    }

    pub fn with_config(config: WorkStealingConfig, simulator: Arc<dyn TaskSimulator>) -> Result<Self> {
        require_positive(config.parallelism, "parallelism")?;
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &WorkStealingConfig {
        &self.config
    }
}

impl BenchmarkStrategy for WorkStealingStrategy {
    fn thread_type(&self) -> &'static str {
        Self::THREAD_TYPE
    }

    async fn execute_until(&self, task_type: &str, task_count: i64, cancel: &CancellationToken) -> Result<Metrics> {
        let request = RunRequest::parse(task_type, task_count)?;
        PooledRun {
            strategy: Self::THREAD_TYPE,
            pool: PoolConfig::work_stealing(self.config.parallelism),
            diagnostics: self.config.diagnostics,
            wait_timeout: self.config.wait_timeout,
            shutdown_timeout: self.config.shutdown_timeout,
        }
        .execute(&self.simulator, request, cancel)
        .await
    }
}
