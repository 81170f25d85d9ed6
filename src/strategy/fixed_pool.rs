use super::{require_positive, BenchmarkStrategy, PooledRun, RunRequest};
use crate::{errors::Result, model::Metrics, pool::PoolConfig, task::TaskSimulator};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct FixedPoolConfig {
    pub pool_size: usize,
    pub diagnostics: bool,
    pub wait_timeout: Duration,
    pub shutdown_timeout: Duration,
}

impl Default for FixedPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 100,
            diagnostics: false,
            wait_timeout: Duration::from_secs(10 * 60),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Ограниченный пул ОС-потоков с общей FIFO-очередью.
///
/// Когда все воркеры заняты, задачи копятся в очереди.
#[derive(Clone)]
pub struct FixedPoolStrategy {
    config: FixedPoolConfig,
    simulator: Arc<dyn TaskSimulator>,
}

impl FixedPoolStrategy {
    pub const THREAD_TYPE: &'static str = "FixedPool";

    pub fn new(simulator: Arc<dyn TaskSimulator>) -> Self {
        Self {
            config: FixedPoolConfig::default(),
            simulator,
        }
    }

    pub fn with_config(config: FixedPoolConfig, simulator: Arc<dyn TaskSimulator>) -> Result<Self> {
        require_positive(config.pool_size, "pool size")?;
        Ok(Self { config, simulator })
    }

    pub fn config(&self) -> &FixedPoolConfig {
        &self.config
    }
}

impl BenchmarkStrategy for FixedPoolStrategy {
    fn thread_type(&self) -> &'static str {
        Self::THREAD_TYPE
    }

    async fn execute_until(&self, task_type: &str, task_count: i64, cancel: &CancellationToken) -> Result<Metrics> {
        let request = RunRequest::parse(task_type, task_count)?;
        PooledRun {
            strategy: Self::THREAD_TYPE,
            pool: PoolConfig::fixed(self.config.pool_size),
            diagnostics: self.config.diagnostics,
            wait_timeout: self.config.wait_timeout,
            shutdown_timeout: self.config.shutdown_timeout,
        }
        .execute(&self.simulator, request, cancel)
        .await
    }
}
