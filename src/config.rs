//! Настройка стратегий из аргументов командной строки.

use super::{
    errors::Result,
    strategy::{
        ElasticConfig, ElasticStrategy, FixedPoolConfig, FixedPoolStrategy, Strategy, StrategyKind,
        StructuredBatchConfig, StructuredBatchStrategy, StructuredScopeConfig, StructuredScopeStrategy,
        WorkStealingConfig, WorkStealingStrategy,
    },
    task::TaskSimulator,
};
use std::sync::Arc;
use tokio::time::Duration;

/// Переопределения настроек стратегии.
///
/// Подключается в `clap::Parser` через `#[command(flatten)]`. Незаданные
/// поля оставляют значения по умолчанию выбранной стратегии; поля, которые
/// выбранной стратегии не относятся, игнорируются.
#[derive(Debug, Default, Clone, clap::Args)]
pub struct StrategyArgs {
    /// Log the duration of every task
    #[arg(long)]
    pub diagnostics: bool,

    /// Worker threads of the fixed pool
    #[arg(long)]
    pub pool_size: Option<usize>,

    /// Worker threads of the work-stealing pool
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Tasks per batch of the structured batch strategy
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Untimed runs before the elastic strategy starts measuring
    #[arg(long)]
    pub warmup_runs: Option<usize>,

    /// Bound on waiting for tasks, in seconds
    #[arg(long)]
    pub wait_timeout_secs: Option<u64>,
}

impl StrategyArgs {
    fn wait_timeout(&self, default: Duration) -> Duration {
        self.wait_timeout_secs.map(Duration::from_secs).unwrap_or(default)
    }

    pub fn build(&self, kind: StrategyKind, simulator: Arc<dyn TaskSimulator>) -> Result<Strategy> {
        let strategy = match kind {
            StrategyKind::FixedPool => {
                let d = FixedPoolConfig::default();
                let config = FixedPoolConfig {
                    pool_size: self.pool_size.unwrap_or(d.pool_size),
                    diagnostics: self.diagnostics,
                    wait_timeout: self.wait_timeout(d.wait_timeout),
                    ..d
                };
                Strategy::FixedPool(FixedPoolStrategy::with_config(config, simulator)?)
            }
            StrategyKind::ElasticPerTask => {
                let d = ElasticConfig::default();
                let config = ElasticConfig {
                    diagnostics: self.diagnostics,
                    warmup_runs: self.warmup_runs.unwrap_or(d.warmup_runs),
                    wait_timeout: self.wait_timeout(d.wait_timeout),
                };
                Strategy::ElasticPerTask(ElasticStrategy::with_config(config, simulator)?)
            }
            StrategyKind::WorkStealing => {
                let d = WorkStealingConfig::default();
                let config = WorkStealingConfig {
                    parallelism: self.parallelism.unwrap_or(d.parallelism),
                    diagnostics: self.diagnostics,
                    wait_timeout: self.wait_timeout(d.wait_timeout),
                    ..d
                };
                Strategy::WorkStealing(WorkStealingStrategy::with_config(config, simulator)?)
            }
            StrategyKind::StructuredScope => {
                let d = StructuredScopeConfig::default();
                let config = StructuredScopeConfig {
                    diagnostics: self.diagnostics,
                    wait_timeout: self.wait_timeout(d.wait_timeout),
                };
                Strategy::StructuredScope(StructuredScopeStrategy::with_config(config, simulator)?)
            }
            StrategyKind::StructuredBatch => {
                let d = StructuredBatchConfig::default();
                let config = StructuredBatchConfig {
                    batch_size: self.batch_size.unwrap_or(d.batch_size),
                    diagnostics: self.diagnostics,
                    wait_timeout: self.wait_timeout(d.wait_timeout),
                };
                Strategy::StructuredBatch(StructuredBatchStrategy::with_config(config, simulator)?)
            }
        };
        Ok(strategy)
    }
}
