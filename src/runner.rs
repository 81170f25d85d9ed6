use super::{errors::Result, model::Metrics, strategy::BenchmarkStrategy};
use std::io;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Получатель готовых результатов.
pub trait ReportSink: Send + Sync {
    fn record(&self, metrics: &Metrics) -> io::Result<()>;
}

/// Пишет результат одним структурированным событием tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn record(&self, metrics: &Metrics) -> io::Result<()> {
        info!(
            target: "threadbench::report",
            thread_type = metrics.thread_type(),
            task_type = %metrics.task_type(),
            total_time_ms = metrics.total_time_ms(),
            throughput = metrics.throughput(),
            avg_latency_ms = metrics.avg_latency_ms(),
            memory_used_kb = metrics.memory_used_kb(),
            threads = metrics.threads_observed(),
            completed_tasks = metrics.completed_tasks(),
            "benchmark finished"
        );
        Ok(())
    }
}

/// Прогоняет одну стратегию, печатает отчёт и передаёт его в sink.
pub struct BenchmarkRunner<S = TracingSink> {
    sink: S,
}

impl Default for BenchmarkRunner {
    fn default() -> Self {
        Self::new(TracingSink)
    }
}

impl<S: ReportSink> BenchmarkRunner<S> {
    pub fn new(sink: S) -> Self {
        Self { sink }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub async fn run<B>(&self, strategy: &B, task_type: &str, task_count: i64) -> Result<Metrics>
    where
        B: BenchmarkStrategy,
    {
        self.run_until(strategy, task_type, task_count, &CancellationToken::new()).await
    }

    pub async fn run_until<B>(
        &self,
        strategy: &B,
        task_type: &str,
        task_count: i64,
        cancel: &CancellationToken,
    ) -> Result<Metrics>
    where
        B: BenchmarkStrategy,
    {
        let metrics = strategy.execute_until(task_type, task_count, cancel).await?;
        println!("{}", metrics.format());
        if let Err(e) = self.sink.record(&metrics) {
            warn!(%e, thread_type = strategy.thread_type(), "failed to record benchmark report");
        }
        Ok(metrics)
    }
}
