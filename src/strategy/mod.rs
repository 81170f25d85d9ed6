//! Стратегии исполнения бенчмарка.
//!
//! Все стратегии следуют одной схеме: засечь старт, раздать `task_count`
//! независимых задач, дождаться ворот с ограничением по времени, засечь
//! конец и посчитать [`Metrics`]. Отличаются только подложкой исполнения и
//! дисциплиной ожидания.

mod elastic;
mod fixed_pool;
mod structured_batch;
mod structured_scope;
mod work_stealing;

pub use elastic::{ElasticConfig, ElasticStrategy};
pub use fixed_pool::{FixedPoolConfig, FixedPoolStrategy};
pub use structured_batch::{plan_batches, StructuredBatchConfig, StructuredBatchStrategy};
pub use structured_scope::{StructuredScopeConfig, StructuredScopeStrategy};
pub use work_stealing::{WorkStealingConfig, WorkStealingStrategy};

use super::{
    errors::{panic_message, BenchError, Result, TaskError},
    gate::{CompletionGate, CountDownOnDrop, GateOutcome},
    model::{Metrics, ScopeReport},
    pool::{PoolConfig, WorkerPool},
    scope::TaskScope,
    task::{TaskSimulator, TaskType},
};
use futures::FutureExt;
use std::{
    future::Future,
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub trait BenchmarkStrategy: Send + Sync {
    /// Название модели потоков в отчёте.
    fn thread_type(&self) -> &'static str;

    /// Прогоняет `task_count` задач типа `task_type`.
    ///
    /// Наружу выходят только `InvalidArgument` и `Interrupted` (сработал
    /// `cancel`). Ошибки задач, таймауты и грязный shutdown поглощаются и
    /// видны только через `completed_tasks` и логи.
    fn execute_until(
        &self,
        task_type: &str,
        task_count: i64,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Metrics>> + Send;

    fn execute(&self, task_type: &str, task_count: i64) -> impl Future<Output = Result<Metrics>> + Send {
        async move {
            let never = CancellationToken::new();
            self.execute_until(task_type, task_count, &never).await
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    FixedPool,
    ElasticPerTask,
    WorkStealing,
    StructuredScope,
    StructuredBatch,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::FixedPool,
        StrategyKind::ElasticPerTask,
        StrategyKind::WorkStealing,
        StrategyKind::StructuredScope,
        StrategyKind::StructuredBatch,
    ];

    /// Номер пункта меню CLI, 1..=5.
    pub fn from_choice(choice: u32) -> Result<Self> {
        usize::try_from(choice)
            .ok()
            .and_then(|c| c.checked_sub(1))
            .and_then(|idx| Self::ALL.get(idx).copied())
            .ok_or_else(|| BenchError::invalid(format!("invalid strategy choice: {choice}")))
    }

    pub fn thread_type(&self) -> &'static str {
        match self {
            StrategyKind::FixedPool => FixedPoolStrategy::THREAD_TYPE,
            StrategyKind::ElasticPerTask => ElasticStrategy::THREAD_TYPE,
            StrategyKind::WorkStealing => WorkStealingStrategy::THREAD_TYPE,
            StrategyKind::StructuredScope => StructuredScopeStrategy::THREAD_TYPE,
            StrategyKind::StructuredBatch => StructuredBatchStrategy::THREAD_TYPE,
        }
    }
}

/// Одна из пяти стратегий, выбранная во время выполнения.
#[derive(Clone)]
pub enum Strategy {
    FixedPool(FixedPoolStrategy),
    ElasticPerTask(ElasticStrategy),
    WorkStealing(WorkStealingStrategy),
    StructuredScope(StructuredScopeStrategy),
    StructuredBatch(StructuredBatchStrategy),
}

impl Strategy {
    /// Стратегия выбранного вида с настройками по умолчанию.
    pub fn with_defaults(kind: StrategyKind, simulator: Arc<dyn TaskSimulator>) -> Self {
        match kind {
            StrategyKind::FixedPool => Strategy::FixedPool(FixedPoolStrategy::new(simulator)),
            StrategyKind::ElasticPerTask => Strategy::ElasticPerTask(ElasticStrategy::new(simulator)),
            StrategyKind::WorkStealing => Strategy::WorkStealing(WorkStealingStrategy::new(simulator)),
            StrategyKind::StructuredScope => Strategy::StructuredScope(StructuredScopeStrategy::new(simulator)),
            StrategyKind::StructuredBatch => Strategy::StructuredBatch(StructuredBatchStrategy::new(simulator)),
        }
    }

    pub fn kind(&self) -> StrategyKind {
        match self {
            Strategy::FixedPool(_) => StrategyKind::FixedPool,
            Strategy::ElasticPerTask(_) => StrategyKind::ElasticPerTask,
            Strategy::WorkStealing(_) => StrategyKind::WorkStealing,
            Strategy::StructuredScope(_) => StrategyKind::StructuredScope,
            Strategy::StructuredBatch(_) => StrategyKind::StructuredBatch,
        }
    }
}

impl BenchmarkStrategy for Strategy {
    fn thread_type(&self) -> &'static str {
        self.kind().thread_type()
    }

    async fn execute_until(&self, task_type: &str, task_count: i64, cancel: &CancellationToken) -> Result<Metrics> {
        match self {
            Strategy::FixedPool(s) => s.execute_until(task_type, task_count, cancel).await,
            Strategy::ElasticPerTask(s) => s.execute_until(task_type, task_count, cancel).await,
            Strategy::WorkStealing(s) => s.execute_until(task_type, task_count, cancel).await,
            Strategy::StructuredScope(s) => s.execute_until(task_type, task_count, cancel).await,
            Strategy::StructuredBatch(s) => s.execute_until(task_type, task_count, cancel).await,
        }
    }
}

/// Проверенные аргументы одного вызова `execute`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RunRequest {
    pub(crate) task_type: TaskType,
    pub(crate) task_count: usize,
}

impl RunRequest {
    pub(crate) fn parse(task_type: &str, task_count: i64) -> Result<Self> {
        let task_type = task_type
            .parse::<TaskType>()
            .map_err(|e| BenchError::invalid(e.to_string()))?;
        let task_count = usize::try_from(task_count)
            .map_err(|_| BenchError::invalid(format!("task count must be non-negative, got {task_count}")))?;
        Ok(Self { task_type, task_count })
    }
}

pub(crate) fn require_positive(value: usize, what: &str) -> Result<()> {
    if value == 0 {
        return Err(BenchError::invalid(format!("{what} must be greater than zero")));
    }
    Ok(())
}

/// Всё, что нужно одной задаче: симулятор, общий счётчик и ворота.
///
/// Счётчик только растёт; ворота опускаются ровно один раз на задачу,
/// чем бы она ни закончилась.
#[derive(Clone)]
pub(crate) struct UnitContext {
    strategy: &'static str,
    simulator: Arc<dyn TaskSimulator>,
    task_type: TaskType,
    diagnostics: bool,
    completed: Arc<AtomicUsize>,
    gate: Arc<CompletionGate>,
}

impl UnitContext {
    pub(crate) fn new(
        strategy: &'static str,
        simulator: Arc<dyn TaskSimulator>,
        task_type: TaskType,
        diagnostics: bool,
        gate: Arc<CompletionGate>,
    ) -> Self {
        Self {
            strategy,
            simulator,
            task_type,
            diagnostics,
            completed: Arc::new(AtomicUsize::new(0)),
            gate,
        }
    }

    /// Тот же счётчик, другие ворота.
    pub(crate) fn with_gate(&self, gate: Arc<CompletionGate>) -> Self {
        Self { gate, ..self.clone() }
    }

    #[inline]
    pub(crate) fn completed(&self) -> usize {
        self.completed.load(Ordering::Acquire)
    }

    pub(crate) fn run_blocking(&self, seq: usize) {
        let _done = CountDownOnDrop(&self.gate);
        let started = self.diagnostics.then(Instant::now);
        let outcome = catch_unwind(AssertUnwindSafe(|| self.simulator.run(self.task_type.as_str())))
            .unwrap_or_else(|payload| Err(TaskError::Panic(panic_message(&*payload))));
        self.record(seq, outcome, started);
    }

    pub(crate) async fn run_async(self, seq: usize) {
        let _done = CountDownOnDrop(&self.gate);
        let started = self.diagnostics.then(Instant::now);
        let outcome = self.attempt().await;
        self.record(seq, outcome, started);
    }

    /// Запуск без учёта в счётчике и воротах (прогрев).
    pub(crate) async fn attempt(&self) -> std::result::Result<(), TaskError> {
        AssertUnwindSafe(async { self.simulator.clone().run_async(self.task_type.as_str()).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| Err(TaskError::Panic(panic_message(&*payload))))
    }

    fn record(&self, seq: usize, outcome: std::result::Result<(), TaskError>, started: Option<Instant>) {
        match outcome {
            Ok(()) => {
                self.completed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => warn!(strategy = self.strategy, seq, error = %e, "task failed"),
        }
        if let Some(started) = started {
            let duration_ms = started.elapsed().as_millis() as u64;
            info!(strategy = self.strategy, seq, duration_ms, "task duration");
        }
    }
}

/// Разбирает исход ожидания ворот. Таймаут не фатален.
pub(crate) fn settle_wait(
    strategy: &'static str,
    outcome: GateOutcome,
    bound: Duration,
    gate: &CompletionGate,
) -> Result<()> {
    match outcome {
        GateOutcome::Released => Ok(()),
        GateOutcome::TimedOut => {
            warn!(
                strategy,
                bound_secs = bound.as_secs_f64(),
                unfinished = gate.remaining(),
                "timeout: not all tasks completed"
            );
            Ok(())
        }
        GateOutcome::Cancelled => Err(BenchError::Interrupted),
    }
}

/// Дожидается всех детей scope. При отмене прерывает их и всё равно
/// собирает, чтобы ни одна задача не пережила вызов.
pub(crate) async fn join_scope(scope: &mut TaskScope, cancel: &CancellationToken) -> Result<ScopeReport> {
    let joined = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        report = scope.join() => Some(report),
    };
    match joined {
        Some(report) => Ok(report),
        None => {
            abandon_scope(scope).await;
            Err(BenchError::Interrupted)
        }
    }
}

pub(crate) async fn abandon_scope(scope: &mut TaskScope) {
    scope.cancel();
    let report = scope.join().await;
    debug!(aborted = report.aborted, "scope abandoned");
}

/// Общий прогон для стратегий поверх [`WorkerPool`].
pub(crate) struct PooledRun {
    pub(crate) strategy: &'static str,
    pub(crate) pool: PoolConfig,
    pub(crate) diagnostics: bool,
    pub(crate) wait_timeout: Duration,
    pub(crate) shutdown_timeout: Duration,
}

impl PooledRun {
    pub(crate) async fn execute(
        self,
        simulator: &Arc<dyn TaskSimulator>,
        request: RunRequest,
        cancel: &CancellationToken,
    ) -> Result<Metrics> {
        let pool = WorkerPool::new(self.pool)?;
        let gate = Arc::new(CompletionGate::new(request.task_count));
        let unit = UnitContext::new(
            self.strategy,
            simulator.clone(),
            request.task_type,
            self.diagnostics,
            gate.clone(),
        );

        let start = Instant::now();
        for seq in 0..request.task_count {
            let unit = unit.clone();
            pool.submit(move || unit.run_blocking(seq));
        }

        let outcome = gate.wait_until(self.wait_timeout, cancel).await;
        let end = Instant::now();
        let completed = unit.completed();

        if outcome == GateOutcome::Cancelled {
            let (termination, discarded) = pool.shutdown_now();
            debug!(
                strategy = self.strategy,
                discarded,
                running = termination.running_workers(),
                "run interrupted, pool abandoned"
            );
            return Err(BenchError::Interrupted);
        }
        settle_wait(self.strategy, outcome, self.wait_timeout, &gate)?;

        // задачи после таймаута не прерываются принудительно, они дорабатывают в фоне
        let pending = pool.pending();
        let termination = pool.shutdown();
        let clean = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            clean = termination.wait(self.shutdown_timeout) => Some(clean),
        };
        match clean {
            Some(true) => {}
            Some(false) => warn!(
                strategy = self.strategy,
                pending,
                grace_secs = self.shutdown_timeout.as_secs_f64(),
                "pool did not shut down cleanly"
            ),
            None => return Err(BenchError::Interrupted),
        }

        Ok(Metrics::calculate(
            self.strategy,
            request.task_type,
            start,
            end,
            request.task_count,
            completed,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::any::Any;

    #[test]
    fn test_strategy_choices() {
        assert_eq!(StrategyKind::from_choice(1), Ok(StrategyKind::FixedPool));
        assert_eq!(StrategyKind::from_choice(2), Ok(StrategyKind::ElasticPerTask));
        assert_eq!(StrategyKind::from_choice(3), Ok(StrategyKind::WorkStealing));
        assert_eq!(StrategyKind::from_choice(4), Ok(StrategyKind::StructuredScope));
        assert_eq!(StrategyKind::from_choice(5), Ok(StrategyKind::StructuredBatch));
        assert!(matches!(StrategyKind::from_choice(0), Err(BenchError::InvalidArgument(_))));
        assert!(matches!(StrategyKind::from_choice(6), Err(BenchError::InvalidArgument(_))));
    }

    #[test]
    fn test_request_validation() {
        let req = RunRequest::parse("io", 10).unwrap();
        assert_eq!(req.task_type, TaskType::Io);
        assert_eq!(req.task_count, 10);

        assert!(matches!(RunRequest::parse("BOGUS", 10), Err(BenchError::InvalidArgument(_))));
        assert!(matches!(RunRequest::parse("CPU", -1), Err(BenchError::InvalidArgument(_))));
        assert!(RunRequest::parse("CPU", 0).is_ok());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("static str");
        assert_eq!(panic_message(&*payload), "static str");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(&*payload), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(&*payload), "non-string panic payload");
    }

    struct Panicky;

    impl TaskSimulator for Panicky {
        fn run(&self, _: &str) -> std::result::Result<(), TaskError> {
            panic!("simulator exploded")
        }
    }

    #[tokio::test]
    async fn test_unit_counts_down_on_panic() {
        let gate = Arc::new(CompletionGate::new(2));
        let unit = UnitContext::new("test", Arc::new(Panicky), TaskType::Cpu, true, gate.clone());

        unit.run_blocking(0);
        unit.clone().run_async(1).await;

        assert!(gate.is_open());
        assert_eq!(unit.completed(), 0);
        assert!(matches!(unit.attempt().await, Err(TaskError::Panic(_))));
    }
}
