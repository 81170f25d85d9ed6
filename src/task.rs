//! Типы задач и симулятор нагрузки.

use super::errors::{panic_message, BenchError, Result, TaskError};
use futures::{future::BoxFuture, FutureExt};
use rand::Rng;
use std::{
    fmt,
    fs::File,
    hint::black_box,
    io::{BufRead, BufReader},
    panic::{catch_unwind, AssertUnwindSafe},
    path::PathBuf,
    str::FromStr,
    sync::Arc,
    time::Duration,
};
use tokio::io::AsyncBufReadExt;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Cpu,
    Io,
    Mixed,
    Memory,
}

impl TaskType {
    pub const ALL: [TaskType; 4] = [TaskType::Cpu, TaskType::Io, TaskType::Mixed, TaskType::Memory];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Cpu => "CPU",
            TaskType::Io => "IO",
            TaskType::Mixed => "MIXED",
            TaskType::Memory => "MEMORY",
        }
    }

    /// Номер пункта меню CLI: 1 = CPU, 2 = IO, 3 = MIXED, 4 = MEMORY.
    pub fn from_choice(choice: u32) -> Result<Self> {
        match choice {
            1 => Ok(TaskType::Cpu),
            2 => Ok(TaskType::Io),
            3 => Ok(TaskType::Mixed),
            4 => Ok(TaskType::Memory),
            other => Err(BenchError::invalid(format!("invalid task type choice: {other}"))),
        }
    }
}

impl FromStr for TaskType {
    type Err = TaskError;

    fn from_str(tag: &str) -> std::result::Result<Self, Self::Err> {
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| TaskError::UnknownTaskType(tag.to_string()))
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Внешний исполнитель одной единицы работы.
///
/// `run` блокирует вызывающий поток и используется пулами ОС-потоков.
/// `run_async` предназначен для стратегий на tokio-задачах. Реализация по
/// умолчанию уносит `run` в блокирующий пул tokio через [`offload`], чтобы
/// синхронный симулятор не занимал воркеры рантайма.
pub trait TaskSimulator: Send + Sync + 'static {
    fn run(&self, task_type: &str) -> std::result::Result<(), TaskError>;

    fn run_async(self: Arc<Self>, task_type: &str) -> BoxFuture<'static, std::result::Result<(), TaskError>> {
        let task_type = task_type.to_owned();
        offload(move || self.run(&task_type))
    }
}

/// Выполняет блокирующую работу на `spawn_blocking`.
///
/// Паника внутри превращается в `TaskError::Panic`, сбой join в `Failed`.
/// Вызывать только внутри рантайма tokio.
pub fn offload<F>(work: F) -> BoxFuture<'static, std::result::Result<(), TaskError>>
where
    F: FnOnce() -> std::result::Result<(), TaskError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || catch_unwind(AssertUnwindSafe(work)))
        .map(|joined| match joined {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(payload)) => Err(TaskError::Panic(panic_message(&*payload))),
            Err(join_err) => Err(TaskError::Failed(join_err.to_string())),
        })
        .boxed()
}

/// Параметры синтетической нагрузки
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    pub io_latency: Duration,
    pub sample_file: Option<PathBuf>,
    pub cpu_prime: u64,
    pub mixed_iterations: u32,
    pub memory_cells: usize,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            io_latency: Duration::from_millis(50),
            sample_file: Some(PathBuf::from("data/sample.txt")),
            cpu_prime: 15_485_863,
            mixed_iterations: 10_000,
            memory_cells: 5_000_000,
        }
    }
}

impl SimulatorConfig {
    /// Облегчённая нагрузка для тестов и бенчмарков.
    pub fn quick() -> Self {
        Self {
            io_latency: Duration::from_millis(5),
            sample_file: None,
            cpu_prime: 104_729,
            mixed_iterations: 1_000,
            memory_cells: 50_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct WorkloadSimulator {
    config: SimulatorConfig,
}

impl WorkloadSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn cpu(&self) -> bool {
        let n = self.config.cpu_prime;
        let mut i = 2u64;
        while i * i <= n {
            if n % i == 0 {
                return false;
            }
            i += 1;
        }
        true
    }

    fn read_sample_line(&self) {
        let Some(path) = &self.config.sample_file else { return };
        let mut line = String::new();
        // файла может не быть, это не ошибка задачи
        match File::open(path).map(BufReader::new) {
            Ok(mut reader) => {
                let _ = reader.read_line(&mut line);
            }
            Err(e) => trace!(path = %path.display(), %e, "sample file unavailable"),
        }
        black_box(line);
    }

    fn io_blocking(&self) {
        std::thread::sleep(self.config.io_latency);
        self.read_sample_line();
    }

    fn log_sum(&self) -> f64 {
        (1..=self.config.mixed_iterations).map(|i| f64::from(i).ln()).sum()
    }

    fn memory(&self) -> i64 {
        let mut cells = vec![0i32; self.config.memory_cells];
        rand::thread_rng().fill(&mut cells[..]);
        cells.iter().map(|&c| i64::from(c)).sum()
    }
}

async fn io_async(config: &SimulatorConfig) {
    tokio::time::sleep(config.io_latency).await;
    let Some(path) = &config.sample_file else { return };
    let mut line = String::new();
    match tokio::fs::File::open(path).await {
        Ok(file) => {
            let _ = tokio::io::BufReader::new(file).read_line(&mut line).await;
        }
        Err(e) => trace!(path = %path.display(), %e, "sample file unavailable"),
    }
    black_box(line);
}

impl TaskSimulator for WorkloadSimulator {
    fn run(&self, task_type: &str) -> std::result::Result<(), TaskError> {
        match task_type.parse::<TaskType>()? {
            TaskType::Cpu => {
                black_box(self.cpu());
            }
            TaskType::Io => self.io_blocking(),
            TaskType::Mixed => {
                self.io_blocking();
                black_box(self.log_sum());
            }
            TaskType::Memory => {
                black_box(self.memory());
            }
        }
        Ok(())
    }

    fn run_async(self: Arc<Self>, task_type: &str) -> BoxFuture<'static, std::result::Result<(), TaskError>> {
        match task_type.parse::<TaskType>() {
            Ok(TaskType::Io) => async move {
                io_async(&self.config).await;
                Ok(())
            }
            .boxed(),
            Ok(TaskType::Mixed) => async move {
                io_async(&self.config).await;
                black_box(self.log_sum());
                Ok(())
            }
            .boxed(),
            // CPU и MEMORY занимают поток целиком
            Ok(other) => offload(move || self.run(other.as_str())),
            Err(e) => futures::future::ready(Err(e)).boxed(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("cpu".parse::<TaskType>(), Ok(TaskType::Cpu));
        assert_eq!("Io".parse::<TaskType>(), Ok(TaskType::Io));
        assert_eq!("MEMORY".parse::<TaskType>(), Ok(TaskType::Memory));
        assert_eq!(
            "BOGUS".parse::<TaskType>(),
            Err(TaskError::UnknownTaskType("BOGUS".into()))
        );
    }

    #[test]
    fn test_choices() {
        assert_eq!(TaskType::from_choice(1), Ok(TaskType::Cpu));
        assert_eq!(TaskType::from_choice(3), Ok(TaskType::Mixed));
        assert_eq!(TaskType::from_choice(4), Ok(TaskType::Memory));
        assert!(matches!(TaskType::from_choice(0), Err(BenchError::InvalidArgument(_))));
        assert!(matches!(TaskType::from_choice(5), Err(BenchError::InvalidArgument(_))));
    }

    #[test]
    fn test_cpu_prime_check() {
        let sim = WorkloadSimulator::default();
        assert!(sim.cpu());
        let composite = WorkloadSimulator::new(SimulatorConfig { cpu_prime: 91, ..SimulatorConfig::quick() });
        assert!(!composite.cpu());
    }

    #[test]
    fn test_run_all_types() {
        let sim = WorkloadSimulator::new(SimulatorConfig::quick());
        for t in TaskType::ALL {
            assert_eq!(sim.run(t.as_str()), Ok(()));
        }
        assert_eq!(sim.run("BOGUS"), Err(TaskError::UnknownTaskType("BOGUS".into())));
    }

    #[test]
    fn test_missing_sample_file_is_ignored() {
        let sim = WorkloadSimulator::new(SimulatorConfig {
            sample_file: Some(PathBuf::from("does/not/exist.txt")),
            ..SimulatorConfig::quick()
        });
        assert_eq!(sim.run("IO"), Ok(()));
    }

    #[tokio::test]
    async fn test_run_async() {
        let sim = Arc::new(WorkloadSimulator::new(SimulatorConfig::quick()));
        for t in TaskType::ALL {
            assert_eq!(sim.clone().run_async(t.as_str()).await, Ok(()));
        }
        assert!(matches!(sim.run_async("nope").await, Err(TaskError::UnknownTaskType(_))));
    }

    struct SyncOnly(Duration);

    impl TaskSimulator for SyncOnly {
        fn run(&self, task_type: &str) -> std::result::Result<(), TaskError> {
            if task_type == "PANIC" {
                panic!("sync simulator crashed");
            }
            std::thread::sleep(self.0);
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 1)]
    async fn test_default_run_async_leaves_runtime_workers_free() {
        let sim = Arc::new(SyncOnly(Duration::from_millis(100)));
        let started = std::time::Instant::now();

        // единственный воркер рантайма не должен выполнять их по очереди
        let outcomes = futures::future::join_all((0..10).map(|_| sim.clone().run_async("CPU"))).await;

        assert!(outcomes.iter().all(|o| o.is_ok()));
        assert!(started.elapsed() < Duration::from_millis(600), "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_offload_reports_panic() {
        let sim = Arc::new(SyncOnly(Duration::ZERO));
        assert_eq!(
            sim.run_async("PANIC").await,
            Err(TaskError::Panic("sync simulator crashed".into()))
        );
    }
}
