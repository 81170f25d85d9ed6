use clap::Parser;
use std::{path::PathBuf, process::ExitCode, sync::Arc};
use threadbench::{
    BenchmarkRunner, Result, SimulatorConfig, Strategy, StrategyArgs, StrategyKind, TaskType, WorkloadSimulator,
};
use tokio::runtime::Builder;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Benchmark one task-execution strategy against a synthetic workload.
#[derive(Debug, Parser)]
#[command(name = "threadbench", version)]
struct Args {
    /// 1 = fixed pool, 2 = elastic per-task, 3 = work stealing, 4 = structured scope, 5 = structured batch
    strategy: u32,

    /// 1 = CPU, 2 = IO, 3 = MIXED, 4 = MEMORY
    task: u32,

    /// Number of tasks to run
    #[arg(allow_negative_numbers = true)]
    count: i64,

    /// File read by IO and MIXED tasks
    #[arg(long, default_value = "data/sample.txt")]
    sample_file: PathBuf,

    /// Worker threads of the tokio runtime
    #[arg(long)]
    runtime_threads: Option<usize>,

    #[command(flatten)]
    strategy_args: StrategyArgs,
}

async fn run(args: Args) -> Result<()> {
    // неверный выбор отвергается до создания стратегии
    let kind = StrategyKind::from_choice(args.strategy)?;
    let task_type = TaskType::from_choice(args.task)?;

    let simulator = Arc::new(WorkloadSimulator::new(SimulatorConfig {
        sample_file: Some(args.sample_file),
        ..SimulatorConfig::default()
    }));
    let strategy: Strategy = args.strategy_args.build(kind, simulator)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping benchmark");
            ctrl_c.cancel();
        }
    });

    info!(strategy = kind.thread_type(), task_type = %task_type, count = args.count, "running benchmark");
    BenchmarkRunner::default()
        .run_until(&strategy, task_type.as_str(), args.count, &cancel)
        .await?;
    Ok(())
}

fn main() -> ExitCode {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .init();

    let args = Args::parse();

    let mut builder = Builder::new_multi_thread();
    if let Some(threads) = args.runtime_threads {
        builder.worker_threads(threads.max(1));
    }
    let rt = match builder.enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!(%e, "failed to build tokio runtime");
            return ExitCode::FAILURE;
        }
    };

    match rt.block_on(run(args)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(%e, "benchmark failed");
            ExitCode::FAILURE
        }
    }
}
