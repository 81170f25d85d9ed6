#[cfg(test)]
mod tests {
    use std::{future::Future, sync::Arc, time::Instant};
    use threadbench::{
        strategy::{
            BenchmarkStrategy, ElasticStrategy, FixedPoolStrategy, Strategy, StrategyKind, StructuredBatchConfig,
            StructuredBatchStrategy, WorkStealingStrategy,
        },
        task::{SimulatorConfig, TaskSimulator, WorkloadSimulator},
    };

    async fn measure<F, Fut, T>(name: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let start = Instant::now();
        let result = f().await;
        let elapsed = start.elapsed();
        println!("✓ {}: {:?}", name, elapsed);
        result
    }

    fn quick() -> Arc<dyn TaskSimulator> {
        Arc::new(WorkloadSimulator::new(SimulatorConfig::quick()))
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_1_cpu_on_default_strategies() {
        println!("\n=== LOAD TEST 1: 5k CPU задач на каждой стратегии ===");
        for kind in StrategyKind::ALL {
            let strategy = Strategy::with_defaults(kind, quick());
            let m = measure(kind.thread_type(), || strategy.execute("CPU", 5_000)).await.unwrap();
            assert_eq!(m.completed_tasks(), 5_000);
            println!("  Throughput: {} tasks/sec, avg latency {:.3} ms", m.throughput(), m.avg_latency_ms());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_2_io_fixed_vs_stealing() {
        println!("\n=== LOAD TEST 2: 1k IO задач, фиксированный пул против work-stealing ===");
        let fixed = FixedPoolStrategy::new(quick());
        let stealing = WorkStealingStrategy::new(quick());

        let a = measure("fixed pool (100 threads)", || fixed.execute("IO", 1_000)).await.unwrap();
        let b = measure("work stealing", || stealing.execute("IO", 1_000)).await.unwrap();

        assert_eq!(a.completed_tasks(), 1_000);
        assert_eq!(b.completed_tasks(), 1_000);
        println!("{}\n{}", a, b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_3_batches_of_2500() {
        println!("\n=== LOAD TEST 3: 2500 задач пачками по 1000 ===");
        let strategy = StructuredBatchStrategy::with_config(
            StructuredBatchConfig { batch_size: 1000, ..Default::default() },
            quick(),
        )
        .unwrap();

        let m = measure("2500 mixed tasks", || strategy.execute("MIXED", 2_500)).await.unwrap();
        assert_eq!(m.completed_tasks(), 2_500);
        // три пачки по 5 мс IO не могут уложиться быстрее 15 мс
        assert!(m.total_time_ms() >= 15);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_4_elastic_with_warmup() {
        println!("\n=== LOAD TEST 4: 10k лёгких IO задач с прогревом ===");
        let strategy = ElasticStrategy::new(quick());
        let m = measure("10k elastic tasks", || strategy.execute("IO", 10_000)).await.unwrap();
        assert_eq!(m.completed_tasks(), 10_000);
        // все задачи спят параллельно, окно не должно расти линейно
        assert!(m.total_time_ms() < 10_000 * 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn load_test_5_memory_pressure() {
        println!("\n=== LOAD TEST 5: MEMORY задачи ===");
        for kind in StrategyKind::ALL {
            let strategy = Strategy::with_defaults(kind, quick());
            let m = strategy.execute("MEMORY", 500).await.unwrap();
            assert_eq!(m.completed_tasks(), 500);
            println!("  {}: {} KB resident, {} threads", m.thread_type(), m.memory_used_kb(), m.threads_observed());
        }
    }
}
