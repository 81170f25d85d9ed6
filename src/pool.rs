use super::{errors::BenchError, gate::CompletionGate};
use crossbeam::{
    deque::{Injector, Steal, Stealer, Worker},
    sync::{Parker, Unparker},
};
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    thread,
};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Сколько спит простаивающий воркер, если его никто не разбудил
const IDLE_PARK: Duration = Duration::from_millis(5);

/// Конфигурация пула потоков
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub num_threads: usize,
    pub enable_work_stealing: bool,
    pub thread_name: String,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::work_stealing(num_cpus::get())
    }
}

impl PoolConfig {
    /// Строгая FIFO-очередь без кражи работы.
    pub fn fixed(num_threads: usize) -> Self {
        Self {
            num_threads,
            enable_work_stealing: false,
            thread_name: "fixed-pool".into(),
        }
    }

    pub fn work_stealing(num_threads: usize) -> Self {
        Self {
            num_threads,
            enable_work_stealing: true,
            thread_name: "work-stealing".into(),
        }
    }
}

struct Shared {
    inject: Injector<Job>,
    stealers: Vec<Stealer<Job>>,
    unparkers: Vec<Unparker>,
    next_wake: AtomicUsize,
    queued: AtomicUsize,
    shutdown: CancellationToken,
    enable_work_stealing: bool,
}

impl Shared {
    #[inline]
    fn wake_one(&self) {
        let idx = self.next_wake.fetch_add(1, Ordering::Relaxed) % self.unparkers.len();
        self.unparkers[idx].unpark();
    }

    fn close(&self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        self.shutdown.cancel();
        for u in &self.unparkers {
            u.unpark();
        }
    }

    fn find_job(&self, local: &Worker<Job>, index: usize, rng: &mut u64) -> Option<Job> {
        local
            .pop()
            .or_else(|| {
                if self.enable_work_stealing {
                    steal_settled(|| self.inject.steal_batch_and_pop(local))
                } else {
                    steal_settled(|| self.inject.steal())
                }
            })
            .or_else(|| {
                let victims = self.stealers.len();
                if !self.enable_work_stealing || victims < 2 {
                    return None;
                }

                *rng ^= *rng << 13;
                *rng ^= *rng >> 7;
                *rng ^= *rng << 17;
                let first = (*rng as usize) % victims;

                (0..victims)
                    .map(|k| (first + k) % victims)
                    .filter(|&v| v != index)
                    .find_map(|v| steal_settled(|| self.stealers[v].steal()))
            })
    }

    fn worker_loop(&self, index: usize, local: Worker<Job>, parker: Parker) {
        let mut rng = 0x9E37_79B9_7F4A_7C15u64 ^ (index as u64 + 1);

        loop {
            match self.find_job(&local, index, &mut rng) {
                Some(job) => {
                    self.queued.fetch_sub(1, Ordering::Relaxed);
                    if !self.inject.is_empty() {
                        self.wake_one();
                    }
                    // джобы стратегий сами ловят панику, это последний рубеж
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        warn!(worker = index, "job panicked inside pool worker");
                    }
                }
                None if self.shutdown.is_cancelled() => break,
                None => parker.park_timeout(IDLE_PARK),
            }
        }
    }
}

fn steal_settled<T>(mut attempt: impl FnMut() -> Steal<T>) -> Option<T> {
    loop {
        match attempt() {
            Steal::Success(t) => return Some(t),
            Steal::Empty => return None,
            Steal::Retry => std::hint::spin_loop(),
        }
    }
}

struct ExitSignal(Arc<CompletionGate>);

impl Drop for ExitSignal {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

/// Пул ОС-потоков фиксированного размера.
///
/// Все задачи попадают в общий injector. В режиме work-stealing воркеры
/// забирают их пачками в локальные деки и крадут друг у друга; в
/// фиксированном режиме каждый воркер берёт по одной задаче из общей очереди.
/// Пул принадлежит одному прогону и не переиспользуется.
pub struct WorkerPool {
    shared: Arc<Shared>,
    exited: Arc<CompletionGate>,
    name: String,
}

impl WorkerPool {
    pub fn new(config: PoolConfig) -> Result<Self, BenchError> {
        if config.num_threads == 0 {
            return Err(BenchError::invalid("pool needs at least one thread"));
        }

        let mut workers = Vec::with_capacity(config.num_threads);
        let mut stealers = Vec::with_capacity(config.num_threads);
        let mut parkers = Vec::with_capacity(config.num_threads);
        let mut unparkers = Vec::with_capacity(config.num_threads);

        for _ in 0..config.num_threads {
            let w = if config.enable_work_stealing {
                Worker::new_lifo()
            } else {
                Worker::new_fifo()
            };
            stealers.push(w.stealer());
            workers.push(w);
            let p = Parker::new();
            unparkers.push(p.unparker().clone());
            parkers.push(p);
        }

        let shared = Arc::new(Shared {
            inject: Injector::new(),
            stealers,
            unparkers,
            next_wake: AtomicUsize::new(0),
            queued: AtomicUsize::new(0),
            shutdown: CancellationToken::new(),
            enable_work_stealing: config.enable_work_stealing,
        });
        let exited = Arc::new(CompletionGate::new(config.num_threads));

        let mut started = 0;
        let mut last_error = None;
        for (index, (local, parker)) in workers.into_iter().zip(parkers).enumerate() {
            let shared_clone = shared.clone();
            let signal = ExitSignal(exited.clone());
            let spawned = thread::Builder::new()
                .name(format!("{}-{}", config.thread_name, index))
                .spawn(move || {
                    let _signal = signal;
                    shared_clone.worker_loop(index, local, parker);
                });

            match spawned {
                Ok(_) => started += 1,
                // замыкание не запустилось, ExitSignal уже отработал при drop
                Err(e) => {
                    warn!(%e, worker = index, pool = %config.thread_name, "failed to spawn worker thread");
                    last_error = Some(e);
                }
            }
        }

        if started == 0 {
            shared.close();
            let reason = last_error.map(|e| e.to_string()).unwrap_or_default();
            return Err(BenchError::PoolStartup(reason));
        }

        debug!(pool = %config.thread_name, workers = started, stealing = config.enable_work_stealing, "worker pool started");
        Ok(Self {
            shared,
            exited,
            name: config.thread_name,
        })
    }

    #[inline]
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.shared.queued.fetch_add(1, Ordering::Relaxed);
        self.shared.inject.push(Box::new(job));
        self.shared.wake_one();
    }

    /// Задачи, которые ещё не взяты ни одним воркером.
    pub fn pending(&self) -> usize {
        self.shared.queued.load(Ordering::Relaxed)
    }

    pub fn workers(&self) -> usize {
        self.shared.stealers.len()
    }

    /// Прекращает приём задач. Уже поставленные в очередь задачи доработают.
    pub fn shutdown(self) -> Termination {
        self.shared.close();
        Termination {
            exited: self.exited.clone(),
            name: self.name.clone(),
        }
    }

    /// Закрывает пул и выбрасывает все ещё не начатые задачи: и общую
    /// очередь, и локальные деки воркеров, куда их унёс `steal_batch_and_pop`.
    /// Задачи, которые уже выполняются, доработают.
    pub fn shutdown_now(self) -> (Termination, usize) {
        self.shared.close();
        let mut discarded = 0;
        let mut discard = |job: Job| {
            drop(job);
            self.shared.queued.fetch_sub(1, Ordering::Relaxed);
            discarded += 1;
        };
        while let Some(job) = steal_settled(|| self.shared.inject.steal()) {
            discard(job);
        }
        for stealer in &self.shared.stealers {
            while let Some(job) = steal_settled(|| stealer.steal()) {
                discard(job);
            }
        }
        (self.shutdown(), discarded)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.close();
    }
}

/// Ожидание завершения воркеров после shutdown.
pub struct Termination {
    exited: Arc<CompletionGate>,
    name: String,
}

impl Termination {
    pub async fn wait(self, timeout: Duration) -> bool {
        let clean = self.exited.wait_timeout(timeout).await;
        if clean {
            debug!(pool = %self.name, "worker pool terminated");
        }
        clean
    }

    pub fn running_workers(&self) -> usize {
        self.exited.remaining()
    }
}
