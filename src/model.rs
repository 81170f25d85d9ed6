use super::task::TaskType;
use std::{
    fmt,
    time::{Duration, Instant},
};

/// Снимок ресурсов процесса в момент измерения.
/// Носит справочный характер: это не поштучный замер памяти задач.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceSnapshot {
    pub memory_kb: u64,
    pub live_threads: u64,
}

impl ResourceSnapshot {
    /// На Linux читает `VmRSS` и `Threads` из `/proc/self/status`, иначе нули.
    pub fn capture() -> Self {
        std::fs::read_to_string("/proc/self/status")
            .map(|status| Self::parse_status(&status))
            .unwrap_or_default()
    }

    fn parse_status(status: &str) -> Self {
        let field = |name: &str| {
            status
                .lines()
                .find_map(|line| line.strip_prefix(name))
                .and_then(|rest| rest.split_whitespace().next())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(0)
        };
        Self {
            memory_kb: field("VmRSS:"),
            live_threads: field("Threads:"),
        }
    }
}

/// Результат одного прогона бенчмарка. Создаётся один раз и не меняется.
#[derive(Debug, Clone, PartialEq)]
pub struct Metrics {
    thread_type: String,
    task_type: TaskType,
    total_time_ms: u64,
    throughput: u64,
    avg_latency_ms: f64,
    memory_used_kb: u64,
    threads_observed: u64,
    completed_tasks: usize,
}

impl Metrics {
    pub fn calculate(
        thread_type: &str,
        task_type: TaskType,
        start: Instant,
        end: Instant,
        task_count: usize,
        completed_tasks: usize,
    ) -> Self {
        Self::derive(
            thread_type,
            task_type,
            end.saturating_duration_since(start),
            task_count,
            completed_tasks,
            ResourceSnapshot::capture(),
        )
    }

    /// Чистая арифметика без ввода-вывода.
    pub fn derive(
        thread_type: &str,
        task_type: TaskType,
        elapsed: Duration,
        task_count: usize,
        completed_tasks: usize,
        resources: ResourceSnapshot,
    ) -> Self {
        let completed_tasks = completed_tasks.min(task_count);
        let total_time_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let completed = completed_tasks as u64;
        let throughput = if total_time_ms == 0 {
            completed
        } else {
            completed.saturating_mul(1000) / total_time_ms
        };
        let avg_latency_ms = total_time_ms as f64 / completed.max(1) as f64;

        Self {
            thread_type: thread_type.to_string(),
            task_type,
            total_time_ms,
            throughput,
            avg_latency_ms,
            memory_used_kb: resources.memory_kb,
            threads_observed: resources.live_threads,
            completed_tasks,
        }
    }

    pub fn thread_type(&self) -> &str {
        &self.thread_type
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn total_time_ms(&self) -> u64 {
        self.total_time_ms
    }

    /// Завершённых задач в секунду
    pub fn throughput(&self) -> u64 {
        self.throughput
    }

    pub fn avg_latency_ms(&self) -> f64 {
        self.avg_latency_ms
    }

    pub fn memory_used_kb(&self) -> u64 {
        self.memory_used_kb
    }

    pub fn threads_observed(&self) -> u64 {
        self.threads_observed
    }

    pub fn completed_tasks(&self) -> usize {
        self.completed_tasks
    }

    pub fn format(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Metrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- Results ---")?;
        writeln!(f, "Thread Type     : {}", self.thread_type)?;
        writeln!(f, "Task Type       : {}", self.task_type)?;
        writeln!(f, "Total Time      : {} ms", self.total_time_ms)?;
        writeln!(f, "Throughput      : {} tasks/sec", self.throughput)?;
        writeln!(f, "Avg Latency     : {:.2} ms", self.avg_latency_ms)?;
        writeln!(f, "Memory Used     : {} KB", self.memory_used_kb)?;
        writeln!(f, "Threads Created : {}", self.threads_observed)?;
        writeln!(f, "Tasks Completed : {}", self.completed_tasks)
    }
}

/// Итог join-а структурного scope.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScopeReport {
    pub joined: usize,
    pub panicked: usize,
    pub aborted: usize,
}

impl ScopeReport {
    pub fn total(&self) -> usize {
        self.joined + self.panicked + self.aborted
    }

    pub fn is_clean(&self) -> bool {
        self.panicked == 0 && self.aborted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn derive(ms: u64, task_count: usize, completed: usize) -> Metrics {
        Metrics::derive(
            "FixedPool",
            TaskType::Cpu,
            Duration::from_millis(ms),
            task_count,
            completed,
            ResourceSnapshot { memory_kb: 2048, live_threads: 7 },
        )
    }

    #[test]
    fn test_zero_time_falls_back_to_completed_count() {
        let m = derive(0, 50, 50);
        assert_eq!(m.total_time_ms(), 0);
        assert_eq!(m.throughput(), 50);
        assert_eq!(m.avg_latency_ms(), 0.0);
    }

    #[test]
    fn test_regular_throughput_and_latency() {
        let m = derive(2000, 100, 100);
        assert_eq!(m.throughput(), 50);
        assert_eq!(m.avg_latency_ms(), 20.0);
    }

    #[test]
    fn test_no_completed_tasks() {
        let m = derive(1500, 10, 0);
        assert_eq!(m.throughput(), 0);
        assert_eq!(m.avg_latency_ms(), 1500.0);
        assert_eq!(m.completed_tasks(), 0);

        let empty = derive(0, 0, 0);
        assert_eq!(empty.throughput(), 0);
    }

    #[test]
    fn test_completed_never_exceeds_task_count() {
        let m = derive(1000, 10, 25);
        assert_eq!(m.completed_tasks(), 10);
        assert_eq!(m.throughput(), 10);
    }

    #[test]
    fn test_throughput_floors() {
        let m = derive(3000, 10, 10);
        assert_eq!(m.throughput(), 3);
    }

    #[test]
    fn test_format_contains_all_fields() {
        let m = Metrics::derive(
            "WorkStealing",
            TaskType::Io,
            Duration::from_millis(1234),
            200,
            150,
            ResourceSnapshot { memory_kb: 4096, live_threads: 12 },
        );
        let text = m.format();
        let expected = "--- Results ---\n\
                        Thread Type     : WorkStealing\n\
                        Task Type       : IO\n\
                        Total Time      : 1234 ms\n\
                        Throughput      : 121 tasks/sec\n\
                        Avg Latency     : 8.23 ms\n\
                        Memory Used     : 4096 KB\n\
                        Threads Created : 12\n\
                        Tasks Completed : 150\n";
        assert_eq!(text, expected);
        assert_eq!(text, m.to_string());
    }

    #[test]
    fn test_parse_proc_status() {
        let status = "Name:\tthreadbench\nVmPeak:\t  9000 kB\nVmRSS:\t  5120 kB\nThreads:\t9\n";
        let snap = ResourceSnapshot::parse_status(status);
        assert_eq!(snap, ResourceSnapshot { memory_kb: 5120, live_threads: 9 });
        assert_eq!(ResourceSnapshot::parse_status(""), ResourceSnapshot::default());
    }

    #[test]
    fn test_calculate_clamps_reversed_instants() {
        let end = Instant::now();
        let start = end + Duration::from_millis(5);
        let m = Metrics::calculate("StructuredScope", TaskType::Mixed, start, end, 3, 3);
        assert_eq!(m.total_time_ms(), 0);
        assert_eq!(m.throughput(), 3);
    }
}
