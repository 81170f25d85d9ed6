use super::model::ScopeReport;
use std::future::Future;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// Структурная группа задач: ни одна дочерняя задача не переживает scope.
///
/// `join` дожидается всех детей. Если scope уничтожается без join
/// (ошибка, отмена внешнего future), оставшиеся задачи прерываются.
pub struct TaskScope {
    children: JoinSet<()>,
    name: &'static str,
    report: ScopeReport,
}

impl TaskScope {
    pub fn new(name: &'static str) -> Self {
        Self {
            children: JoinSet::new(),
            name,
            report: ScopeReport::default(),
        }
    }

    #[inline]
    pub fn fork<F>(&mut self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.children.spawn(fut);
    }

    /// Дети, которые ещё не были собраны join-ом.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn cancel(&mut self) {
        self.children.abort_all();
    }

    /// Собирает всех детей. Безопасно отменять: уже собранные дети
    /// остаются учтены, остальные дособираются следующим вызовом.
    pub async fn join(&mut self) -> ScopeReport {
        while let Some(res) = self.children.join_next().await {
            match res {
                Ok(()) => self.report.joined += 1,
                Err(e) if e.is_panic() => {
                    warn!(scope = self.name, "child task panicked");
                    self.report.panicked += 1;
                }
                Err(_) => self.report.aborted += 1,
            }
        }
        debug!(scope = self.name, joined = self.report.joined, panicked = self.report.panicked, aborted = self.report.aborted, "scope joined");
        self.report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };
    use tokio::time::Duration;

    #[tokio::test]
    async fn test_join_waits_for_all_children() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scope = TaskScope::new("test");
        for i in 0..50u64 {
            let counter = counter.clone();
            scope.fork(async move {
                tokio::time::sleep(Duration::from_millis(i % 5)).await;
                counter.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert_eq!(scope.len(), 50);

        let report = scope.join().await;
        assert_eq!(counter.load(Ordering::Relaxed), 50);
        assert_eq!(report.joined, 50);
        assert!(report.is_clean());
        assert!(scope.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_aborts_children() {
        let mut scope = TaskScope::new("test");
        for _ in 0..5 {
            scope.fork(async {
                tokio::time::sleep(Duration::from_secs(60)).await;
            });
        }
        scope.cancel();
        let report = scope.join().await;
        assert_eq!(report.aborted, 5);
        assert_eq!(report.total(), 5);
    }

    #[tokio::test]
    async fn test_panicking_child_is_reported() {
        let mut scope = TaskScope::new("test");
        scope.fork(async { panic!("child") });
        scope.fork(async {});
        let report = scope.join().await;
        assert_eq!(report.panicked, 1);
        assert_eq!(report.joined, 1);
        assert!(!report.is_clean());
    }
}
