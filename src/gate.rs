use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::{sync::Notify, time::Duration};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateOutcome {
    Released,
    TimedOut,
    Cancelled,
}

/// Ворота обратного отсчёта: открываются после `count` сигналов.
///
/// Счётчик только убывает и никогда не уходит ниже нуля. `count_down`
/// можно вызывать из любого потока, в том числе не из рантайма tokio.
#[derive(Debug)]
pub struct CompletionGate {
    remaining: AtomicUsize,
    notify: Notify,
}

impl CompletionGate {
    pub fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
        }
    }

    #[inline]
    pub fn count_down(&self) {
        let prev = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if prev == Ok(1) {
            self.notify.notify_waiters();
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.remaining() == 0
    }

    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // регистрируемся до проверки, иначе можно пропустить notify_waiters
            notified.as_mut().enable();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }

    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait()).await.is_ok()
    }

    pub async fn wait_until(&self, timeout: Duration, cancel: &CancellationToken) -> GateOutcome {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => GateOutcome::Cancelled,
            released = self.wait_timeout(timeout) => {
                if released { GateOutcome::Released } else { GateOutcome::TimedOut }
            }
        }
    }
}

/// Опускает ворота при выходе из области видимости, в том числе при панике.
pub(crate) struct CountDownOnDrop<'a>(pub(crate) &'a CompletionGate);

impl Drop for CountDownOnDrop<'_> {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_zero_gate_is_open() {
        let gate = CompletionGate::new(0);
        assert!(gate.is_open());
        assert!(gate.wait_timeout(Duration::from_millis(10)).await);
    }

    #[tokio::test]
    async fn test_count_down_never_underflows() {
        let gate = CompletionGate::new(2);
        gate.count_down();
        gate.count_down();
        gate.count_down();
        assert_eq!(gate.remaining(), 0);
    }

    #[tokio::test]
    async fn test_times_out_when_signals_missing() {
        let gate = CompletionGate::new(3);
        gate.count_down();
        assert!(!gate.wait_timeout(Duration::from_millis(20)).await);
        assert_eq!(gate.remaining(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_released_from_os_threads() {
        let gate = Arc::new(CompletionGate::new(8));
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let gate = gate.clone();
                std::thread::spawn(move || {
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    gate.count_down();
                })
            })
            .collect();

        assert!(gate.wait_timeout(Duration::from_secs(5)).await);
        for t in threads {
            t.join().unwrap();
        }
    }

    #[tokio::test]
    async fn test_cancelled_wait() {
        let gate = CompletionGate::new(1);
        let token = CancellationToken::new();
        token.cancel();
        assert_eq!(
            gate.wait_until(Duration::from_secs(60), &token).await,
            GateOutcome::Cancelled
        );
    }

    #[test]
    fn test_drop_guard_counts_down_on_panic() {
        let gate = CompletionGate::new(1);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = CountDownOnDrop(&gate);
            panic!("boom");
        }));
        assert!(result.is_err());
        assert!(gate.is_open());
    }
}
