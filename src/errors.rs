use std::any::Any;
use thiserror::Error;

/// Ошибки, которые могут выйти из `execute`.
///
/// Кроме `InvalidArgument` наружу выходят `Interrupted` (вызывающий отменил
/// ожидание) и `PoolStartup` (не запустился ни один поток пула; частичный
/// отказ только логируется, и пул работает меньшим составом).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BenchError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("benchmark interrupted while waiting for tasks")]
    Interrupted,

    /// Не удалось поднять ни одного рабочего потока.
    #[error("failed to start worker pool: {0}")]
    PoolStartup(String),
}

/// Ошибка одной единицы работы. Никогда не покидает стратегию.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskError {
    #[error("unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("task failed: {0}")]
    Failed(String),

    #[error("task panicked: {0}")]
    Panic(String),
}

pub type Result<T> = std::result::Result<T, BenchError>;

impl BenchError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        BenchError::InvalidArgument(msg.into())
    }
}

/// Текст паники, если он строковый.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".into())
}
