//! Бенчмарк стратегий параллельного исполнения задач
//!
//! # Features
//! - Пять взаимозаменяемых стратегий: фиксированный пул, задача на каждую
//!   единицу работы, work-stealing, структурный scope и структурные пачки
//! - Ворота завершения с ограниченным по времени ожиданием
//! - Ошибки и паники отдельных задач не прерывают прогон
//! - Отмена ожидания через `CancellationToken`
//! - Метрики пропускной способности, задержки и ресурсов процесса

pub mod config;
pub mod errors;
pub mod gate;
pub mod model;
pub mod pool;
pub mod runner;
pub mod scope;
pub mod strategy;
pub mod task;

pub use config::StrategyArgs;
pub use errors::{BenchError, Result, TaskError};
pub use model::Metrics;
pub use runner::{BenchmarkRunner, ReportSink, TracingSink};
pub use strategy::{BenchmarkStrategy, Strategy, StrategyKind};
pub use task::{SimulatorConfig, TaskSimulator, TaskType, WorkloadSimulator};
