use std::fs;
use std::path::Path;

use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod bracket;
pub mod config;
pub mod error;
pub mod graph_sync;
pub mod intake;
pub mod progression;
pub mod standings;
pub mod storage;
pub mod types;

pub use config::{load_engine_config, EngineConfig};
pub use error::{EngineError, EngineResult};
pub use progression::{ProgressionEngine, StepOutcome, TriggerReport};
pub use storage::{MemoryStore, TournamentStore};

/// Tracing with file + stderr output. Embedders call this once at startup;
/// the returned guard must stay alive or buffered log lines are dropped.
pub fn init_tracing(logs_dir: &Path) -> tracing_appender::non_blocking::WorkerGuard {
    fs::create_dir_all(logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(logs_dir, "engine.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("tournament progression engine starting");
    guard
}
