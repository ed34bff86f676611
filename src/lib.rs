pub mod args;
pub mod arraychar;
pub mod error;
pub mod metrics;
pub mod model;
pub mod profilers;
pub mod result;
pub mod run_main;
pub mod settings;

use tracing::metadata::LevelFilter;

/// Install the global tracing subscriber; harmless when one is already set.
pub fn init_logger() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .try_init()
        .unwrap_or_else(|e| {
            eprintln!("failed to init logger: {}", e);
        });
}
