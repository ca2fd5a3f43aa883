//! Logging utilities and structured logging support

pub use log::{debug, error, info, trace, warn};

use crate::config::EngineConfig;

/// Initialize the logging system from `RUST_LOG`
///
/// Safe to call more than once; later calls are ignored.
pub fn init() {
    let _ = env_logger::try_init();
}

/// Initialize the logging system with a default level filter
///
/// `RUST_LOG` still overrides `level` when it is set.
pub fn init_with_level(level: &str) {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

/// Initialize the logging system at `config.log_level`
pub fn init_from_config(config: &EngineConfig) {
    init_with_level(&config.log_level);
}
