//! Tracing setup.
//!
//! The subscriber is installed once at startup with `RUST_LOG` or `info`,
//! before configuration is read. Once the configuration is loaded its
//! `logging.level` is swapped in through a reload handle, unless `RUST_LOG`
//! was set, in which case the environment keeps control.

use std::sync::OnceLock;

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

const DEFAULT_LEVEL: &str = "info";

static LOG_RELOAD_HANDLE: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Installs the global subscriber. Later calls are no-ops.
pub fn init_tracing() {
    let filter = if rust_log_set() {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LEVEL))
    } else {
        EnvFilter::new(DEFAULT_LEVEL)
    };

    let (reload_layer, handle) = reload::Layer::new(filter);
    if LOG_RELOAD_HANDLE.set(handle).is_err() {
        return;
    }

    let _ = tracing_subscriber::registry()
        .with(reload_layer)
        .with(fmt::layer())
        .try_init();
}

/// Switches the active filter to `level`.
///
/// Does nothing when `RUST_LOG` is set or tracing was never initialised.
pub fn apply_logging_level(level: &str) -> Result<(), String> {
    if rust_log_set() {
        tracing::debug!("RUST_LOG is set, ignoring logging.level");
        return Ok(());
    }
    let Some(handle) = LOG_RELOAD_HANDLE.get() else {
        return Ok(());
    };

    let filter = filter_for(level)?;
    handle
        .reload(filter)
        .map_err(|e| format!("failed to apply logging.level: {e}"))?;
    tracing::info!(level = %level, "Log level applied");
    Ok(())
}

fn filter_for(level: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(level).map_err(|e| format!("invalid logging.level {level:?}: {e}"))
}

fn rust_log_set() -> bool {
    std::env::var_os("RUST_LOG").is_some()
}
