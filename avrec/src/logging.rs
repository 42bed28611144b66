//! Logging bootstrap
//!
//! The library only emits `tracing` events. Hosts that do not install their
//! own subscriber can call [`init_logging`] once at startup.

use avrec_core::{RecorderError, RecorderResult};
use tracing_subscriber::EnvFilter;

/// Environment variable read by [`init_logging`]
pub const LOG_ENV: &str = "AVREC_LOG";

const DEFAULT_FILTER: &str = "info";

/// Install a formatting subscriber filtered by `AVREC_LOG` (default `info`)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_logging() -> bool {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    install(filter)
}

/// Install a formatting subscriber with an explicit filter directive
///
/// ```rust,no_run
/// avrec::init_logging_with("avrec=debug,avrec_media=trace")?;
/// # Ok::<(), avrec::RecorderError>(())
/// ```
pub fn init_logging_with(filter: &str) -> RecorderResult<bool> {
    let filter = EnvFilter::try_new(filter).map_err(|e| RecorderError::InvalidConfiguration {
        message: format!("Invalid log filter '{}': {}", filter, e),
    })?;
    Ok(install(filter))
}

fn install(filter: EnvFilter) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
