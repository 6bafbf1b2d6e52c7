//! Tracing subscriber setup.

use std::sync::OnceLock;

use tracing_subscriber::EnvFilter;

pub const DEFAULT_FILTER: &str = "info";

static INSTALLED: OnceLock<bool> = OnceLock::new();

/// Installs a stderr fmt subscriber filtered by `filter`.
///
/// Only the first call has an effect; later calls report the first outcome.
/// Returns `false` when another global subscriber was already set. An
/// unparsable filter falls back to [`DEFAULT_FILTER`].
pub fn init(filter: &str) -> bool {
    *INSTALLED.get_or_init(|| {
        let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init()
            .is_ok()
    })
}
