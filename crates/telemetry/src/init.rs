// Path: crates/telemetry/src/init.rs
//! Global `tracing` subscriber set-up for hosts embedding the tally engine.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Environment variable holding the log filter. Takes precedence over `RUST_LOG`.
pub const LOG_FILTER_ENV: &str = "TALLY_LOG";

/// Filter used when neither [`LOG_FILTER_ENV`] nor `RUST_LOG` is set.
///
/// The `tally` target logs every VM invocation at info, so it is held at warn.
pub const DEFAULT_LOG_FILTER: &str = "info,end_block=info,tally=warn";

/// Output format of the global subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line with RFC 3339 UTC timestamps.
    #[default]
    Json,
    /// Human-readable single-line records.
    Compact,
}

/// Builds the log filter from [`LOG_FILTER_ENV`], then `RUST_LOG`, then
/// [`DEFAULT_LOG_FILTER`].
pub fn log_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Installs the global subscriber, writing to stderr in `format`.
///
/// Records emitted through the `log` facade are forwarded into the same
/// subscriber. Fails if a global subscriber or logger is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), anyhow::Error> {
    tracing_log::LogTracer::init()?;
    let registry = Registry::default().with(log_filter());
    match format {
        LogFormat::Json => {
            let layer = fmt::layer()
                .json()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339());
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
        LogFormat::Compact => {
            let layer = fmt::layer()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(true);
            tracing::subscriber::set_global_default(registry.with(layer))?;
        }
    }
    Ok(())
}

/// Installs a compact subscriber that writes through the test harness's
/// captured output. Safe to call from every test; only the first call has an
/// effect.
pub fn init_test_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let layer = fmt::layer().compact().with_test_writer().with_target(true);
        // Another subscriber may already be installed by the test binary.
        let _ = tracing::subscriber::set_global_default(Registry::default().with(log_filter()).with(layer));
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_parses() {
        assert!(EnvFilter::try_new(DEFAULT_LOG_FILTER).is_ok());
    }

    #[test]
    fn test_tracing_can_be_initialized_repeatedly() {
        init_test_tracing();
        init_test_tracing();
        tracing::info!(target: "end_block", "subscriber installed");
    }
}
