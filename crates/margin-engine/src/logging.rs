use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;

/// Directives used when neither `RUST_LOG` nor `logging.filter` is set.
///
/// The engine logs at `info`. sqlx logs every statement at `info` and the HTTP
/// stack is chatty at `debug`, so both are held to `warn` even when the
/// engine itself is turned up.
pub const DEFAULT_FILTER: &str = "margin_engine=info,sqlx=warn,reqwest=warn,hyper=warn,warn";

/// Log file prefix; the daily appender adds the date suffix.
const LOG_FILE_PREFIX: &str = "margin-engine.log";

/// Initialise the global tracing subscriber.
///
/// Returns a [`WorkerGuard`] that **must** be held for the lifetime of the
/// process. Dropping it flushes and closes the log file writer.
///
/// The file layer keeps full JSON records with span context for later
/// analysis of discovery and submission runs. The stderr layer is the
/// operator's view and stays compact.
pub fn init_tracing(logging: &LoggingConfig) -> Result<WorkerGuard> {
    std::fs::create_dir_all(&logging.log_dir)
        .with_context(|| format!("failed to create log dir {}", logging.log_dir))?;

    let file_appender = tracing_appender::rolling::daily(&logging.log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(build_filter(logging)?)
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .json()
                .with_current_span(true)
                .with_span_list(false),
        )
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact(),
        )
        .init();

    Ok(guard)
}

/// `RUST_LOG` first, then the configured filter, then [`DEFAULT_FILTER`].
///
/// A malformed configured filter is an error rather than a silent fallback.
pub fn build_filter(logging: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    let directives = logging.filter.as_deref().unwrap_or(DEFAULT_FILTER);
    EnvFilter::try_new(directives).with_context(|| format!("invalid logging filter {directives:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn logging(filter: Option<&str>) -> LoggingConfig {
        LoggingConfig {
            log_dir: "logs".into(),
            filter: filter.map(str::to_string),
        }
    }

    #[test]
    #[serial]
    fn test_default_filter_quiets_dependencies() {
        std::env::remove_var("RUST_LOG");
        let filter = build_filter(&logging(None)).unwrap().to_string();
        assert!(filter.contains("margin_engine=info"), "got {filter}");
        assert!(filter.contains("sqlx=warn"), "got {filter}");
    }

    #[test]
    #[serial]
    fn test_configured_filter_is_used() {
        std::env::remove_var("RUST_LOG");
        let filter = build_filter(&logging(Some("margin_engine=debug"))).unwrap().to_string();
        assert!(filter.contains("margin_engine=debug"), "got {filter}");
    }

    #[test]
    #[serial]
    fn test_malformed_configured_filter_is_an_error() {
        std::env::remove_var("RUST_LOG");
        assert!(build_filter(&logging(Some("margin_engine=loud"))).is_err());
    }

    #[test]
    #[serial]
    fn test_rust_log_overrides_config() {
        std::env::set_var("RUST_LOG", "margin_engine=trace");
        let filter = build_filter(&logging(Some("margin_engine=debug"))).unwrap().to_string();
        std::env::remove_var("RUST_LOG");
        assert!(filter.contains("margin_engine=trace"), "got {filter}");
    }
}
