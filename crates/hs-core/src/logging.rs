//! Logging subsystem initialization.
//!
//! All diagnostics go to stderr so stdout stays clean for record
//! output. Degraded data paths log at debug level and are silent by
//! default; the never-fail contract means there is no error-level
//! chatter during normal operation.

use std::io::IsTerminal;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

static INIT: OnceLock<()> = OnceLock::new();

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable console lines.
    #[default]
    Human,
    /// One JSON object per line.
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Default filter directive when `HOSTSNAP_LOG` is unset,
    /// e.g. `"warn"` or `"hs_core=debug"`.
    pub default_filter: Option<String>,

    /// Output format.
    pub format: LogFormat,
}

impl LogConfig {
    /// Build a config from the environment. `HOSTSNAP_LOG_FORMAT=json`
    /// selects JSON lines.
    pub fn from_env() -> Self {
        let format = match std::env::var("HOSTSNAP_LOG_FORMAT") {
            Ok(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Human,
        };
        LogConfig { default_filter: None, format }
    }
}

/// Initialize the logging subsystem.
///
/// Respects the `HOSTSNAP_LOG` filter variable, falling back to the
/// config's default directive (or `warn`). Idempotent: repeated calls
/// after the first are no-ops, so library consumers and tests can call
/// it freely.
pub fn init_logging(config: &LogConfig) {
    INIT.get_or_init(|| {
        let default = config.default_filter.as_deref().unwrap_or("warn");
        let filter = EnvFilter::try_from_env("HOSTSNAP_LOG")
            .unwrap_or_else(|_| EnvFilter::new(default));

        match config.format {
            LogFormat::Human => {
                let use_ansi = std::io::stderr().is_terminal();
                let fmt_layer = fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_ansi(use_ansi);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(fmt_layer)
                    .try_init();
            }
            LogFormat::Json => {
                let json_layer = fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false);
                let _ = tracing_subscriber::registry()
                    .with(filter)
                    .with(json_layer)
                    .try_init();
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig::default();
        init_logging(&config);
        init_logging(&config);
    }

    #[test]
    fn test_default_format_is_human() {
        assert_eq!(LogConfig::default().format, LogFormat::Human);
    }
}
