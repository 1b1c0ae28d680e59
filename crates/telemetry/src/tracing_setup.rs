//! Tracing setup for structured logging.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Output format of log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    /// Parses the `LOG_JSON` convention: "1" or "true" selects JSON.
    pub fn from_flag(flag: &str) -> Self {
        if flag == "1" || flag.eq_ignore_ascii_case("true") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

/// Tracing configuration.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Directive used when `RUST_LOG` is unset, e.g. "info,kafka=debug"
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Text,
        }
    }
}

/// Initialize the global subscriber.
pub fn init_tracing(config: TracingConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    match config.format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).init(),
    }

    tracing::info!(filter = %config.filter, format = ?config.format, "Tracing initialized");
}

/// Initialize tracing from `RUST_LOG` and `LOG_JSON`.
pub fn init_tracing_from_env() {
    let format = std::env::var("LOG_JSON")
        .map(|v| LogFormat::from_flag(&v))
        .unwrap_or_default();

    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    init_tracing(TracingConfig { filter, format });
}
