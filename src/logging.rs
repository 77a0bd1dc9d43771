//! Logging infrastructure - structured tracing for conversions
//!
//! Design: `tracing` events at the boundary with:
//! - `trace!` per conversion (zero-cost when disabled)
//! - `debug!` for registration and wrapper lifecycle
//! - `warn!` for ignored duplicate registrations
//! - Console or daily-rolling file output through a non-blocking writer

// Re-export tracing macros for use throughout the crate
pub use tracing::{debug, error, info, trace, warn, Level};

use crate::config::Config;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

/// Global logging state
static LOGGER_INITIALIZED: OnceCell<()> = OnceCell::new();

/// Output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Output destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogOutput {
    Stdout,
    Stderr,
    /// Daily rolling files `<directory>/<prefix>.<date>`
    File { directory: PathBuf, prefix: String },
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: Level,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Show span enter/close events
    pub span_events: bool,
    /// Extra `EnvFilter` directives, comma separated
    pub filter: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Pretty,
            output: LogOutput::Stderr,
            span_events: false,
            filter: None,
        }
    }
}

impl LogConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.span_events = enabled;
        self
    }

    pub fn with_filter(mut self, directives: impl Into<String>) -> Self {
        self.filter = Some(directives.into());
        self
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // TYPBIND_LOG_LEVEL: trace, debug, info, warn, error
        if let Ok(level) = std::env::var("TYPBIND_LOG_LEVEL") {
            config.level = level.parse().unwrap_or(Level::INFO);
        }

        // TYPBIND_LOG_FORMAT: pretty, compact, json
        if let Ok(format) = std::env::var("TYPBIND_LOG_FORMAT") {
            config.format = match format.to_lowercase().as_str() {
                "compact" => LogFormat::Compact,
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            };
        }

        // TYPBIND_LOG_FILE: directory for rolling log files
        if let Ok(dir) = std::env::var("TYPBIND_LOG_FILE") {
            config.output = LogOutput::File {
                directory: PathBuf::from(dir),
                prefix: "typbind.log".to_string(),
            };
        }

        config.span_events = std::env::var("TYPBIND_LOG_SPANS").is_ok();
        config
    }

    /// Filter directives this config expands to
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_lowercase();
        match &self.filter {
            Some(extra) if !extra.is_empty() => format!("typbind={level},{extra}"),
            _ => format!("typbind={level}"),
        }
    }
}

type Inner = Layered<EnvFilter, Registry>;

/// Install the global subscriber
///
/// Returns the writer guard on first initialization; buffered lines are
/// flushed when it is dropped. Later calls are no-ops returning `None`.
pub fn init_logging(config: LogConfig) -> Option<WorkerGuard> {
    let mut guard = None;

    LOGGER_INITIALIZED.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(config.directives()));

        let span_events = if config.span_events {
            FmtSpan::ENTER | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let ansi = !matches!(config.output, LogOutput::File { .. });
        let (writer, worker) = match &config.output {
            LogOutput::Stdout => tracing_appender::non_blocking(io::stdout()),
            LogOutput::Stderr => tracing_appender::non_blocking(io::stderr()),
            LogOutput::File { directory, prefix } => {
                tracing_appender::non_blocking(tracing_appender::rolling::daily(directory, prefix))
            }
        };

        let base = fmt::layer()
            .with_writer(writer)
            .with_span_events(span_events)
            .with_target(true)
            .with_ansi(ansi);

        let layer: Box<dyn Layer<Inner> + Send + Sync> = match config.format {
            LogFormat::Pretty => base.pretty().boxed(),
            LogFormat::Compact => base.compact().boxed(),
            LogFormat::Json => base.json().boxed(),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layer)
            .try_init()
            .ok(); // Ignore error if another subscriber is installed

        guard = Some(worker);
    });

    guard
}

/// Initialize logging from `TYPBIND_LOG_*` environment variables
pub fn init() -> Option<WorkerGuard> {
    init_logging(LogConfig::from_env())
}

/// Initialize logging from the `[logging]` section of a loaded config
pub fn init_from(config: &Config) -> Option<WorkerGuard> {
    init_logging(config.logging.to_log_config())
}

/// Check if logging is initialized
pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.get().is_some()
}

/// Log a native -> host conversion
#[inline]
pub fn log_cast(type_name: &str, policy: &str) {
    trace!(event = "cast", type_name, policy, "Native value cast to host");
}

/// Log a host -> native load that did not bind
#[inline]
pub fn log_load_failure(type_name: &str, convert: bool) {
    trace!(event = "load_failed", type_name, convert, "Host value did not load");
}

/// Log creation of a new wrapper object
#[inline]
pub fn log_wrapper_created(type_name: &str, address: usize, owned: bool, cached: bool) {
    debug!(
        event = "wrapper_created",
        type_name,
        address,
        owned,
        cached,
        "Wrapper created"
    );
}

/// Log a host call through the call adapter
#[inline]
pub fn log_call(arg_count: usize, success: bool) {
    trace!(event = "call", args = arg_count, success, "Host callable invoked");
}
