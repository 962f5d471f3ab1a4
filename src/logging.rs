//! Logging setup for graph-injector
//!
//! The container logs through `tracing` under the `graph_injector` target:
//! registrations, scopes, locks and pre-configurations at `debug`,
//! per-node resolution at `trace`, and teardown failures and skipped
//! bundles at `warn`. This module installs a `tracing-subscriber` for
//! applications that have none of their own.
//!
//! # Features
//!
//! - `logging` - Emit events (default)
//! - `logging-json` - JSON subscriber output
//! - `logging-pretty` - Multi-line human readable output
//!
//! # Example
//!
//! ```rust,ignore
//! use graph_injector::logging;
//!
//! // JSON with logging-json, pretty with logging-pretty
//! logging::init();
//!
//! // Honour RUST_LOG, defaulting to this crate at debug
//! logging::init_from_env();
//!
//! logging::builder()
//!     .trace()
//!     .with_target_filter("graph_injector")
//!     .with_target_filter("my_app")
//!     .compact()
//!     .init();
//! ```

use tracing::Level;

/// Target of every event this crate emits.
pub const TARGET: &str = "graph_injector";

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line colorful output
    Pretty,
    /// Single-line output
    Compact,
}

/// Builder for the subscriber installed by [`init`].
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    targets: Vec<&'static str>,
    directives: Option<String>,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            targets: Vec::new(),
            directives: None,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    pub fn error(self) -> Self {
        self.with_level(Level::ERROR)
    }

    /// Only show events from `target` (and any other added targets).
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.targets.push(target);
        self
    }

    /// Only show this crate's events.
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Raw `EnvFilter` directives; overrides level and targets.
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = Some(directives.into());
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// `EnvFilter` directives this builder installs.
    pub fn filter_directives(&self) -> String {
        if let Some(directives) = &self.directives {
            return directives.clone();
        }
        if self.targets.is_empty() {
            return self.level.to_string().to_lowercase();
        }
        self.targets
            .iter()
            .map(|t| format!("{t}={}", self.level.to_string().to_lowercase()))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the subscriber; returns `false` if one was already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> bool {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let filter = EnvFilter::new(self.filter_directives());
        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);

        let registry = tracing_subscriber::registry().with(filter);
        let result = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => registry.with(layer.json()).try_init(),
            // Without logging-json the default layer stands in for JSON
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => registry.with(layer).try_init(),
            LogFormat::Pretty => registry.with(layer.pretty()).try_init(),
            LogFormat::Compact => registry.with(layer.compact()).try_init(),
        };
        result.is_ok()
    }

    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn try_init(self) -> bool {
        false
    }

    /// Install the subscriber, keeping any subscriber already set.
    pub fn init(self) {
        let _ = self.try_init();
    }
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON with `logging-json`, otherwise pretty with `logging-pretty`.
pub fn init() {
    if cfg!(feature = "logging-json") {
        init_json();
    } else {
        init_pretty();
    }
}

/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","target":"graph_injector","message":"Registering service"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// ```text
///   2026-01-01T00:00:00.000Z DEBUG graph_injector: Registering service
/// ```
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Install a subscriber using raw `EnvFilter` directives, for example
/// `"graph_injector=trace,warn"`.
pub fn init_with_filter(directives: &str) {
    builder().pretty().with_directives(directives).init();
}

/// Install a subscriber configured by `RUST_LOG`, falling back to this
/// crate's events at debug.
pub fn init_from_env() {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| format!("{TARGET}=debug"));
    init_with_filter(&directives);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let builder = LoggingBuilder::default();
        assert_eq!(builder.level, Level::DEBUG);
        assert_eq!(builder.format, LogFormat::Json);
        assert_eq!(builder.filter_directives(), "debug");
    }

    #[test]
    fn test_builder_chain() {
        let builder = LoggingBuilder::new()
            .trace()
            .pretty()
            .with_file()
            .with_line_number()
            .injector_only()
            .with_target_filter("app");

        assert_eq!(builder.format, LogFormat::Pretty);
        assert!(builder.with_file);
        assert!(builder.with_line_number);
        assert_eq!(builder.filter_directives(), "graph_injector=trace,app=trace");
    }

    #[test]
    fn test_raw_directives_win() {
        let builder = LoggingBuilder::new().injector_only().with_directives("warn");
        assert_eq!(builder.filter_directives(), "warn");
    }
}
