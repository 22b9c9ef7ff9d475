//! Newsdesk logging setup
//!
//! Every Newsdesk crate logs through [`tracing`]. This crate decides how those
//! events are rendered, based on environment variables read once at startup.
//!
//! # Usage
//!
//! ```rust
//! use newsdesk_log::{debug, info};
//!
//! newsdesk_log::init();
//!
//! info!(port = 3000, "server listening");
//! debug!(queue = "tasks", "worker slot idle");
//! ```
//!
//! # Environment Variables
//!
//! - `NEWSDESK_DEBUG=1` - Enable debug logging
//! - `NEWSDESK_LOG_LEVEL=trace|debug|info|warn|error|off` - Set log level
//! - `NEWSDESK_LOG_FORMAT=pretty|json|compact` - Set output format
//! - `NEWSDESK_LOG_COLOR=1|0` - Enable/disable colors
//! - `RUST_LOG` - Full `EnvFilter` directive, overrides the level above

use once_cell::sync::Lazy;
use std::env;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

pub use tracing::{debug, error, info, trace, warn};

// ============================================================================
// Log Levels
// ============================================================================

/// Minimum severity that gets rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl Level {
    /// Parse a level name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Level::Trace),
            "debug" => Some(Level::Debug),
            "info" => Some(Level::Info),
            "warn" | "warning" => Some(Level::Warn),
            "error" => Some(Level::Error),
            "off" | "none" => Some(Level::Off),
            _ => None,
        }
    }

    /// The `EnvFilter` directive for this level.
    pub fn as_directive(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
            Level::Off => "off",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.as_directive().to_uppercase())
    }
}

// ============================================================================
// Log Format
// ============================================================================

/// Output format for log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Multi-line, human oriented
    Pretty,
    /// Single line per event
    Compact,
    /// One JSON object per event, for log shippers
    Json,
}

impl Format {
    /// Parse a format name, case-insensitively.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pretty" => Some(Format::Pretty),
            "compact" => Some(Format::Compact),
            "json" => Some(Format::Json),
            _ => None,
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

static CONFIG: Lazy<LogConfig> = Lazy::new(LogConfig::from_env);

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Whether debug mode is enabled
    pub debug: bool,
    /// Minimum log level
    pub level: Level,
    /// Output format
    pub format: Format,
    /// Whether ANSI colors are enabled (ignored for JSON)
    pub color: bool,
    /// Whether to include the event target (module path)
    pub with_target: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            debug: false,
            level: Level::Info,
            format: Format::Json,
            color: false,
            with_target: true,
        }
    }
}

impl LogConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Read the configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let flag = |key: &str| {
            lookup(key).map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        };

        let debug = flag("NEWSDESK_DEBUG").unwrap_or(false);

        let level = lookup("NEWSDESK_LOG_LEVEL")
            .and_then(|s| Level::parse(&s))
            .unwrap_or(if debug { Level::Debug } else { Level::Info });

        let format = lookup("NEWSDESK_LOG_FORMAT")
            .and_then(|s| Format::parse(&s))
            .unwrap_or(Format::Json);

        let color = flag("NEWSDESK_LOG_COLOR")
            .unwrap_or_else(|| lookup("NO_COLOR").is_none() && lookup("TERM").is_some());

        let with_target = flag("NEWSDESK_LOG_TARGET").unwrap_or(true);

        Self {
            debug,
            level,
            format,
            color,
            with_target,
        }
    }

    /// Build the filter: `RUST_LOG` wins, otherwise the configured level.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.as_directive()))
    }
}

/// Get the global configuration.
pub fn config() -> &'static LogConfig {
    &CONFIG
}

// ============================================================================
// Subscriber installation
// ============================================================================

/// Install the global subscriber using the environment configuration.
///
/// Returns `false` if a subscriber was already installed (tests, or a
/// second call); that is not an error.
pub fn init() -> bool {
    init_with(config())
}

/// Install the global subscriber with an explicit configuration.
pub fn init_with(config: &LogConfig) -> bool {
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = match config.format {
        Format::Json => fmt::layer()
            .json()
            .with_target(config.with_target)
            .boxed(),
        Format::Pretty => fmt::layer()
            .pretty()
            .with_ansi(config.color)
            .with_target(config.with_target)
            .boxed(),
        Format::Compact => fmt::layer()
            .compact()
            .with_ansi(config.color)
            .with_target(config.with_target)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(config.filter())
        .try_init()
        .is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_level_ordering() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Debug < Level::Info);
        assert!(Level::Info < Level::Warn);
        assert!(Level::Warn < Level::Error);
        assert!(Level::Error < Level::Off);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(Level::parse("debug"), Some(Level::Debug));
        assert_eq!(Level::parse("DEBUG"), Some(Level::Debug));
        assert_eq!(Level::parse("warning"), Some(Level::Warn));
        assert_eq!(Level::parse("none"), Some(Level::Off));
        assert_eq!(Level::parse("loud"), None);
    }

    #[test]
    fn test_format_parse() {
        assert_eq!(Format::parse("pretty"), Some(Format::Pretty));
        assert_eq!(Format::parse("Compact"), Some(Format::Compact));
        assert_eq!(Format::parse("json"), Some(Format::Json));
        assert_eq!(Format::parse("xml"), None);
    }

    #[test]
    fn test_defaults_without_env() {
        let config = LogConfig::from_lookup(lookup_from(&[]));
        assert!(!config.debug);
        assert_eq!(config.level, Level::Info);
        assert_eq!(config.format, Format::Json);
        assert!(!config.color);
    }

    #[test]
    fn test_debug_flag_lowers_default_level() {
        let config = LogConfig::from_lookup(lookup_from(&[("NEWSDESK_DEBUG", "true")]));
        assert!(config.debug);
        assert_eq!(config.level, Level::Debug);

        let config = LogConfig::from_lookup(lookup_from(&[
            ("NEWSDESK_DEBUG", "1"),
            ("NEWSDESK_LOG_LEVEL", "error"),
        ]));
        assert_eq!(config.level, Level::Error);
    }

    #[test]
    fn test_color_follows_terminal_hints() {
        let config = LogConfig::from_lookup(lookup_from(&[("TERM", "xterm")]));
        assert!(config.color);

        let config = LogConfig::from_lookup(lookup_from(&[("TERM", "xterm"), ("NO_COLOR", "1")]));
        assert!(!config.color);

        let config = LogConfig::from_lookup(lookup_from(&[("NEWSDESK_LOG_COLOR", "0")]));
        assert!(!config.color);
    }

    #[test]
    fn test_init_is_idempotent() {
        let config = LogConfig {
            format: Format::Compact,
            ..LogConfig::default()
        };
        init_with(&config);
        assert!(!init_with(&config));
        info!(target: "newsdesk_log::tests", "logging initialised");
    }
}
