//! Structured logging configuration.

use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Default log level directive.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per line, for log shippers.
    Json,
    /// Human-readable multi-line output.
    #[default]
    Pretty,
}

impl LogFormat {
    /// Returns the format name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Pretty => "pretty",
        }
    }
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" | "text" => Ok(Self::Pretty),
            other => Err(Error::Configuration(format!(
                "unknown log format {other:?}, expected json or pretty"
            ))),
        }
    }
}

/// Logging configuration.
#[derive(Debug)]
pub struct LoggingConfig {
    /// Output format.
    pub format: LogFormat,
    /// Level filter.
    pub filter: EnvFilter,
}

impl LoggingConfig {
    /// Builds a logging configuration.
    ///
    /// `RUST_LOG` takes precedence over `level` when set; `verbose` raises
    /// the crate's own level to `debug`.
    #[must_use]
    pub fn new(level: &str, format: LogFormat, verbose: bool) -> Self {
        let directive = filter_directive(level, verbose, std::env::var("RUST_LOG").ok());
        let filter =
            EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));
        Self { format, filter }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LEVEL, LogFormat::default(), false)
    }
}

/// Resolves the filter directive string.
fn filter_directive(level: &str, verbose: bool, rust_log: Option<String>) -> String {
    if let Some(directive) = rust_log.filter(|d| !d.trim().is_empty()) {
        return directive;
    }
    let level = if level.trim().is_empty() {
        DEFAULT_LOG_LEVEL
    } else {
        level.trim()
    };
    if verbose {
        format!("{level},priceanalyzer=debug,tower_http=debug")
    } else {
        level.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("json", LogFormat::Json)]
    #[test_case("JSON", LogFormat::Json)]
    #[test_case("pretty", LogFormat::Pretty)]
    #[test_case(" text ", LogFormat::Pretty)]
    fn test_log_format_parse(input: &str, expected: LogFormat) {
        assert_eq!(input.parse::<LogFormat>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_log_format() {
        assert!(matches!(
            "xml".parse::<LogFormat>(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_rust_log_wins() {
        assert_eq!(
            filter_directive("info", true, Some("warn,hyper=off".to_string())),
            "warn,hyper=off"
        );
    }

    #[test]
    fn test_level_and_verbose() {
        assert_eq!(filter_directive("warn", false, None), "warn");
        assert_eq!(filter_directive("", false, Some("  ".to_string())), "info");
        assert_eq!(
            filter_directive("info", true, None),
            "info,priceanalyzer=debug,tower_http=debug"
        );
    }
}
