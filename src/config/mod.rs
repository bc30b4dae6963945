//! Configuration management.
//!
//! Settings are layered, later layers winning:
//!
//! | Layer | Source |
//! |-------|--------|
//! | 1 | Built-in defaults |
//! | 2 | TOML file (`--config` or `PRICEANALYZER_CONFIG`) |
//! | 3 | Environment, including a `.env` file loaded at start-up |
//! | 4 | Command-line flags, applied by the binary through the `with_*` setters |
//!
//! # Environment Variables
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `RUN_ADDRESS` | listen address |
//! | `DATABASE_URI` | PostgreSQL DSN |
//! | `LOG_LEVEL` | log level directive |
//! | `LOG_FORMAT` | `json` or `pretty` |
//! | `PRICEANALYZER_TABLE` | table name |
//! | `PRICEANALYZER_POOL_SIZE` | max pooled connections |
//! | `PRICEANALYZER_UPLOAD_LIMIT` | max upload size in bytes |
//! | `PRICEANALYZER_MEMBER_LIMIT` | max decompressed CSV member in bytes |
//! | `PRICEANALYZER_STORE_TIMEOUT_SECS` | deadline per store call |
//! | `PRICEANALYZER_PING_TIMEOUT_SECS` | deadline for the health check |

use crate::archive::DEFAULT_MEMBER_LIMIT;
use crate::observability::{DEFAULT_LOG_LEVEL, LogFormat};
use crate::services::{DEFAULT_PING_TIMEOUT, DEFAULT_STORE_TIMEOUT};
use crate::storage::{DEFAULT_POOL_MAX_SIZE, DEFAULT_TABLE, validate_table_name};
use crate::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Environment variable naming the configuration file.
pub const CONFIG_PATH_ENV: &str = "PRICEANALYZER_CONFIG";

/// Default listen address.
pub const DEFAULT_RUN_ADDRESS: &str = "0.0.0.0:8080";

/// Default maximum upload size (32 MiB).
pub const DEFAULT_UPLOAD_LIMIT: usize = 32 * 1024 * 1024;

/// Default time allowed for in-flight requests after a shutdown signal.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Runtime configuration for the service.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub run_address: SocketAddr,
    /// PostgreSQL DSN. Required for the PostgreSQL store.
    pub database_dsn: Option<SecretString>,
    /// Table holding the records.
    pub table_name: String,
    /// Maximum pooled database connections.
    pub pool_size: usize,
    /// Maximum accepted request body, in bytes.
    pub upload_limit: usize,
    /// Maximum decompressed size of an uploaded CSV member, in bytes.
    pub member_limit: u64,
    /// Deadline for each store call.
    pub store_timeout: Duration,
    /// Deadline for the health check.
    pub ping_timeout: Duration,
    /// Time allowed for in-flight requests after a shutdown signal.
    pub shutdown_grace: Duration,
    /// Log level directive.
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            run_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_dsn: None,
            table_name: DEFAULT_TABLE.to_string(),
            pool_size: DEFAULT_POOL_MAX_SIZE,
            upload_limit: DEFAULT_UPLOAD_LIMIT,
            member_limit: DEFAULT_MEMBER_LIMIT,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            ping_timeout: DEFAULT_PING_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

/// Configuration file structure (for TOML parsing).
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// `[server]` section.
    pub server: Option<ConfigFileServer>,
    /// `[database]` section.
    pub database: Option<ConfigFileDatabase>,
    /// `[logging]` section.
    pub logging: Option<ConfigFileLogging>,
}

/// Server section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileServer {
    /// Listen address.
    pub run_address: Option<String>,
    /// Max upload size in bytes.
    pub upload_limit: Option<usize>,
    /// Max decompressed CSV member size in bytes.
    pub member_limit: Option<u64>,
    /// Shutdown grace period in seconds.
    pub shutdown_grace_secs: Option<u64>,
}

/// Database section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileDatabase {
    /// Connection string.
    pub uri: Option<String>,
    /// Table name.
    pub table: Option<String>,
    /// Pool size.
    pub pool_size: Option<usize>,
    /// Store call timeout in seconds.
    pub store_timeout_secs: Option<u64>,
    /// Health check timeout in seconds.
    pub ping_timeout_secs: Option<u64>,
}

/// Logging section in config file.
#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ConfigFileLogging {
    /// Level directive.
    pub level: Option<String>,
    /// `json` or `pretty`.
    pub format: Option<String>,
}

fn parse_env<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("{name}={value:?}: {e}")))
}

fn parse_address(value: &str) -> Result<SocketAddr> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::Configuration(format!("invalid run address {value:?}: {e}")))
}

impl ServerConfig {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads defaults, then the config file, then the process environment.
    ///
    /// `path` overrides `PRICEANALYZER_CONFIG`. A missing file is an error
    /// only when a path was given explicitly.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed,
    /// or a value is invalid.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from));
        if let Some(path) = path {
            config.apply_file(Self::read_file(&path)?)?;
            tracing::debug!(path = %path.display(), "Loaded configuration file");
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reads and parses a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the file cannot be read or parsed.
    pub fn read_file(path: &Path) -> Result<ConfigFile> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        toml::from_str(&contents)
            .map_err(|e| Error::Configuration(format!("cannot parse {}: {e}", path.display())))
    }

    /// Applies values present in a parsed config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for unparsable values.
    pub fn apply_file(&mut self, file: ConfigFile) -> Result<()> {
        if let Some(server) = file.server {
            if let Some(address) = server.run_address {
                self.run_address = parse_address(&address)?;
            }
            if let Some(limit) = server.upload_limit {
                self.upload_limit = limit;
            }
            if let Some(limit) = server.member_limit {
                self.member_limit = limit;
            }
            if let Some(secs) = server.shutdown_grace_secs {
                self.shutdown_grace = Duration::from_secs(secs);
            }
        }
        if let Some(database) = file.database {
            if let Some(uri) = database.uri {
                self.database_dsn = Some(SecretString::from(uri));
            }
            if let Some(table) = database.table {
                self.table_name = table;
            }
            if let Some(size) = database.pool_size {
                self.pool_size = size;
            }
            if let Some(secs) = database.store_timeout_secs {
                self.store_timeout = Duration::from_secs(secs);
            }
            if let Some(secs) = database.ping_timeout_secs {
                self.ping_timeout = Duration::from_secs(secs);
            }
        }
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = level;
            }
            if let Some(format) = logging.format {
                self.log_format = format.parse()?;
            }
        }
        Ok(())
    }

    /// Applies environment overrides read through `lookup`.
    ///
    /// Empty values are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for unparsable values.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("RUN_ADDRESS") {
            self.run_address = parse_address(&v)?;
        }
        if let Some(v) = get("DATABASE_URI") {
            self.database_dsn = Some(SecretString::from(v));
        }
        if let Some(v) = get("LOG_LEVEL") {
            self.log_level = v;
        }
        if let Some(v) = get("LOG_FORMAT") {
            self.log_format = v.parse()?;
        }
        if let Some(v) = get("PRICEANALYZER_TABLE") {
            self.table_name = v;
        }
        if let Some(v) = get("PRICEANALYZER_POOL_SIZE") {
            self.pool_size = parse_env("PRICEANALYZER_POOL_SIZE", &v)?;
        }
        if let Some(v) = get("PRICEANALYZER_UPLOAD_LIMIT") {
            self.upload_limit = parse_env("PRICEANALYZER_UPLOAD_LIMIT", &v)?;
        }
        if let Some(v) = get("PRICEANALYZER_MEMBER_LIMIT") {
            self.member_limit = parse_env("PRICEANALYZER_MEMBER_LIMIT", &v)?;
        }
        if let Some(v) = get("PRICEANALYZER_STORE_TIMEOUT_SECS") {
            self.store_timeout =
                Duration::from_secs(parse_env("PRICEANALYZER_STORE_TIMEOUT_SECS", &v)?);
        }
        if let Some(v) = get("PRICEANALYZER_PING_TIMEOUT_SECS") {
            self.ping_timeout =
                Duration::from_secs(parse_env("PRICEANALYZER_PING_TIMEOUT_SECS", &v)?);
        }
        Ok(())
    }

    /// Checks cross-field constraints.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] describing the first violation.
    pub fn validate(&self) -> Result<()> {
        validate_table_name(&self.table_name)?;
        if self.pool_size == 0 {
            return Err(Error::Configuration("pool size must be at least 1".to_string()));
        }
        if self.upload_limit == 0 || self.member_limit == 0 {
            return Err(Error::Configuration(
                "upload and member limits must be non-zero".to_string(),
            ));
        }
        if self.store_timeout.is_zero() || self.ping_timeout.is_zero() {
            return Err(Error::Configuration(
                "store and ping timeouts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Sets the listen address.
    #[must_use]
    pub const fn with_run_address(mut self, address: SocketAddr) -> Self {
        self.run_address = address;
        self
    }

    /// Sets the database DSN.
    #[must_use]
    pub fn with_database_dsn(mut self, dsn: SecretString) -> Self {
        self.database_dsn = Some(dsn);
        self
    }

    /// Sets the log level directive.
    #[must_use]
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Sets the log format.
    #[must_use]
    pub const fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.run_address.to_string(), DEFAULT_RUN_ADDRESS);
        assert_eq!(config.table_name, "prices");
        assert_eq!(config.pool_size, 16);
        assert_eq!(config.upload_limit, 32 * 1024 * 1024);
        assert_eq!(config.member_limit, 256 * 1024 * 1024);
        assert_eq!(config.store_timeout, Duration::from_secs(10));
        assert_eq!(config.ping_timeout, Duration::from_secs(2));
        assert!(config.database_dsn.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_then_env_layering() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[server]
run_address = "127.0.0.1:9000"
upload_limit = 1024
member_limit = 4096

[database]
uri = "postgres://file@localhost/prices"
table = "catalog"
pool_size = 4

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let mut config = ServerConfig::default();
        config
            .apply_file(ServerConfig::read_file(file.path()).unwrap())
            .unwrap();
        assert_eq!(config.run_address.port(), 9000);
        assert_eq!(config.table_name, "catalog");
        assert_eq!(config.log_format, LogFormat::Json);

        config
            .apply_env(env(&[
                ("DATABASE_URI", "postgres://env@localhost/prices"),
                ("PRICEANALYZER_POOL_SIZE", "8"),
                ("RUN_ADDRESS", ""),
            ]))
            .unwrap();

        assert_eq!(config.run_address.port(), 9000);
        assert_eq!(config.pool_size, 8);
        assert_eq!(config.upload_limit, 1024);
        assert_eq!(config.member_limit, 4096);
        assert_eq!(
            config.database_dsn.as_ref().unwrap().expose_secret(),
            "postgres://env@localhost/prices"
        );
    }

    #[test]
    fn test_env_timeouts() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("PRICEANALYZER_STORE_TIMEOUT_SECS", "3"),
                ("PRICEANALYZER_PING_TIMEOUT_SECS", "1"),
                ("PRICEANALYZER_MEMBER_LIMIT", "1048576"),
                ("LOG_FORMAT", "pretty"),
            ]))
            .unwrap();
        assert_eq!(config.member_limit, 1024 * 1024);
        assert_eq!(config.store_timeout, Duration::from_secs(3));
        assert_eq!(config.ping_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = ServerConfig::default();
        let err = config
            .apply_env(env(&[("PRICEANALYZER_POOL_SIZE", "many")]))
            .unwrap_err();
        assert!(
            matches!(err, Error::Configuration(msg) if msg.contains("PRICEANALYZER_POOL_SIZE"))
        );
    }

    #[test]
    fn test_bad_address() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("RUN_ADDRESS", "localhost")])).is_err());
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 80").unwrap();
        assert!(matches!(
            ServerConfig::read_file(file.path()),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_explicit_file() {
        let err =
            ServerConfig::load(Some(Path::new("/nonexistent/priceanalyzer.toml"))).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_validation() {
        let mut config = ServerConfig {
            table_name: "bad name".to_string(),
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());

        config.table_name = "prices".to_string();
        config.pool_size = 0;
        assert!(config.validate().is_err());

        config.pool_size = 1;
        config.store_timeout = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_command_line_overrides() {
        let config = ServerConfig::default()
            .with_log_level("priceanalyzer=trace")
            .with_log_format(LogFormat::Json);
        assert_eq!(config.log_level, "priceanalyzer=trace");
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn test_dsn_not_in_debug_output() {
        let config = ServerConfig::default()
            .with_database_dsn(SecretString::from("postgres://user:hunter2@db/prices"));
        assert!(!format!("{config:?}").contains("hunter2"));
    }
}
