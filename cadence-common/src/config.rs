//! Bootstrap configuration loading
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments / environment variables (applied by the binary)
//! 2. TOML configuration file
//! 3. Built-in defaults (code constants)
//!
//! A missing TOML file is not an error: a warning is logged and the built-in
//! defaults are used. A file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Default HTTP port for the player service
pub const DEFAULT_PORT: u16 = 5760;

/// Complete bootstrap configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub sink: SinkConfig,
    pub catalog: CatalogConfig,
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Session coordinator configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SessionConfig {
    /// Longest wait for the first settled search page
    pub search_timeout_ms: u64,

    /// Number of stream resolutions run concurrently for one batch
    pub resolve_concurrency: usize,

    /// Capacity of the broadcast event bus
    pub event_capacity: usize,

    /// Extension bound at startup (None = first registered)
    pub default_extension: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_timeout_ms: 10_000,
            resolve_concurrency: 4,
            event_capacity: 256,
            default_extension: None,
        }
    }
}

/// Virtual playback sink configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct SinkConfig {
    /// Clock tick of the virtual transport
    pub tick_ms: u64,

    /// Length assumed for tracks without a known duration
    pub default_track_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            tick_ms: 250,
            default_track_ms: 180_000,
        }
    }
}

/// Local catalog extension configuration
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct CatalogConfig {
    /// Path to the catalog TOML file
    pub path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file that must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Load configuration, falling back to defaults when no file exists
    ///
    /// `path` overrides the platform default location.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
            Some(path) => path,
            None => {
                warn!("Could not determine config directory, using built-in defaults");
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            warn!(
                "Config file {} not found, using built-in defaults",
                path.display()
            );
            return Ok(Self::default());
        }

        info!("Loading configuration from {}", path.display());
        Self::load(&path)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.session.resolve_concurrency == 0 {
            return Err(Error::Config(
                "session.resolve_concurrency must be at least 1".to_string(),
            ));
        }
        if self.session.event_capacity == 0 {
            return Err(Error::Config(
                "session.event_capacity must be at least 1".to_string(),
            ));
        }
        if self.sink.tick_ms == 0 {
            return Err(Error::Config("sink.tick_ms must be positive".to_string()));
        }
        Ok(())
    }
}

/// Platform default config file location (`<config dir>/cadence/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("cadence").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = TomlConfig::default();
        assert_eq!(config.server.port, DEFAULT_PORT);
        assert_eq!(config.session.resolve_concurrency, 4);
        assert_eq!(config.logging.level, "info");
        assert!(config.catalog.path.is_none());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = TomlConfig::from_toml_str(
            r#"
            [server]
            port = 6000

            [session]
            search_timeout_ms = 500
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 6000);
        assert_eq!(config.session.search_timeout_ms, 500);
        assert_eq!(config.session.resolve_concurrency, 4);
        assert_eq!(config.sink.tick_ms, 250);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = TomlConfig::from_toml_str("[session]\nresolve_concurrency = 0\n");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_malformed_toml_rejected() {
        let result = TomlConfig::from_toml_str("[server\nport = ");
        assert!(matches!(result, Err(Error::Toml(_))));
    }
}
