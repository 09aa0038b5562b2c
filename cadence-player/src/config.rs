//! Configuration for cadence-player
//!
//! # Settings Sources Priority
//!
//! 1. Command-line arguments (`--port`, `--config`, `--catalog`, `--log-level`)
//! 2. Environment variables (`CADENCE_PORT`, `CADENCE_CONFIG`, `CADENCE_CATALOG`)
//! 3. TOML configuration file
//! 4. Built-in defaults (code constants)

use crate::error::Result;
use cadence_common::config::{SessionConfig, SinkConfig, TomlConfig};
use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for cadence-player
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "cadence-player")]
#[command(about = "Playback queue coordination service")]
#[command(version)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, env = "CADENCE_PORT")]
    pub port: Option<u16>,

    /// Bootstrap configuration file
    #[arg(short, long, env = "CADENCE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Track catalog served by the local extension
    #[arg(long, env = "CADENCE_CATALOG")]
    pub catalog: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Fully resolved runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub catalog_path: Option<PathBuf>,
    pub session: SessionConfig,
    pub sink: SinkConfig,
    pub log_level: String,
}

impl Config {
    /// Load the TOML file named by `args` (or the default location) and
    /// apply the command-line overrides
    pub fn from_args(args: &Args) -> Result<Self> {
        let toml = TomlConfig::load_or_default(args.config.as_deref())?;
        Ok(Self::merge(toml, args))
    }

    /// Apply command-line overrides on top of file values
    pub fn merge(toml: TomlConfig, args: &Args) -> Self {
        Self {
            port: args.port.unwrap_or(toml.server.port),
            catalog_path: args.catalog.clone().or(toml.catalog.path),
            session: toml.session,
            sink: toml.sink,
            log_level: args.log_level.clone().unwrap_or(toml.logging.level),
        }
    }
}
