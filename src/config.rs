//! Configuration module for countd.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// Command-line arguments for the counter server
#[derive(Parser, Debug, Default)]
#[command(name = "countd")]
#[command(version = "0.1.0")]
#[command(about = "A shared counter server with broadcast updates", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// TCP port to listen on (IPv4 and IPv6)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Listen backlog
    #[arg(short, long)]
    pub backlog: Option<i32>,

    /// Longest unterminated line kept between reads, in bytes
    #[arg(long)]
    pub max_line_length: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener-related configuration
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen backlog
    #[serde(default = "default_backlog")]
    pub backlog: i32,
    /// Connections to reserve registry space for
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            backlog: default_backlog(),
            max_connections: default_max_connections(),
        }
    }
}

/// Per-connection read configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    /// Longest unterminated line fragment kept between reads
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
    /// Bytes requested per read syscall
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_length: default_max_line_length(),
            read_chunk_size: default_read_chunk_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_port() -> u16 {
    8089
}

fn default_backlog() -> i32 {
    64
}

fn default_max_connections() -> usize {
    1024
}

fn default_max_line_length() -> usize {
    4096
}

fn default_read_chunk_size() -> usize {
    4096
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub backlog: i32,
    pub max_connections: usize,
    pub max_line_length: usize,
    pub read_chunk_size: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::merge(CliArgs::default(), TomlConfig::default())
    }
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = match cli.config {
            Some(ref config_path) => {
                let contents = std::fs::read_to_string(config_path)
                    .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
                toml::from_str(&contents)
                    .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
            }
            None => TomlConfig::default(),
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args over TOML values
    fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        Config {
            port: cli.port.unwrap_or(toml_config.server.port),
            backlog: cli.backlog.unwrap_or(toml_config.server.backlog),
            max_connections: toml_config.server.max_connections,
            max_line_length: cli
                .max_line_length
                .unwrap_or(toml_config.connection.max_line_length),
            read_chunk_size: toml_config.connection.read_chunk_size,
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}
