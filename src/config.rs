//! Configuration for the tandem client binary.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::protocol::{CommandTable, Encoding};
use crate::runtime::PoolConfig;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Command-line arguments for the client
#[derive(Parser, Debug, Default)]
#[command(name = "tandem")]
#[command(version)]
#[command(about = "A multi-connection line-protocol client", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Server host name or address
    #[arg(long)]
    pub host: Option<String>,

    /// Server port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Number of connections to open
    #[arg(short = 'n', long)]
    pub connections: Option<usize>,

    /// Encrypt connections with TLS
    #[arg(long)]
    pub tls: bool,

    /// Base nickname; each connection appends its index
    #[arg(long)]
    pub nick: Option<String>,

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
    pub pool: PoolSection,
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Raw command token to canonical handler key.
    #[serde(default)]
    pub commands: CommandTable,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Remote endpoint
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub tls: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            tls: false,
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

/// Connection count, rate limiting and text handling
#[derive(Debug, Deserialize)]
pub struct PoolSection {
    #[serde(default = "default_connections")]
    pub connections: usize,
    /// Token bucket size per connection
    #[serde(default = "default_capacity")]
    pub capacity: f64,
    /// Tokens per second per connection
    #[serde(default = "default_fill_rate")]
    pub fill_rate: f64,
    #[serde(default)]
    pub encoding: Encoding,
    #[serde(default = "default_max_line_length")]
    pub max_line_length: usize,
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            connections: default_connections(),
            capacity: default_capacity(),
            fill_rate: default_fill_rate(),
            encoding: Encoding::default(),
            max_line_length: default_max_line_length(),
        }
    }
}

/// How each connection introduces itself
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_nick")]
    pub user: String,
    #[serde(default = "default_realname")]
    pub realname: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            nick: default_nick(),
            user: default_nick(),
            realname: default_realname(),
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

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    6667
}

fn default_connect_timeout() -> u64 {
    30
}

fn default_connections() -> usize {
    1
}

fn default_capacity() -> f64 {
    23.0
}

fn default_fill_rate() -> f64 {
    1.73
}

fn default_max_line_length() -> usize {
    8192
}

fn default_nick() -> String {
    "tandem".to_string()
}

fn default_realname() -> String {
    "tandem client".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub pool: PoolConfig,
    pub identity: IdentityConfig,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_args(CliArgs::parse())
    }

    /// Merge parsed CLI args over the TOML file they name, if any.
    pub fn from_args(cli: CliArgs) -> Result<Self, ConfigError> {
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

    /// CLI values win over file values.
    fn merge(cli: CliArgs, file: TomlConfig) -> Self {
        let mut identity = file.identity;
        if let Some(nick) = cli.nick {
            identity.nick = nick;
        }

        Config {
            pool: PoolConfig {
                host: cli.host.unwrap_or(file.server.host),
                port: cli.port.unwrap_or(file.server.port),
                connections: cli.connections.unwrap_or(file.pool.connections),
                tls: cli.tls || file.server.tls,
                capacity: file.pool.capacity,
                fill_rate: file.pool.fill_rate,
                encoding: file.pool.encoding,
                connect_timeout: Duration::from_secs(file.server.connect_timeout_secs),
                max_line_length: file.pool.max_line_length,
                commands: file.commands,
            },
            identity,
            log_level: cli.log_level.unwrap_or(file.logging.level),
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
