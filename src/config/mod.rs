use clap::Parser;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Config file picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "geth-monitor.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config value: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub node: NodeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeConfig {
    /// Node WebSocket RPC URL (Geth serves WS on 8546, HTTP on 8545)
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    /// Upper bound on establishing the initial connection
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_ws_url() -> String {
    "ws://127.0.0.1:8546".to_string()
}
fn default_connect_timeout_secs() -> u64 {
    30
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            ws_url: default_ws_url(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node: NodeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Command line and `MONITOR_*` environment overrides. Anything left unset
/// falls through to the config file, then to the built-in defaults.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "geth-monitor")]
#[command(version, about = "Print new blocks and pending transactions from a local node")]
pub struct CliArgs {
    #[arg(
        long = "config",
        long_help = "TOML config file. Defaults to ./geth-monitor.toml when that file exists",
        value_name = "PATH",
        env = "MONITOR_CONFIG"
    )]
    pub config_path: Option<PathBuf>,

    #[arg(
        long = "ws-url",
        long_help = r"WebSocket RPC endpoint of the node.

Examples:
    geth:   ws://127.0.0.1:8546
    remote: wss://node.example.com",
        value_name = "WS URL",
        env = "MONITOR_WS_URL"
    )]
    pub ws_url: Option<String>,

    #[arg(
        long = "timeout",
        long_help = "Seconds to wait for the initial connection before giving up",
        value_name = "SECS",
        env = "MONITOR_CONNECT_TIMEOUT_SECS"
    )]
    pub connect_timeout_secs: Option<u64>,

    #[arg(
        long = "log-level",
        long_help = "Log filter used when RUST_LOG is not set",
        value_name = "FILTER",
        env = "MONITOR_LOG_LEVEL"
    )]
    pub log_level: Option<String>,

    #[arg(
        long = "log-json",
        long_help = "Emit logs as JSON lines",
        env = "MONITOR_LOG_JSON"
    )]
    pub log_json: bool,
}

impl Config {
    /// Load config from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the effective config: file (explicit or `geth-monitor.toml`
    /// if present), then command line / environment overrides.
    pub fn resolve(args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = match &args.config_path {
            Some(path) => Config::load(path)?,
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Config::load(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Config::default(),
        };

        config.apply_args(args);
        config.validate()?;
        Ok(config)
    }

    pub fn apply_args(&mut self, args: &CliArgs) {
        if let Some(url) = &args.ws_url {
            self.node.ws_url = url.clone();
        }
        if let Some(secs) = args.connect_timeout_secs {
            self.node.connect_timeout_secs = secs;
        }
        if let Some(level) = &args.log_level {
            self.logging.level = level.clone();
        }
        if args.log_json {
            self.logging.json = true;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.node.ws_url.trim();
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Invalid(format!(
                "node.ws_url must be a ws:// or wss:// URL, got {url:?}"
            )));
        }
        if self.node.connect_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "node.connect_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.node.connect_timeout_secs)
    }
}
