//! Configuration loading.
//!
//! Sources, lowest to highest precedence: built-in defaults, a TOML file,
//! then command-line flags (which fall back to `SENSORMCP_*` variables).

use std::path::{Path, PathBuf};

use clap::Args;
use sensormcp_server::ServerConfig;

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not a valid configuration document.
    #[error("invalid configuration in {path}: {source}")]
    Parse {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        source: toml::de::Error,
    },
    /// The effective configuration could not be rendered.
    #[error("cannot render configuration: {0}")]
    Render(#[from] toml::ser::Error),
}

/// Flags that override configuration values.
#[derive(Args, Debug, Default, Clone)]
pub struct ConfigArgs {
    /// Configuration file (TOML).
    #[arg(long, short = 'c', env = "SENSORMCP_CONFIG")]
    pub config: Option<PathBuf>,

    /// Serial device of the CO2 sensor.
    #[arg(long, env = "SENSORMCP_SERIAL_PORT")]
    pub serial_port: Option<String>,

    /// Open the first available serial port.
    #[arg(long)]
    pub auto_detect: bool,

    /// Serial baud rate.
    #[arg(long, env = "SENSORMCP_BAUD_RATE")]
    pub baud_rate: Option<u32>,

    /// Milliseconds to wait for the sensor before simulating a reading.
    #[arg(long, env = "SENSORMCP_SENSOR_TIMEOUT_MS")]
    pub sensor_timeout_ms: Option<u64>,

    /// Milliseconds between answering `shutdown` and exiting.
    #[arg(long, env = "SENSORMCP_SHUTDOWN_GRACE_MS")]
    pub shutdown_grace_ms: Option<u64>,

    /// Milliseconds between battery ticks (0 disables the tick).
    #[arg(long, env = "SENSORMCP_TICK_INTERVAL_MS")]
    pub tick_interval_ms: Option<u64>,

    /// Activity log file (empty disables it).
    #[arg(long, env = "SENSORMCP_ACTIVITY_LOG")]
    pub activity_log: Option<PathBuf>,

    /// Do not send the ready notification on start.
    #[arg(long)]
    pub no_announce: bool,
}

/// Default configuration file location, if the platform has one.
#[must_use]
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("sensormcp").join("config.toml"))
}

/// Reads and parses a configuration file.
pub fn load_file(path: &Path) -> Result<ServerConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Renders a configuration as TOML.
pub fn render(config: &ServerConfig) -> Result<String, ConfigError> {
    Ok(toml::to_string_pretty(config)?)
}

impl ConfigArgs {
    /// The file to load: the explicit one, else the default one if present.
    #[must_use]
    pub fn file(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| default_path().filter(|path| path.is_file()))
    }

    /// Applies these flags on top of `config`.
    pub fn apply(&self, config: &mut ServerConfig) {
        if let Some(port) = &self.serial_port {
            config.serial_port = Some(port.clone());
        }
        if self.auto_detect {
            config.auto_detect = true;
        }
        if let Some(baud) = self.baud_rate {
            config.baud_rate = baud;
        }
        if let Some(ms) = self.sensor_timeout_ms {
            config.sensor_timeout_ms = ms;
        }
        if let Some(ms) = self.shutdown_grace_ms {
            config.shutdown_grace_ms = ms;
        }
        if let Some(ms) = self.tick_interval_ms {
            config.tick_interval_ms = ms;
        }
        if let Some(path) = &self.activity_log {
            config.activity_log.clone_from(path);
        }
        if self.no_announce {
            config.announce_on_start = false;
        }
    }

    /// Resolves the effective configuration.
    ///
    /// A file that cannot be loaded is reported alongside the configuration
    /// built without it, so the caller decides whether that is fatal.
    pub fn resolve(&self) -> (ServerConfig, Option<ConfigError>) {
        let (mut config, failure) = match self.file() {
            Some(path) => match load_file(&path) {
                Ok(config) => (config, None),
                Err(e) => (ServerConfig::default(), Some(e)),
            },
            None => (ServerConfig::default(), None),
        };
        self.apply(&mut config);
        (config, failure)
    }
}
