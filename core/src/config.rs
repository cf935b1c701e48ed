//! Layered Service Configuration
//!
//! Configuration values are resolved with the following priority (highest
//! first):
//! 1. CLI arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. Default values
//!
//! The configuration file follows the XDG Base Directory specification:
//! `$XDG_CONFIG_HOME/framecast/framecast.toml` (typically
//! `~/.config/framecast/framecast.toml`), unless an explicit path is given.
//!
//! # Example Configuration
//!
//! ```toml
//! [server]
//! port = 3000
//! redirect_url = "https://github.com/framecast/framecast"
//!
//! [frames]
//! root_dir = "./frames"
//! default_set = "parrot"
//!
//! [stream]
//! tick_ms = 70
//! ```
//!
//! # Environment Variables
//!
//! - `FRAMECAST_PORT`: listen port (default: 3000)
//! - `FRAMECAST_FRAMES_DIR`: frame root directory (default: `./frames`)
//! - `FRAMECAST_DEFAULT_SET`: frame set served at `/` (default: `parrot`)
//! - `FRAMECAST_REDIRECT_URL`: where non-terminal clients are sent
//! - `FRAMECAST_TICK_MS`: emission period in milliseconds (default: 70)
//!
//! Unparsable environment values are ignored in favor of the next layer,
//! matching how the rest of the configuration degrades.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stream::driver::DEFAULT_TICK_INTERVAL;

/// Default listen port.
pub const DEFAULT_PORT: u16 = 3000;

/// Default frame root directory, relative to the working directory.
pub const DEFAULT_FRAMES_DIR: &str = "./frames";

/// Default frame set, served when the request path names none.
pub const DEFAULT_FRAME_SET: &str = "parrot";

/// Default redirect target for non-terminal clients.
pub const DEFAULT_REDIRECT_URL: &str = "https://github.com/framecast/framecast";

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("failed to read config file at {path}: {source}")]
    ReadError {
        /// The path that was attempted.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse TOML config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// A resolved value is invalid.
    #[error("invalid configuration: {0}")]
    ValidationError(String),
}

/// `[server]` section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerToml {
    /// Listen port.
    pub port: Option<u16>,

    /// Redirect target for non-terminal clients.
    pub redirect_url: Option<String>,
}

/// `[frames]` section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FramesToml {
    /// Frame root directory.
    pub root_dir: Option<PathBuf>,

    /// Frame set served when the request path names none.
    pub default_set: Option<String>,
}

/// `[stream]` section of the TOML configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamToml {
    /// Emission period in milliseconds.
    pub tick_ms: Option<u64>,
}

/// Root of the TOML configuration file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FramecastToml {
    /// `[server]` section.
    pub server: ServerToml,
    /// `[frames]` section.
    pub frames: FramesToml,
    /// `[stream]` section.
    pub stream: StreamToml,
}

/// One override layer (CLI arguments or environment variables).
///
/// `None` fields defer to the next layer down.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    /// Listen port.
    pub port: Option<u16>,
    /// Frame root directory.
    pub frames_dir: Option<PathBuf>,
    /// Default frame set.
    pub default_set: Option<String>,
    /// Redirect target for non-terminal clients.
    pub redirect_url: Option<String>,
    /// Emission period in milliseconds.
    pub tick_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Read the environment layer (`FRAMECAST_*` variables).
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            port: std::env::var("FRAMECAST_PORT")
                .ok()
                .and_then(|v| v.parse().ok()),
            frames_dir: std::env::var("FRAMECAST_FRAMES_DIR").ok().map(PathBuf::from),
            default_set: std::env::var("FRAMECAST_DEFAULT_SET").ok(),
            redirect_url: std::env::var("FRAMECAST_REDIRECT_URL").ok(),
            tick_ms: std::env::var("FRAMECAST_TICK_MS")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }
}

/// Fully resolved service configuration.
#[derive(Clone, Debug)]
pub struct ServiceConfig {
    /// Listen port.
    pub port: u16,
    /// Frame root directory.
    pub frames_dir: PathBuf,
    /// Frame set served when the request path names none.
    pub default_set: String,
    /// Redirect target for non-terminal clients.
    pub redirect_url: String,
    /// Emission period of the stream driver.
    pub tick_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            frames_dir: PathBuf::from(DEFAULT_FRAMES_DIR),
            default_set: DEFAULT_FRAME_SET.to_owned(),
            redirect_url: DEFAULT_REDIRECT_URL.to_owned(),
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl ServiceConfig {
    /// Resolve a configuration from a file layer plus override layers.
    ///
    /// Layers in `overrides` are applied in order, later entries winning;
    /// pass `[&env, &cli]` for the documented priority.
    ///
    /// # Errors
    ///
    /// [`ConfigError::ValidationError`] if the resolved tick period is zero.
    pub fn resolve(
        file: Option<&FramecastToml>,
        overrides: &[&ConfigOverrides],
    ) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(file) = file {
            if let Some(port) = file.server.port {
                config.port = port;
            }
            if let Some(ref url) = file.server.redirect_url {
                config.redirect_url = url.clone();
            }
            if let Some(ref dir) = file.frames.root_dir {
                config.frames_dir = dir.clone();
            }
            if let Some(ref set) = file.frames.default_set {
                config.default_set = set.clone();
            }
            if let Some(tick_ms) = file.stream.tick_ms {
                config.tick_interval = Duration::from_millis(tick_ms);
            }
        }

        for layer in overrides {
            if let Some(port) = layer.port {
                config.port = port;
            }
            if let Some(ref dir) = layer.frames_dir {
                config.frames_dir = dir.clone();
            }
            if let Some(ref set) = layer.default_set {
                config.default_set = set.clone();
            }
            if let Some(ref url) = layer.redirect_url {
                config.redirect_url = url.clone();
            }
            if let Some(tick_ms) = layer.tick_ms {
                config.tick_interval = Duration::from_millis(tick_ms);
            }
        }

        if config.tick_interval.is_zero() {
            return Err(ConfigError::ValidationError(
                "stream tick period must be nonzero".to_owned(),
            ));
        }

        Ok(config)
    }
}

/// The default configuration file path under the XDG config directory.
///
/// Returns `None` when no config directory can be determined.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("framecast").join("framecast.toml"))
}

/// Load and parse a TOML configuration file.
///
/// # Errors
///
/// [`ConfigError::ReadError`] if the file cannot be read,
/// [`ConfigError::ParseError`] if it is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<FramecastToml, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
        path: path.to_owned(),
        source,
    })?;
    Ok(toml::from_str(&raw)?)
}

/// Resolve the full configuration: file (explicit path, or the default path
/// if it exists), then environment, then the given CLI layer.
///
/// # Errors
///
/// An explicit `path` that cannot be loaded is an error; a missing file at
/// the default path is not.
pub fn load_config(path: Option<&Path>, cli: &ConfigOverrides) -> Result<ServiceConfig, ConfigError> {
    let file = match path {
        Some(path) => Some(load_config_file(path)?),
        None => match default_config_path() {
            Some(path) if path.exists() => Some(load_config_file(&path)?),
            _ => None,
        },
    };

    let env = ConfigOverrides::from_env();
    ServiceConfig::resolve(file.as_ref(), &[&env, cli])
}
