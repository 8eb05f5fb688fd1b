//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables
//! - CLI arguments

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub mod types;

pub use types::{CaptureConfig, LoggingConfig, SessionConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Compositor session selection
    #[serde(default)]
    pub session: SessionConfig,
    /// Capture behaviour
    #[serde(default)]
    pub capture: CaptureConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Command-line values that take precedence over the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Compositor socket name
    pub display: Option<String>,
    /// Socket directory
    pub socket_dir: Option<String>,
    /// Force shared-memory capture
    pub no_zero_copy: bool,
    /// Dispatch wait bound in milliseconds
    pub timeout_ms: Option<u64>,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Self {
        Config {
            session: SessionConfig::default(),
            capture: CaptureConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.session.display.is_empty() {
            anyhow::bail!("Compositor display name is empty");
        }
        if self.session.socket_dir.is_empty() {
            anyhow::bail!("Socket directory is empty (is XDG_RUNTIME_DIR set?)");
        }
        if !self.capture.dri_dir.is_absolute() {
            anyhow::bail!("dri_dir must be absolute: {:?}", self.capture.dri_dir);
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, overrides: Overrides) -> Self {
        if let Some(display) = overrides.display {
            self.session.display = display;
        }
        if let Some(socket_dir) = overrides.socket_dir {
            self.session.socket_dir = socket_dir;
        }
        if overrides.no_zero_copy {
            self.capture.zero_copy = false;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.capture.dispatch_timeout_ms = timeout_ms;
        }

        self
    }

    /// Compositor socket path this config points at
    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(crate::session::socket_address(
            &self.session.socket_dir,
            &self.session.display,
        ))
    }
}
