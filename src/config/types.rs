//! Configuration type definitions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Compositor session selection
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Compositor socket name (e.g., "wayland-0")
    #[serde(default = "default_display")]
    pub display: String,

    /// Directory holding the compositor socket (usually `$XDG_RUNTIME_DIR`)
    #[serde(default = "default_socket_dir")]
    pub socket_dir: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            display: default_display(),
            socket_dir: default_socket_dir(),
        }
    }
}

fn default_display() -> String {
    std::env::var("WAYLAND_DISPLAY").unwrap_or_else(|_| "wayland-0".to_string())
}

fn default_socket_dir() -> String {
    dirs::runtime_dir()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Capture behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Attempt zero-copy GPU capture when the compositor supports it
    #[serde(default = "default_true")]
    pub zero_copy: bool,

    /// Directory scanned for `renderD*` nodes
    #[serde(default = "default_dri_dir")]
    pub dri_dir: PathBuf,

    /// Composite the cursor into captured frames
    #[serde(default)]
    pub overlay_cursor: bool,

    /// Upper bound on each dispatch wait in milliseconds (0 = wait forever)
    #[serde(default)]
    pub dispatch_timeout_ms: u64,
}

impl CaptureConfig {
    /// Dispatch wait bound, `None` when unbounded
    pub fn dispatch_timeout(&self) -> Option<Duration> {
        (self.dispatch_timeout_ms > 0).then(|| Duration::from_millis(self.dispatch_timeout_ms))
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            zero_copy: true,
            dri_dir: default_dri_dir(),
            overlay_cursor: false,
            dispatch_timeout_ms: 0,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dri_dir() -> PathBuf {
    PathBuf::from("/dev/dri")
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level ("trace", "debug", "info", "warn", "error")
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

fn default_log_level() -> String {
    "info".to_string()
}
