//! Session Error Types
//!
//! Session-scoped failures and the signed codes the backlight service
//! consumes. Output-scoped failures never surface here; they are recorded on
//! the output (see [`FailureReason`](crate::capture::FailureReason)) and the
//! run continues.

use std::time::Duration;

use thiserror::Error;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, BrightnessError>;

/// Session-scoped error types
#[derive(Error, Debug)]
pub enum BrightnessError {
    /// Compositor control channel could not be opened
    #[error("cannot connect to compositor at {address}: {reason}")]
    Connection {
        /// Socket address that was tried
        address: String,
        /// Underlying failure
        reason: String,
    },

    /// A required protocol global is not advertised
    #[error("compositor does not provide {0}")]
    MissingProtocol(&'static str),

    /// Registry advertised no outputs
    #[error("compositor reported no outputs")]
    NoOutputs,

    /// Every output failed
    #[error("no output produced a brightness sample")]
    NoData,

    /// Protocol-level failure outside any single output
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Dispatch loop failed
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

/// Errors from the blocking dispatch wait
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Bounded wait expired with no events
    #[error("no compositor events within {0:?}")]
    Timeout(Duration),

    /// Connection failed or closed
    #[error("compositor connection failed: {0}")]
    Connection(String),
}

/// Caller-facing result codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Zero outputs discovered
    Unsupported,
    /// Compositor unreachable; try another sensing backend
    WrongPlugin,
    /// Capture or buffer-transport capability missing
    CompositorNoProtocol,
    /// Any other failure, including "every output failed"
    Failed,
}

impl ErrorCode {
    /// Signed value in the backlight service's result space
    pub fn raw(self) -> i32 {
        match self {
            Self::Unsupported => i32::MIN,
            Self::WrongPlugin => i32::MIN + 1,
            Self::CompositorNoProtocol => i32::MIN + 2,
            Self::Failed => -1,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Unsupported => "UNSUPPORTED",
            Self::WrongPlugin => "WRONG_PLUGIN",
            Self::CompositorNoProtocol => "COMPOSITOR_NO_PROTOCOL",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

impl BrightnessError {
    /// Caller-facing code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Connection { .. } => ErrorCode::WrongPlugin,
            Self::MissingProtocol(_) => ErrorCode::CompositorNoProtocol,
            Self::NoOutputs => ErrorCode::Unsupported,
            Self::NoData | Self::Protocol(_) | Self::Dispatch(_) => ErrorCode::Failed,
        }
    }

    /// Build a [`BrightnessError::Connection`] error
    pub fn connection(address: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Connection {
            address: address.into(),
            reason: reason.to_string(),
        }
    }
}
