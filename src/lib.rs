//! # lamco-screen-brightness
//!
//! Ambient screen brightness sensing for wlroots compositors.
//!
//! Captures the frame currently shown on every output through
//! `wlr-screencopy-unstable-v1` and reduces it to a single `0..=255` value
//! for automatic backlight control.
//!
//! # Architecture
//!
//! ```text
//! compute_ambient_brightness(session_id, socket_dir)
//!   └─> Session<WaylandCompositor>
//!       ├─> discover        (registry round-trip, outputs, capabilities)
//!       ├─> Negotiator      (render node + GBM, or shared memory only)
//!       ├─> per output, sequentially:
//!       │   ├─> FrameCapture state machine (tagged protocol events)
//!       │   ├─> buffer allocation (wl_shm or dmabuf import)
//!       │   └─> brightness::sample
//!       ├─> brightness::aggregate
//!       └─> close           (always, idempotent)
//! ```
//!
//! # Result Codes
//!
//! | Condition | [`ErrorCode`] |
//! |---|---|
//! | compositor unreachable | `WrongPlugin` |
//! | screencopy, or every buffer transport, missing | `CompositorNoProtocol` |
//! | no outputs | `Unsupported` |
//! | every output failed | `Failed` |

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Brightness sampling and aggregation
pub mod brightness;

/// Frame buffer types shared by every backend
pub mod buffer;

/// Per-output screencopy state machine and pixel formats
pub mod capture;

/// Configuration
pub mod config;

/// Session-scoped errors and result codes
pub mod error;

/// Zero-copy negotiation and render node discovery
pub mod negotiate;

/// Compositor session lifecycle
pub mod session;

/// Utility functions
pub mod utils;

/// wlroots backend over wayland-client
pub mod wayland;

pub use error::{BrightnessError, DispatchError, ErrorCode};
pub use session::{
    compute_ambient_brightness, measure, socket_address, BrightnessReport, Session,
};
