//! Utility Functions
//!
//! User-friendly error formatting for the command-line binary.
//!
//! ## Error Formatting
//!
//! The [`errors`] module turns session errors into messages with
//! troubleshooting hints:
//!
//! ```rust,no_run
//! use lamco_screen_brightness::utils::format_user_error;
//!
//! # fn run() -> anyhow::Result<()> { Ok(()) }
//! if let Err(e) = run() {
//!     eprintln!("{}", format_user_error(&e));
//! }
//! ```
//!
//! Error categories with context-aware help:
//! - Connection errors → display name, socket directory, other backends
//! - Protocol errors → wlroots compositor and screencopy version
//! - Capture errors → shared-memory fallback, per-output logs
//! - Config errors → syntax and value validation

pub mod errors;

pub use errors::format_user_error;
