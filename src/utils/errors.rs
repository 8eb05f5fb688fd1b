//! User-Friendly Error Formatting
//!
//! Provides user-friendly error messages with troubleshooting hints
//! for common error scenarios.

use std::fmt::Write;

use crate::error::BrightnessError;

/// Format error for user consumption
///
/// Takes technical error and produces user-friendly message with
/// troubleshooting steps and context.
pub fn format_user_error(error: &anyhow::Error) -> String {
    let mut output = String::new();

    // Header
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "╔════════════════════════════════════════════════════════════╗"
    )
    .ok();
    writeln!(
        &mut output,
        "║                     ERROR                                  ║"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();
    writeln!(&mut output).ok();

    match error.downcast_ref::<BrightnessError>() {
        Some(BrightnessError::Connection { address, .. }) => {
            format_connection_error(&mut output, address);
        }
        Some(BrightnessError::MissingProtocol(protocol)) => {
            format_protocol_error(&mut output, protocol);
        }
        Some(BrightnessError::NoOutputs) => format_no_outputs_error(&mut output),
        Some(BrightnessError::NoData) => format_no_data_error(&mut output),
        Some(other) => format_generic_error(&mut output, &other.to_string()),
        None if error.to_string().contains("config") => format_config_error(&mut output),
        None => format_generic_error(&mut output, &error.to_string()),
    }

    if let Some(code) = error.downcast_ref::<BrightnessError>().map(BrightnessError::code) {
        writeln!(&mut output).ok();
        writeln!(&mut output, "Result code: {} ({})", code, code.raw()).ok();
    }

    // Technical details
    writeln!(&mut output).ok();
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Technical Details:").ok();
    writeln!(&mut output).ok();
    writeln!(&mut output, "{:#}", error).ok();
    writeln!(&mut output).ok();

    // Footer with help
    writeln!(
        &mut output,
        "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━"
    )
    .ok();
    writeln!(&mut output, "Need Help?").ok();
    writeln!(
        &mut output,
        "  - Run with --verbose for detailed logs: lamco-screen-brightness -vv"
    )
    .ok();
    writeln!(
        &mut output,
        "  - Inspect per-output results: lamco-screen-brightness --json"
    )
    .ok();
    writeln!(
        &mut output,
        "╚════════════════════════════════════════════════════════════╝"
    )
    .ok();

    output
}

fn format_connection_error(output: &mut String, address: &str) {
    writeln!(output, "Compositor Connection Error").ok();
    writeln!(output).ok();
    writeln!(output, "Could not connect to a Wayland compositor at:").ok();
    writeln!(output, "  {}", address).ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Wrong display name").ok();
    writeln!(output, "     → Run: echo $WAYLAND_DISPLAY").ok();
    writeln!(output, "     → Pass it with: --display wayland-1").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Wrong socket directory").ok();
    writeln!(output, "     → Run: echo $XDG_RUNTIME_DIR").ok();
    writeln!(output, "     → Pass it with: --socket-dir /run/user/$(id -u)").ok();
    writeln!(output).ok();
    writeln!(output, "  3. Not a Wayland session").ok();
    writeln!(output, "     → Another brightness backend (X11, DRM) may apply").ok();
}

fn format_protocol_error(output: &mut String, protocol: &str) {
    writeln!(output, "Compositor Protocol Error").ok();
    writeln!(output).ok();
    writeln!(output, "The compositor does not provide {}.", protocol).ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Not a wlroots compositor").ok();
    writeln!(output, "     → Screencopy requires Sway, Hyprland, River, labwc, ...").ok();
    writeln!(output, "     → GNOME and KDE do not implement wlr-screencopy").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Compositor too old").ok();
    writeln!(
        output,
        "     → zwlr_screencopy_manager_v1 version 3 or newer is required"
    )
    .ok();
}

fn format_no_outputs_error(output: &mut String) {
    writeln!(output, "No Outputs").ok();
    writeln!(output).ok();
    writeln!(output, "The compositor reported no displays to capture.").ok();
    writeln!(output).ok();
    writeln!(output, "  → Headless compositors need a virtual output").ok();
    writeln!(output, "  → Check: swaymsg -t get_outputs").ok();
}

fn format_no_data_error(output: &mut String) {
    writeln!(output, "Capture Failed").ok();
    writeln!(output).ok();
    writeln!(output, "Every output failed to produce a frame.").ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Retry with shared memory only").ok();
    writeln!(output, "     → lamco-screen-brightness --no-zero-copy").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Check for outputs that are off or locked").ok();
    writeln!(output, "     → Run with -vv to see per-output failure reasons").ok();
}

fn format_config_error(output: &mut String) {
    writeln!(output, "Configuration Error").ok();
    writeln!(output).ok();
    writeln!(output, "Problem with configuration file.").ok();
    writeln!(output).ok();
    writeln!(output, "Common Causes:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Invalid TOML syntax").ok();
    writeln!(output, "     → Check for typos, missing quotes, etc.").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Invalid values").ok();
    writeln!(output, "     → dri_dir must be an absolute path").ok();
    writeln!(
        output,
        "     → level must be one of trace, debug, info, warn, error"
    )
    .ok();
}

fn format_generic_error(output: &mut String, error: &str) {
    writeln!(output, "Brightness Measurement Error").ok();
    writeln!(output).ok();
    writeln!(output, "Error: {}", error).ok();
    writeln!(output).ok();
    writeln!(output, "Troubleshooting:").ok();
    writeln!(output).ok();
    writeln!(output, "  1. Verify you're in a Wayland session:").ok();
    writeln!(output, "     → echo $WAYLAND_DISPLAY").ok();
    writeln!(output).ok();
    writeln!(output, "  2. Bound each wait if the compositor stalls:").ok();
    writeln!(output, "     → lamco-screen-brightness --timeout-ms 2000").ok();
}
