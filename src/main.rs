//! lamco-screen-brightness
//!
//! Measures the ambient brightness of a running wlroots session once and
//! prints it.

use anyhow::Result;
use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lamco_screen_brightness::config::{Config, Overrides};
use lamco_screen_brightness::wayland::WaylandCompositor;

/// Command-line arguments for lamco-screen-brightness
#[derive(Parser, Debug)]
#[command(name = "lamco-screen-brightness")]
#[command(version, about = "Ambient screen brightness for wlroots compositors", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<String>,

    /// Compositor socket name
    #[arg(short, long, env = "WAYLAND_DISPLAY")]
    pub display: Option<String>,

    /// Directory holding the compositor socket
    #[arg(short, long, env = "XDG_RUNTIME_DIR")]
    pub socket_dir: Option<String>,

    /// Never attempt zero-copy GPU capture
    #[arg(long)]
    pub no_zero_copy: bool,

    /// Bound each compositor wait, in milliseconds (0 = unbounded)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Print the full per-output report as JSON
    #[arg(long)]
    pub json: bool,

    /// Verbose logging (can be specified multiple times)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log format (json|pretty|compact)
    #[arg(long, default_value = "compact")]
    pub log_format: String,

    /// Write logs to file (instead of stderr)
    #[arg(long)]
    pub log_file: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load(path),
        None => Ok(Config::default_config()),
    };

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", lamco_screen_brightness::utils::format_user_error(&e));
            return Err(e);
        }
    };

    let config = config.with_overrides(Overrides {
        display: args.display.clone(),
        socket_dir: args.socket_dir.clone(),
        no_zero_copy: args.no_zero_copy,
        timeout_ms: args.timeout_ms,
    });

    // Keep the non-blocking writer alive until exit
    let _guard = init_logging(&args, &config.logging.level)?;

    info!("lamco-screen-brightness v{}", env!("CARGO_PKG_VERSION"));
    debug!("Config: {:?}", config);

    if let Err(e) = config.validate() {
        eprintln!("{}", lamco_screen_brightness::utils::format_user_error(&e));
        return Err(e);
    }

    let report = match lamco_screen_brightness::measure::<WaylandCompositor>(
        &config.session.display,
        &config.session.socket_dir,
        &config.capture,
    ) {
        Ok(report) => report,
        Err(e) => {
            let e = anyhow::Error::new(e);
            eprintln!("{}", lamco_screen_brightness::utils::format_user_error(&e));
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.brightness);
    }

    Ok(())
}

fn init_logging(
    args: &Args,
    configured_level: &str,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use std::path::Path;

    let log_level = match args.verbose {
        0 => configured_level,
        1 => "debug",
        _ => "trace",
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(format!(
            "lamco_screen_brightness={level},warn",
            level = log_level
        ))
    });

    // Log file: everything goes to the file, stdout stays clean for the result
    if let Some(log_file_path) = &args.log_file {
        let path = Path::new(log_file_path);
        let directory = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let file_name = path
            .file_name()
            .ok_or_else(|| anyhow::anyhow!("Invalid log file path: {}", log_file_path))?;

        let appender = tracing_appender::rolling::never(directory, file_name);
        let (writer, guard) = tracing_appender::non_blocking(appender);

        match args.log_format.as_str() {
            "json" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
            "pretty" => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .pretty()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
            _ => {
                tracing_subscriber::registry()
                    .with(env_filter)
                    .with(
                        tracing_subscriber::fmt::layer()
                            .compact()
                            .with_writer(writer)
                            .with_ansi(false),
                    )
                    .init();
            }
        }
        info!("Logging to file: {}", log_file_path);
        return Ok(Some(guard));
    }

    // stderr only
    match args.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(std::io::stderr),
                )
                .init();
        }
    }

    Ok(None)
}
