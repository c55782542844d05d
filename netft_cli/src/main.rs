mod cli;
mod run;

use std::fs;
use std::sync::OnceLock;

use clap::Parser;
use eyre::WrapErr;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Commands};
use netft_core::NetftError;

static FILE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

/// Render an error for humans: stable code, message, and the suggested
/// recovery action from the fixed set.
fn humanize(err: &eyre::Report) -> String {
    if let Some(ne) = err.downcast_ref::<NetftError>() {
        let action = match ne.recovery() {
            netft_core::RecoveryAction::Retry => "Retry the operation.",
            netft_core::RecoveryAction::Reconnect => {
                "Reconnect to the sensor. Check power and network cabling."
            }
            netft_core::RecoveryAction::Fallback => {
                "A fallback path is available; rerun and it will be used."
            }
            netft_core::RecoveryAction::ChooseDirectory => {
                "Choose a different output directory with enough free space."
            }
            netft_core::RecoveryAction::Manual => {
                "Manual intervention needed; see the log for details."
            }
        };
        return format!("[{}] {ne}\nSuggested action: {action}", ne.code());
    }

    let mut cause = String::new();
    if let Some(src) = err.source() {
        cause = format!(" Cause: {src}");
    }
    format!("Something went wrong.{cause}\nRe-run with --log-level=debug for details. Original: {err}")
}

/// Build a file sink writer, storing the non-blocking guard in OnceLock.
fn file_layer(file: Option<&str>) -> Option<tracing_appender::non_blocking::NonBlocking> {
    let path = file?;
    let p = std::path::Path::new(path);
    if let Some(parent) = p.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let appender = tracing_appender::rolling::never(".", path);
    let (nb_writer, guard) = tracing_appender::non_blocking(appender);
    let _ = FILE_GUARD.set(guard);
    Some(nb_writer)
}

/// Initialize tracing once for the whole app.
fn init_tracing(json: bool, level: &str, file: Option<&str>) {
    // Prefer RUST_LOG if set; otherwise use the CLI level.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        let console = fmt::layer().json().with_target(false);
        if let Some(nb_writer) = file_layer(file) {
            let file_l = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(nb_writer);
            registry.with(console).with(file_l).init();
        } else {
            registry.with(console).init();
        }
    } else {
        let console = fmt::layer().with_target(false);
        if let Some(nb_writer) = file_layer(file) {
            let file_l = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(nb_writer);
            registry.with(console).with(file_l).init();
        } else {
            registry.with(console).init();
        }
    }
}

fn main() -> eyre::Result<()> {
    if let Err(e) = real_main() {
        eprintln!("{}", humanize(&e));
        std::process::exit(2);
    }
    Ok(())
}

fn real_main() -> eyre::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json, &cli.log_level, cli.log_file.as_deref());

    // Preferences: file when given, defaults otherwise.
    let prefs = match &cli.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .wrap_err_with(|| format!("read config {}", path.display()))?;
            let prefs = netft_config::load_toml(&text)
                .wrap_err_with(|| format!("parse config {}", path.display()))?;
            prefs.validate().wrap_err("invalid configuration")?;
            prefs
        }
        None => netft_config::Preferences::default(),
    };

    match cli.cmd {
        Commands::Stream { ip, seconds } => run::stream(&prefs, ip, seconds),
        Commands::Record {
            ip,
            output,
            format,
            prefix,
            seconds,
        } => run::record(&prefs, ip, &output, format.into(), &prefix, seconds),
        Commands::Calibration { ip } => run::calibration(&prefs, ip),
        Commands::Bias { ip, soft, seconds } => run::bias(&prefs, ip, soft, seconds),
        Commands::Transform {
            ip,
            dx,
            dy,
            dz,
            rx,
            ry,
            rz,
        } => run::transform(&prefs, ip, netft_core::ToolTransform { dx, dy, dz, rx, ry, rz }),
        Commands::Simulate {
            udp_port,
            tcp_port,
            http_port,
            rate,
            cpf,
            cpt,
        } => run::simulate(udp_port, tcp_port, http_port, rate, cpf, cpt),
    }
}
