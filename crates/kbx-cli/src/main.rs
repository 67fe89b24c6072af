//! 🚀 kbx-cli: the front door, the bouncer, the maitre d' of kbx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use kbx::app_config::{LogRotation, LoggingConfig};
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

// 🔧 picked up from the working directory when no path is given
const DEFAULT_CONFIG_FILE: &str = "kbx.toml";

/// 🚀 main(): where it all begins. The genesis. The big bang.
///
/// 🔧 Steps:
/// 1. Figure out which config file, if any (one optional positional argument, no flags)
/// 2. Load config (the moment of truth)
/// 3. Init tracing: console always, plus the rotating log file if config asks for one
/// 4. Run the thing (send it and pray 🙏)
/// 5. Fatal errors exit 1. Everything else was already logged and exits 0.
#[tokio::main]
async fn main() -> Result<()> {
    let config_file = match resolve_config_file(std::env::args().nth(1)) {
        Ok(config_file) => config_file,
        Err(err) => {
            init_tracing(&LoggingConfig::default())?;
            report_fatal(&err);
            std::process::exit(1);
        }
    };

    let app_config = match kbx::app_config::load_config(config_file.as_deref()) {
        Ok(app_config) => app_config,
        Err(err) => {
            // -- 📡 no config means no log file either, console it is
            init_tracing(&LoggingConfig::default())?;
            report_fatal(&err);
            std::process::exit(1);
        }
    };

    // 🗞️ dropping this flushes the file writer, so it lives until main is done
    let log_guard = init_tracing(&app_config.logging)?;
    info!(
        "🔧 Configuration loaded from {}",
        config_file
            .as_deref()
            .map(|path| format!("'{}' and KBX_* environment variables", path.display()))
            .unwrap_or_else(|| "KBX_* environment variables".to_string())
    );

    // 🚀 SEND IT. No take-backs. This is not a drill.
    if let Err(err) = kbx::run(app_config).await {
        report_fatal(&err);
        // -- process::exit skips destructors, flush by hand
        drop(log_guard);
        std::process::exit(1);
    }

    drop(log_guard);
    Ok(())
}

/// 🎯 Explicit path must exist. No path: `kbx.toml` if it's here, else env vars only.
fn resolve_config_file(arg: Option<String>) -> Result<Option<PathBuf>> {
    match arg {
        Some(path_arg) => {
            let config_file = PathBuf::from(path_arg);
            let exists = config_file.try_exists().with_context(|| {
                format!(
                    "💀 Couldn't check whether the configuration file exists. Was checking here: '{}'",
                    config_file.display()
                )
            })?;
            if !exists {
                anyhow::bail!(
                    "💀 Configuration file '{}' doesn't exist. Maybe it's a pwd/cwd thing with relative paths; an absolute path removes all doubt.",
                    config_file.display()
                );
            }
            Ok(Some(config_file))
        }
        None => {
            let fallback = Path::new(DEFAULT_CONFIG_FILE);
            Ok(fallback.is_file().then(|| fallback.to_path_buf()))
        }
    }
}

/// 📡 Console layer always, rotating file layer (no ANSI) when configured.
/// `RUST_LOG` wins over the default `info` level.
///
/// The returned guard owns the background writer for the file. Drop it last.
fn init_tracing(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let (file_layer, guard) = match &logging.file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(rolling_appender(path, logging.rotation)?);
            (Some(fmt::layer().with_ansi(false).with_writer(writer)), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}

/// 🔄 `/var/log/kbx.log` + daily → `/var/log/kbx.log.2026-10-19`, a fresh one every day.
/// With `never` it is just `/var/log/kbx.log`, appended to forever.
fn rolling_appender(path: &Path, rotation: LogRotation) -> Result<RollingFileAppender> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("💀 The log file '{}' has no usable file name", path.display()))?;
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let rotation = match rotation {
        LogRotation::Hourly => Rotation::HOURLY,
        LogRotation::Daily => Rotation::DAILY,
        LogRotation::Never => Rotation::NEVER,
    };

    RollingFileAppender::builder()
        .rotation(rotation)
        .filename_prefix(file_name)
        .build(directory)
        .with_context(|| format!("💀 Couldn't open the log file '{}' for appending", path.display()))
}

/// 💀 Peel the onion of sadness, one layer at a time.
fn report_fatal(err: &anyhow::Error) {
    error!("💀 error: {}", err);
    for cause in err.chain().skip(1) {
        error!("⚠️  cause: {}", cause);
    }
}
