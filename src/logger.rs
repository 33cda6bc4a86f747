//! Session logger.
//!
//! `tracing` output goes to `shaderstack.log` next to the settings file
//! (see [`crate::settings::config_dir`]), truncated at every launch.
//! Warnings and errors are mirrored to stderr.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

use crate::settings::config_dir;

const LOG_FILE: &str = "shaderstack.log";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();

/// Where this session is logging, once [`init`] managed to open the file.
pub fn log_path() -> Option<&'static PathBuf> {
    LOG_PATH.get()
}

/// Install the global subscriber and a panic hook.  `verbose` lowers the
/// file level from `INFO` to `DEBUG`.  Safe to call when a subscriber is
/// already set; it then does nothing.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let path = config_dir().unwrap_or_else(|| PathBuf::from(".")).join(LOG_FILE);

    let installed = match open_truncated(&path) {
        Ok(file) => {
            let _ = LOG_PATH.set(path.clone());
            let writer = Mutex::new(file)
                .with_max_level(level)
                .and(std::io::stderr.with_max_level(Level::WARN));
            tracing_subscriber::fmt()
                .with_writer(writer)
                .with_max_level(level)
                .with_ansi(false)
                .with_target(false)
                .try_init()
        }
        Err(e) => {
            eprintln!("[logger] cannot open {}: {e}; logging to stderr", path.display());
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_max_level(level)
                .with_target(false)
                .try_init()
        }
    };
    if installed.is_err() {
        return;
    }

    tracing::info!(version = env!("CARGO_PKG_VERSION"), log = ?log_path(), "ShaderStack session started");

    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("panic: {info}");
        previous(info);
    }));
}

fn open_truncated(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).write(true).truncate(true).open(path)
}
