use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::{mpsc, OnceLock};

use anyhow::{Context, Result};
use chrono::Local;
use parking_lot::Mutex;

static LOGGER: OnceLock<Mutex<Logger>> = OnceLock::new();

struct Logger {
    file: File,
    tui_tx: Option<mpsc::Sender<String>>,
    prefixes: HashMap<String, u8>, // prefix -> color index
}

// Color indices for TUI rendering (mapped in ui.rs)
pub const COLOR_GRAY: u8 = 1;
pub const COLOR_BLUE: u8 = 2;
pub const COLOR_GREEN: u8 = 3;
pub const COLOR_MAGENTA: u8 = 4;

/// Initialize the global logger. Clears the log file.
pub fn init(log_dir: &Path) -> Result<()> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log dir {}", log_dir.display()))?;
    let log_path = log_dir.join("app.log");
    let file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    LOGGER
        .set(Mutex::new(Logger { file, tui_tx: None, prefixes: HashMap::new() }))
        .ok();
    Ok(())
}

/// Wire the TUI log channel.
pub fn set_tui_sender(tx: mpsc::Sender<String>) {
    if let Some(logger) = LOGGER.get() {
        logger.lock().tui_tx = Some(tx);
    }
}

/// Register a prefix with a color. All subsequent log calls through
/// `*_p` will use this color for the prefix.
pub fn register_prefix(prefix: &str, color: u8) {
    if let Some(logger) = LOGGER.get() {
        logger.lock().prefixes.insert(prefix.to_string(), color);
    }
}

/// Internal: format for TUI channel uses \x1f as field separator:
/// level\x1fprefix\x1fcolor\x1ftimestamp\x1fmessage
fn write_log(level: &str, prefix: &str, msg: &str) {
    let Some(logger) = LOGGER.get() else { return };
    let ts = Local::now().format("%H:%M:%S").to_string();

    // File always gets plain text
    let file_line = if prefix.is_empty() {
        format!("[{}] [{}] {}", ts, level, msg)
    } else {
        format!("[{}] [{}] [{}] {}", ts, level, prefix, msg)
    };

    let mut l = logger.lock();
    let color = l.prefixes.get(prefix).copied().unwrap_or(0);
    let tui_line = format!("{}\x1f{}\x1f{}\x1f{}\x1f{}", level, prefix, color, ts, msg);

    writeln!(l.file, "{}", file_line).ok();
    if let Some(tx) = &l.tui_tx {
        tx.send(tui_line).ok();
    }
}

pub fn info(msg: &str) {
    write_log("INFO", "", msg);
}

pub fn warn(msg: &str) {
    write_log("WARN", "", msg);
}

pub fn error(msg: &str) {
    write_log("ERROR", "", msg);
}

/// Log with a registered prefix.
pub fn info_p(prefix: &str, msg: &str) {
    write_log("INFO", prefix, msg);
}

pub fn warn_p(prefix: &str, msg: &str) {
    write_log("WARN", prefix, msg);
}

pub fn error_p(prefix: &str, msg: &str) {
    write_log("ERROR", prefix, msg);
}
