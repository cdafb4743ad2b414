use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use lazy_static::lazy_static;
use log::{LevelFilter, Log, Metadata, Record};
use parking_lot::{Mutex, RwLock};

lazy_static! {
    static ref LOG_LEVEL: RwLock<LevelFilter> = RwLock::new(LevelFilter::Info);
    static ref LOG_TARGET: Mutex<LogTarget> = Mutex::new(LogTarget::Stderr);
}

/// Where log records end up. Standard output is never a target: the relay
/// speaks its protocol there.
pub enum LogTarget {
    Stderr,
    File(File),
}

impl LogTarget {
    pub fn open_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(LogTarget::File(file))
    }
}

struct DynamicLogger;

impl Log for DynamicLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= *LOG_LEVEL.read()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let now = Local::now();
            let line = format!(
                "[{}] [{}] - {}\n",
                now.format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            );
            let _ = match &mut *LOG_TARGET.lock() {
                LogTarget::Stderr => io::stderr().write_all(line.as_bytes()),
                LogTarget::File(file) => file.write_all(line.as_bytes()),
            };
        }
    }

    fn flush(&self) {
        let _ = match &mut *LOG_TARGET.lock() {
            LogTarget::Stderr => io::stderr().flush(),
            LogTarget::File(file) => file.flush(),
        };
    }
}

/// Installs the process-wide logger. Calling it again only updates the
/// level and target.
pub fn init_logger(target: LogTarget, level: LevelFilter) {
    *LOG_TARGET.lock() = target;
    *LOG_LEVEL.write() = level;
    if log::set_logger(&DynamicLogger).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}

pub fn set_log_level(level: LevelFilter) {
    *LOG_LEVEL.write() = level;
}

/// Relay verbosity: 0 silent, 1 errors only, 2 everything including raw
/// protocol lines.
pub fn verbosity_to_level(verbosity: u8) -> LevelFilter {
    match verbosity {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        _ => LevelFilter::Trace,
    }
}

pub fn parse_level(value: &str) -> Option<LevelFilter> {
    value.trim().parse::<LevelFilter>().ok()
}
