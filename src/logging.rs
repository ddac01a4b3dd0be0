//! Storage-stack logging facility
//!
//! Provides thread-safe logging through the `log` crate. Records are
//! forwarded to a console sink registered by the host system; without a
//! sink the stack stays silent but behaves identically.

use core::fmt::Write as _;

use alloc::string::String;
use log::{LevelFilter, Log, Metadata, Record};
use spin::Mutex;

/// One-way diagnostic channel supplied by the host (VGA console, serial,
/// a test buffer). No backpressure, no return value.
pub trait ConsoleSink: Send + Sync {
    fn write(&self, text: &str);
}

/// Global logger instance available throughout the stack
pub static LOGGER: Logger = Logger::new();

/// Thread-safe logger implementation
pub struct Logger {
    sink: Mutex<Option<&'static dyn ConsoleSink>>,
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

impl Logger {
    /// Creates a new logger instance with no sink attached
    pub const fn new() -> Logger {
        Logger {
            sink: Mutex::new(None),
        }
    }

    /// Attaches the console sink that receives formatted records
    pub fn set_sink(&self, sink: &'static dyn ConsoleSink) {
        *self.sink.lock() = Some(sink);
    }
}

impl Log for Logger {
    /// Determines if a log message should be processed based on its level
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    /// Formats a record as "[LEVEL] message" and hands it to the sink
    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            let guard = self.sink.lock();
            if let Some(sink) = *guard {
                let mut line = String::new();
                let _ = write!(line, "[{}] {}\n", record.level(), record.args());
                sink.write(&line);
            }
        }
    }

    /// Flush buffered logs (no-op in this implementation)
    fn flush(&self) {}
}

/// Initializes the logging system
///
/// Attaches `sink` and installs the logger. Debug builds log at
/// `Debug`, release builds at `Info`.
pub fn init(sink: &'static dyn ConsoleSink) {
    LOGGER.set_sink(sink);
    log::set_logger(&LOGGER)
        .map(|()| {
            log::set_max_level(
                #[cfg(debug_assertions)]
                LevelFilter::Debug,
                #[cfg(not(debug_assertions))]
                LevelFilter::Info,
            )
        })
        .expect("Logger initialization failed");
}
