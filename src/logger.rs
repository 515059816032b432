//! `log`-facade logger backed by the serial console.
//!
//! Grounded on the reference kernel's `SerialLogger` (`serial.rs`), a
//! zero-state `log::Log` implementation that formats `[level] target: args`
//! and writes it out over serial. Installed once, at the very start of
//! boot, so every later init step can log through the facade.

use crate::serial_println;

pub struct SerialLogger;

impl SerialLogger {
    pub const fn new() -> Self {
        SerialLogger
    }
}

impl Default for SerialLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl log::Log for SerialLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        if self.enabled(record.metadata()) {
            serial_println!(
                "[{}] {}: {}",
                record.level(),
                record.target(),
                record.args()
            );
        }
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger::new();

/// Install the serial logger as the global `log` facade. Idempotent:
/// a second call is a silent no-op per `log::set_logger`'s own contract.
pub fn init() {
    crate::serial::init();
    let _ = log::set_logger(&LOGGER).map(|()| log::set_max_level(log::LevelFilter::Trace));
}
