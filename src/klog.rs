//! `log` backend that writes through [`Platform::print`](crate::platform::Platform::print).

use alloc::string::String;
use core::fmt::Write;
use log::{LevelFilter, Log, Metadata, Record};

use crate::platform::try_platform;

struct KernelLogger;

static LOGGER: KernelLogger = KernelLogger;

impl Log for KernelLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let Some(platform) = try_platform() else {
            return;
        };
        let mut line = String::new();
        let _ = writeln!(
            &mut line,
            "[{:<5} {}] {}",
            record.level(),
            record.target(),
            record.args()
        );
        platform.print(&line);
    }

    fn flush(&self) {}
}

/// Install the kernel logger. Later calls only adjust the level.
pub fn init(level: LevelFilter) {
    let _ = log::set_logger(&LOGGER);
    log::set_max_level(level);
}
