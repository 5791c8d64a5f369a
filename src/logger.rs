//! `log` facade wired to the host `trace` sink.

use crate::host;
use log::{Level, LevelFilter, Log, Metadata, Record};

struct TraceLogger;

static LOGGER: TraceLogger = TraceLogger;

impl Log for TraceLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        let message = format!("{}: {}", record.target(), record.args());
        host::trace(record.level() <= Level::Warn, &message);
    }

    fn flush(&self) {}
}

/// Install the trace-backed logger. Idempotent; losing the install race to
/// another logger (native test harnesses, mostly) is fine.
pub(crate) fn init() {
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Trace);
    }
}
