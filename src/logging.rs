use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

const MAX_LOG_LEVEL: LevelFilter = LevelFilter::Debug;

static LOGGER: SimpleLogger = SimpleLogger;

/// Writes every enabled record to stderr as `[target] [level] message`.
pub struct SimpleLogger;

impl SimpleLogger {
    pub fn init() -> Result<(), SetLoggerError> {
        SimpleLogger::init_with_level(MAX_LOG_LEVEL)
    }

    pub fn init_with_level(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for SimpleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{}] [{}] {}", record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}
