use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};
use sentry_log::SentryLogger;


pub struct Logger {
    level: LevelFilter,
}

impl Logger {
    pub fn new(level: LevelFilter) -> Self {
        Logger {
            level,
        }
    }
}

impl Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            println!("{} [{}] {} - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.target(), record.level(), record.args());
        }
    }

    fn flush(&self) {}
}


/// Installs the console logger behind a Sentry logger, which turns warnings
/// and errors into breadcrumbs and events once a Sentry client is bound.
pub fn init(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let logger = SentryLogger::with_dest(Logger::new(level));

    log::set_boxed_logger(Box::new(logger))?;
    log::set_max_level(level);

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;

    #[test]
    fn filters_below_level() {
        let logger = Logger::new(LevelFilter::Warn);

        let warn = Metadata::builder().level(Level::Warn).target("awareify").build();
        let info = Metadata::builder().level(Level::Info).target("awareify").build();

        assert!(logger.enabled(&warn));
        assert!(!logger.enabled(&info));
    }
}
