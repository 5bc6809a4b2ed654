use log::{Level, LevelFilter, Metadata, Record};

pub static LOGGER: Logger = Logger;

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Debug
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            // Traces go to stderr so table output stays clean on stdout.
            eprintln!("{} - {}", record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

pub fn init_logger() {
    log::set_logger(&LOGGER).unwrap();
    #[cfg(debug_assertions)]
    log::set_max_level(LevelFilter::Debug);
    #[cfg(not(debug_assertions))]
    log::set_max_level(LevelFilter::Warn);
}
