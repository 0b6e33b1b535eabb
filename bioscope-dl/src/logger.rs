use kdam::term::Colorizer;
use log::{Level, LevelFilter, Metadata, Record};

static LOGGER: Logger = Logger;

pub fn init(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

pub struct Logger;

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            match log::max_level() {
                LevelFilter::Off => (),
                LevelFilter::Error | LevelFilter::Warn | LevelFilter::Info => {
                    match record.level() {
                        Level::Info => eprintln!("{}", record.args()),
                        _ => eprintln!("{} {}", label(record.level()), record.args()),
                    }
                }
                LevelFilter::Debug | LevelFilter::Trace => {
                    let location = match (record.file(), record.line()) {
                        (Some(file), Some(line)) => format!("[{}:{}]", file, line),
                        _ => "[unk]".to_owned(),
                    };

                    eprintln!(
                        "{} {} {} {}",
                        label(record.level()),
                        record.target().colorize("dimmed"),
                        location.colorize("dimmed"),
                        record.args()
                    );
                }
            }
        }
    }

    fn flush(&self) {}
}

fn label(level: Level) -> String {
    match level {
        Level::Debug => "[DEBUG]".colorize("bold blue"),
        Level::Error => "[ERROR]".colorize("bold red"),
        Level::Info => "[INFO]".colorize("bold green"),
        Level::Trace => "[TRACE]".colorize("bold magenta"),
        Level::Warn => "[WARN]".colorize("bold yellow"),
    }
}
