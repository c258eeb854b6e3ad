// THEORY:
// Logging goes through the `log` facade. `DualLogger` forwards every record to
// an `env_logger` instance (stderr, honours `RUST_LOG`) and, when a log file is
// configured, appends the same record as a timestamped line to that file so a
// batch run leaves a persistent trail next to its outputs.

use chrono::Local;
use log::{Log, Metadata, Record};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

/// Filter applied when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "dronesight=info";

pub struct DualLogger {
    env_logger: env_logger::Logger,
    file: Option<Mutex<File>>,
}

impl DualLogger {
    pub fn new(env_logger: env_logger::Logger, file: Option<File>) -> Self {
        Self { env_logger, file: file.map(Mutex::new) }
    }

    /// Installs the logger globally. `log_file` is opened in append mode.
    pub fn init(log_file: Option<&Path>) -> io::Result<()> {
        let env_logger = env_logger::Builder::from_env(
            env_logger::Env::default().default_filter_or(DEFAULT_FILTER),
        )
        .format_timestamp(Some(env_logger::fmt::TimestampPrecision::Seconds))
        .build();

        let file = log_file
            .map(|path| OpenOptions::new().create(true).append(true).open(path))
            .transpose()?;

        let max_level = env_logger.filter();
        log::set_boxed_logger(Box::new(DualLogger::new(env_logger, file)))
            .map_err(|e| io::Error::other(e.to_string()))?;
        log::set_max_level(max_level);
        Ok(())
    }

    fn format_line(record: &Record) -> String {
        format!(
            "{} - {} - {}",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            record.level(),
            record.args()
        )
    }
}

impl Log for DualLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.env_logger.enabled(metadata)
    }

    fn log(&self, record: &Record) {
        if !self.env_logger.matches(record) {
            return;
        }
        self.env_logger.log(record);

        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{}", Self::format_line(record));
            }
        }
    }

    fn flush(&self) {
        self.env_logger.flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use log::Level;
    use std::io::Read;

    #[test]
    fn records_are_teed_to_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("run.log");
        let file = OpenOptions::new().create(true).append(true).open(&path).unwrap();
        let env_logger = env_logger::Builder::new()
            .parse_filters("dronesight=info")
            .is_test(true)
            .build();
        let logger = DualLogger::new(env_logger, Some(file));

        logger.log(
            &Record::builder()
                .level(Level::Info)
                .target("dronesight::pipeline")
                .args(format_args!("pair done"))
                .build(),
        );
        logger.log(
            &Record::builder()
                .level(Level::Debug)
                .target("dronesight::pipeline")
                .args(format_args!("hidden"))
                .build(),
        );
        logger.flush();

        let mut text = String::new();
        File::open(&path).unwrap().read_to_string(&mut text).unwrap();
        assert!(text.contains("INFO - pair done"));
        assert!(!text.contains("hidden"));
    }
}
