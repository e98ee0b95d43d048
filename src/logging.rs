//! Process-wide logging.
//!
//! Components log through the `log` facade. `init` installs `env_logger` once, teeing every
//! record to stderr and, when configured, to an append-only log file. `RUST_LOG` still
//! overrides the configured level for targeted debugging.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

pub const DEFAULT_LOG_FILE: &str = "smart_detection.log";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    #[serde(alias = "warn")]
    #[value(alias = "warn")]
    Warning,
    Error,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(anyhow!(
                "unknown log level {:?} (expected debug, info, warning or error)",
                other
            )),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Append-only log file; `None` logs to stderr only.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: Some(PathBuf::from(DEFAULT_LOG_FILE)),
        }
    }
}

type SharedFile = Arc<Mutex<BufWriter<File>>>;

/// Flushes the log file when dropped. Keep it alive for the life of `main`.
#[must_use = "dropping the guard flushes and stops file logging promptly"]
pub struct LogGuard {
    file: Option<SharedFile>,
}

impl LogGuard {
    pub fn flush(&self) {
        log::logger().flush();
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                let _ = file.flush();
            }
        }
    }
}

impl Drop for LogGuard {
    fn drop(&mut self) {
        self.flush();
    }
}

struct TeeWriter {
    file: Option<SharedFile>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        std::io::stderr().write_all(buf)?;
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.write_all(buf)?;
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        std::io::stderr().flush()?;
        if let Some(file) = &self.file {
            if let Ok(mut file) = file.lock() {
                file.flush()?;
            }
        }
        Ok(())
    }
}

/// Install the process logger. A second call (tests, embedding) keeps the first logger
/// and only adjusts the maximum level.
pub fn init(config: &LoggingConfig) -> Result<LogGuard> {
    let file = match &config.file {
        Some(path) => {
            let handle = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("open log file {}", path.display()))?;
            Some(Arc::new(Mutex::new(BufWriter::new(handle))))
        }
        None => None,
    };

    let mut builder = env_logger::Builder::new();
    builder
        .filter_level(config.level.to_filter())
        .parse_env(env_logger::Env::default())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} - {} - {} - {}",
                buf.timestamp_millis(),
                record.target(),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(TeeWriter {
            file: file.clone(),
        })));

    match builder.try_init() {
        Ok(()) => Ok(LogGuard { file }),
        Err(_) => {
            log::set_max_level(config.level.to_filter());
            log::debug!("logger already installed; keeping existing sinks");
            Ok(LogGuard { file: None })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!("DEBUG".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!("warn".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert_eq!("Warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn levels_map_to_filters() {
        assert_eq!(LogLevel::Warning.to_filter(), log::LevelFilter::Warn);
        assert_eq!(LogLevel::default().to_filter(), log::LevelFilter::Info);
    }

    #[test]
    fn deserializes_from_config_strings() {
        let level: LogLevel = serde_json::from_str("\"warn\"").unwrap();
        assert_eq!(level, LogLevel::Warning);
        let level: LogLevel = serde_json::from_str("\"error\"").unwrap();
        assert_eq!(level, LogLevel::Error);
    }

    #[test]
    fn tee_writer_appends_to_file() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("app.log");
        let file = File::create(&path)?;
        let shared = Arc::new(Mutex::new(BufWriter::new(file)));
        let mut tee = TeeWriter {
            file: Some(shared.clone()),
        };
        tee.write_all(b"hello\n")?;
        tee.flush()?;
        assert_eq!(std::fs::read_to_string(&path)?, "hello\n");
        Ok(())
    }
}
