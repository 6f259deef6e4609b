use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::env::apply_env_overrides;
use crate::level::Level;

/// Name of the config file looked up inside a config directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// Flat logger options as they appear in the `[log]` table.
///
/// All keys are optional. Unknown `output` values select stdout and
/// unknown `level` values select `INFO`; only missing fields required by
/// the selected output are rejected (see [`crate::backend::sink_config`]).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// `stdout`, `file` or `stream`.
    pub output: String,
    pub path: String,
    pub level: String,
    /// `console` or `json`.
    pub format: String,
    /// Render timestamps in UTC rather than local time.
    pub utc: bool,
    /// Comma-separated `host:port` list.
    pub stream_brokers: String,
    pub stream_topic: String,
    /// `tcp` or `kafka`.
    pub stream_transport: String,
    /// Bytes; 0 disables size-based rotation.
    pub rotate_size: u64,
    /// Hours; 0 disables age-based rotation.
    pub keep_hours: u64,
    /// Archived files kept; 0 keeps all.
    pub rotate_num: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            output: "stdout".to_string(),
            path: String::new(),
            level: "INFO".to_string(),
            format: "console".to_string(),
            utc: false,
            stream_brokers: String::new(),
            stream_topic: String::new(),
            stream_transport: "tcp".to_string(),
            rotate_size: 0,
            keep_hours: 0,
            rotate_num: 0,
        }
    }
}

/// Encoding selected by the `format` key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Console,
    Json,
}

impl LogConfig {
    pub fn level(&self) -> Level {
        Level::from_config(&self.level)
    }

    pub fn format(&self) -> Format {
        match self.format.as_str() {
            "json" => Format::Json,
            _ => Format::Console,
        }
    }

    /// Broker addresses with whitespace and empty entries removed.
    pub fn brokers(&self) -> Vec<String> {
        self.stream_brokers
            .split(',')
            .map(str::trim)
            .filter(|b| !b.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Options of the query log adapter, the `[database]` table.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryLogConfig {
    /// Queries slower than this are reported at WARN; 0 disables.
    pub slow_threshold_ms: u64,
    /// Do not report "record not found" errors.
    pub ignore_record_not_found_error: bool,
    /// Adapter threshold; accepts `SILENT` in addition to the regular names.
    pub level: Level,
}

impl Default for QueryLogConfig {
    fn default() -> Self {
        QueryLogConfig {
            slow_threshold_ms: 200,
            ignore_record_not_found_error: false,
            level: Level::Warn,
        }
    }
}

impl QueryLogConfig {
    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms)
    }
}

/// Snapshot of the whole config file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    pub database: QueryLogConfig,
}

impl Config {
    /// Load `<dir>/config.toml`.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load_file(dir.as_ref().join(CONFIG_FILE_NAME))
    }

    /// Load a config file and apply environment overrides.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        apply_env_overrides(&mut config.log);
        Ok(config)
    }

    /// Parse TOML text without touching the environment.
    pub fn from_toml_str(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }
}

/// Errors raised while loading or validating configuration. These are
/// only ever surfaced at initialization or reload time.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("file output requires a non-empty `path`")]
    MissingPath,

    #[error("stream output requires `streamBrokers` and `streamTopic`")]
    MissingStreamTarget,

    #[error("unsupported stream transport: {0}")]
    UnsupportedTransport(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.log.level(), Level::Info);
        assert_eq!(config.database.slow_threshold(), Duration::from_millis(200));
        assert_eq!(config.database.level, Level::Warn);
    }

    #[test]
    fn parses_camel_case_keys() {
        let config = Config::from_toml_str(
            r#"
            [log]
            output = "file"
            path = "logs/app.log"
            level = "DEBUG"
            format = "json"
            rotateSize = 1048576
            keepHours = 24
            rotateNum = 5

            [database]
            slowThresholdMs = 500
            ignoreRecordNotFoundError = true
            level = "INFO"
            "#,
        )
        .unwrap();

        assert_eq!(config.log.output, "file");
        assert_eq!(config.log.level(), Level::Debug);
        assert_eq!(config.log.format(), Format::Json);
        assert_eq!(config.log.rotate_size, 1_048_576);
        assert_eq!(config.log.keep_hours, 24);
        assert_eq!(config.log.rotate_num, 5);
        assert_eq!(config.database.slow_threshold(), Duration::from_millis(500));
        assert!(config.database.ignore_record_not_found_error);
        assert_eq!(config.database.level, Level::Info);
    }

    #[test]
    fn unknown_level_and_format_fall_back() {
        let config = Config::from_toml_str(
            r#"
            [log]
            level = "debug"
            format = "xml"
            "#,
        )
        .unwrap();
        assert_eq!(config.log.level(), Level::Info);
        assert_eq!(config.log.format(), Format::Console);
    }

    #[test]
    fn silent_is_rejected_for_log_but_kept_for_database() {
        let config = Config::from_toml_str(
            r#"
            [log]
            level = "SILENT"

            [database]
            level = "SILENT"
            "#,
        )
        .unwrap();
        assert_eq!(config.log.level(), Level::Info);
        assert_eq!(config.database.level, Level::Silent);

        let mut log = LogConfig::default();
        crate::env::apply_overrides(&mut log, |key| {
            (key == crate::env::LOG_LEVEL_ENV).then(|| "SILENT".to_string())
        });
        assert_eq!(log.level(), Level::Info);
    }

    #[test]
    fn brokers_are_split_and_trimmed() {
        let config = LogConfig {
            stream_brokers: " a:9092, ,b:9092 ".to_string(),
            ..LogConfig::default()
        };
        assert_eq!(config.brokers(), vec!["a:9092", "b:9092"]);
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE_NAME), "[log\noutput=").unwrap();
        let err = Config::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}
