use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer};

/// Ordered log severity.
///
/// `Silent` sorts above every real level and is only meaningful as a
/// threshold: a handle whose threshold is `Silent` emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Level {
    Debug = 0,
    #[default]
    Info = 1,
    Warn = 2,
    Error = 3,
    Fatal = 4,
    Silent = 5,
}

impl Level {
    /// Upper-case name used by the encoders and the config vocabulary.
    pub fn as_str(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Silent => "SILENT",
        }
    }

    /// Parse a `[log]` level name. Matching is case-sensitive and any
    /// unrecognized value, `SILENT` included, falls back to `Info`.
    pub fn from_config(name: &str) -> Level {
        match name.parse() {
            Ok(Level::Silent) | Err(_) => Level::Info,
            Ok(level) => level,
        }
    }

    /// Parse an adapter threshold: the `[log]` names plus `SILENT`.
    pub fn from_query_config(name: &str) -> Level {
        name.parse().unwrap_or(Level::Info)
    }

    pub(crate) fn from_u8(raw: u8) -> Level {
        match raw {
            0 => Level::Debug,
            1 => Level::Info,
            2 => Level::Warn,
            3 => Level::Error,
            4 => Level::Fatal,
            _ => Level::Silent,
        }
    }

    /// Whether a record at `self` passes the given threshold.
    #[inline]
    pub fn permits(threshold: Level, level: Level) -> bool {
        level != Level::Silent && level >= threshold
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown log level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DEBUG" => Ok(Level::Debug),
            "INFO" => Ok(Level::Info),
            "WARN" => Ok(Level::Warn),
            "ERROR" => Ok(Level::Error),
            "FATAL" => Ok(Level::Fatal),
            "SILENT" => Ok(Level::Silent),
            other => Err(ParseLevelError(other.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for Level {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Level::from_query_config(&raw))
    }
}

impl From<&tracing::Level> for Level {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::ERROR => Level::Error,
            tracing::Level::WARN => Level::Warn,
            tracing::Level::INFO => Level::Info,
            // TRACE has no counterpart; it collapses into DEBUG.
            _ => Level::Debug,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_totally_ordered() {
        let all = [
            Level::Debug,
            Level::Info,
            Level::Warn,
            Level::Error,
            Level::Fatal,
            Level::Silent,
        ];
        for pair in all.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn config_names_are_case_sensitive() {
        assert_eq!(Level::from_config("WARN"), Level::Warn);
        assert_eq!(Level::from_config("warn"), Level::Info);
        assert_eq!(Level::from_config("verbose"), Level::Info);
        assert_eq!(Level::from_config("FATAL"), Level::Fatal);
    }

    #[test]
    fn silent_is_only_an_adapter_level() {
        assert_eq!(Level::from_config("SILENT"), Level::Info);
        assert_eq!(Level::from_query_config("SILENT"), Level::Silent);
        assert_eq!(Level::from_query_config("ERROR"), Level::Error);
        assert_eq!(Level::from_query_config("silent"), Level::Info);
    }

    #[test]
    fn raising_threshold_never_adds_output() {
        let all = [Level::Debug, Level::Info, Level::Warn, Level::Error, Level::Fatal];
        for &low in &all {
            for &high in &all {
                if low < high {
                    assert!(!Level::permits(high, low));
                }
            }
            assert!(!Level::permits(Level::Silent, low));
        }
    }

    #[test]
    fn round_trips_through_u8() {
        for level in [Level::Debug, Level::Warn, Level::Silent] {
            assert_eq!(Level::from_u8(level as u8), level);
        }
    }
}
