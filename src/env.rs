//! Environment variable names that override the `[log]` section of the
//! config file. Overrides are applied after the file is parsed, on initial
//! load and on every hot reload.
//!
//! These are purely helpers; the sink types remain decoupled from
//! environment access.

use crate::config::LogConfig;

/// Sink selection: `stdout`, `file` or `stream`.
pub const LOG_OUTPUT_ENV: &str = "LOG_OUTPUT";

/// Path of the file sink.
pub const LOG_PATH_ENV: &str = "LOG_PATH";

/// Minimum level: `DEBUG`, `INFO`, `WARN`, `ERROR` or `FATAL`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

/// Comma-separated broker list for the stream sink.
pub const LOG_STREAM_BROKERS_ENV: &str = "LOG_STREAM_BROKERS";

/// Topic for the stream sink.
pub const LOG_STREAM_TOPIC_ENV: &str = "LOG_STREAM_TOPIC";

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Apply overrides from the process environment.
pub fn apply_env_overrides(config: &mut LogConfig) {
    apply_overrides(config, |key| std::env::var(key).ok());
}

/// Apply overrides from an arbitrary lookup; empty values are ignored.
pub fn apply_overrides<F>(config: &mut LogConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

    if let Some(v) = get(LOG_OUTPUT_ENV) {
        config.output = v;
    }
    if let Some(v) = get(LOG_PATH_ENV) {
        config.path = v;
    }
    if let Some(v) = get(LOG_LEVEL_ENV) {
        config.level = v;
    }
    if let Some(v) = get(LOG_STREAM_BROKERS_ENV) {
        config.stream_brokers = v;
    }
    if let Some(v) = get(LOG_STREAM_TOPIC_ENV) {
        config.stream_topic = v;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn overrides_replace_only_present_keys() {
        let vars: HashMap<&str, &str> = [(LOG_LEVEL_ENV, "ERROR"), (LOG_PATH_ENV, "")]
            .into_iter()
            .collect();
        let mut config = LogConfig {
            path: "logs/app.log".to_string(),
            ..LogConfig::default()
        };
        apply_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.level, "ERROR");
        assert_eq!(config.path, "logs/app.log");
        assert_eq!(config.output, "stdout");
    }

    #[test]
    fn env_or_falls_back() {
        assert_eq!(env_or("QUERY_LOG_SINK_SURELY_UNSET_VAR", "dflt"), "dflt");
    }
}
