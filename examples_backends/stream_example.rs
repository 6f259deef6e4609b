use std::time::{Duration, Instant};

use query_log_sink::env::{env_or, LOG_STREAM_BROKERS_ENV, LOG_STREAM_TOPIC_ENV};
use query_log_sink::{log_info, Field, LogConfig, LoggerHandle, QueryLogConfig, QueryLogger};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // e.g. LOG_STREAM_BROKERS=127.0.0.1:9000 with `nc -lk 9000` listening
    let cfg = LogConfig {
        output: "stream".to_string(),
        format: "json".to_string(),
        stream_brokers: env_or(LOG_STREAM_BROKERS_ENV, "127.0.0.1:9000"),
        stream_topic: env_or(LOG_STREAM_TOPIC_ENV, "app-logs"),
        ..LogConfig::default()
    };

    let handle = std::sync::Arc::new(LoggerHandle::from_config(&cfg)?);
    log_info!(handle, "stream example started", pid = std::process::id());

    let query = QueryLogger::new(handle.clone(), &QueryLogConfig::default());
    let begin = Instant::now()
        .checked_sub(Duration::from_millis(420))
        .unwrap_or_else(Instant::now);
    query.trace(begin, || ("SELECT * FROM users WHERE active".to_string(), 12), None);

    handle.fatal("stream example finished", &[Field::new("ok", true)]);
    Ok(())
}
