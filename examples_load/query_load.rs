use std::sync::Arc;
use std::time::{Duration, Instant};

use query_log_sink::encoder::ConsoleEncoder;
use query_log_sink::noop_sink::NoopSink;
use query_log_sink::{Level, LoggerHandle, QueryLogConfig, QueryLogger};

fn main() {
    let sink = Arc::new(NoopSink::default());
    let handle = Arc::new(LoggerHandle::new(
        sink.clone(),
        Arc::new(ConsoleEncoder::new()),
        Level::Debug,
    ));
    let query = QueryLogger::new(handle, &QueryLogConfig::default());

    let n: u64 = 100_000;
    let start = Instant::now();

    // Every tenth statement is slow and gets logged with a resolved caller.
    for i in 0..n {
        let elapsed = if i % 10 == 0 {
            Duration::from_millis(350)
        } else {
            Duration::from_millis(3)
        };
        query.trace_elapsed(
            elapsed,
            || (format!("SELECT * FROM orders WHERE id = {}", i), 1),
            None,
        );
    }

    let elapsed = start.elapsed();
    println!(
        "query adapter: {} statements, {} logged, in {:?} (~{:.0} stmt/s)",
        n,
        sink.lines(),
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
