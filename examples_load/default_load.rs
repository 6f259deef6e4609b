use std::sync::Arc;
use std::time::Instant;

use query_log_sink::encoder::ConsoleEncoder;
use query_log_sink::noop_sink::NoopSink;
use query_log_sink::{log_debug, log_error, Level, LoggerHandle};

fn main() {
    let sink = Arc::new(NoopSink::default());
    let handle = LoggerHandle::new(sink.clone(), Arc::new(ConsoleEncoder::new()), Level::Info);

    let n: u64 = 100_000;

    // Filtered out: measures the cost of the level check alone.
    let start = Instant::now();
    for i in 0..n {
        log_debug!(handle, "default load test debug", iteration = i);
    }
    let filtered = start.elapsed();

    let start = Instant::now();
    for i in 0..n {
        log_error!(handle, "default load test error", iteration = i);
    }
    let elapsed = start.elapsed();

    println!(
        "filtered: {} calls in {:?} (~{:.0} calls/s)",
        n,
        filtered,
        n as f64 / filtered.as_secs_f64()
    );
    println!(
        "emitted: {} lines ({} bytes) in {:?} (~{:.0} lines/s)",
        sink.lines(),
        sink.bytes(),
        elapsed,
        n as f64 / elapsed.as_secs_f64()
    );
}
