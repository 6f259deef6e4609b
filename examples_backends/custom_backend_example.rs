use std::sync::Arc;

use query_log_sink::encoder::JsonEncoder;
use query_log_sink::init::init_tracing;
use query_log_sink::{Level, LoggerHandle, Sink, SinkError};
use tracing::{error, info};

/// Example of plugging in a completely custom destination by implementing
/// the `Sink` trait directly. Imagine this talks to some proprietary
/// collector for which this crate does not provide a built-in sink.
struct MyCollectorSink;

impl Sink for MyCollectorSink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        // Here you would call your own client library.
        print!("[my-collector] {}", String::from_utf8_lossy(line));
        Ok(())
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let handle = Arc::new(LoggerHandle::new(
        Arc::new(MyCollectorSink),
        Arc::new(JsonEncoder::new()),
        Level::Info,
    ));

    // Plain `tracing` macros end up in the custom sink as well.
    init_tracing(Arc::clone(&handle))?;

    info!("custom backend example started");
    error!(collector = "my-collector", "simulated error sent via custom backend");
    handle.warn("direct call on the handle", &[]);
    Ok(())
}
