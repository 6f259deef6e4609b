//! Helpers shared by the integration tests.

#![allow(dead_code)]

pub mod orm;

use std::sync::{Arc, Mutex};

use query_log_sink::encoder::ConsoleEncoder;
use query_log_sink::{Level, LoggerHandle, Sink, SinkError};

/// Sink that keeps every line in memory.
#[derive(Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl Sink for MemorySink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        self.lines
            .lock()
            .unwrap()
            .push(String::from_utf8_lossy(line).into_owned());
        Ok(())
    }
}

/// Handle writing UTC console lines into a fresh [`MemorySink`].
pub fn memory_handle(level: Level) -> (Arc<LoggerHandle>, Arc<MemorySink>) {
    let memory = Arc::new(MemorySink::default());
    let handle = LoggerHandle::new(
        memory.clone(),
        Arc::new(ConsoleEncoder::new().utc(true)),
        level,
    );
    (Arc::new(handle), memory)
}

/// Split a console line into its tab-separated columns, without the
/// trailing newline.
pub fn columns(line: &str) -> Vec<&str> {
    line.trim_end_matches('\n').split('\t').collect()
}
