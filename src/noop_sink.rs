use std::sync::atomic::{AtomicU64, Ordering};

use crate::sink::{Sink, SinkError};

/// A sink that drops every line, counting what it was given.
///
/// Useful for measuring the cost of filtering and encoding without any
/// I/O, and for tests that only care about how many lines were produced.
#[derive(Debug, Default)]
pub struct NoopSink {
    lines: AtomicU64,
    bytes: AtomicU64,
}

impl NoopSink {
    pub fn lines(&self) -> u64 {
        self.lines.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }
}

impl Sink for NoopSink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        self.lines.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(line.len() as u64, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ConsoleEncoder;
    use crate::handle::LoggerHandle;
    use crate::level::Level;
    use std::sync::Arc;

    #[test]
    fn counts_only_lines_that_pass_the_threshold() {
        let sink = Arc::new(NoopSink::default());
        let log = LoggerHandle::new(sink.clone(), Arc::new(ConsoleEncoder::new()), Level::Warn);
        log.info("dropped", &[]);
        log.warn("kept", &[]);
        log.error("kept", &[]);
        assert_eq!(sink.lines(), 2);
        assert!(sink.bytes() > 0);
    }
}
