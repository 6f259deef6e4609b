use std::io::{self, Write};

use crate::sink::{Sink, SinkError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// Writes lines to the process's standard output (or standard error).
///
/// Each line goes out under the stream's own lock, so concurrent writers
/// never interleave partial lines. No buffering beyond what the standard
/// stream itself does.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    stream: Stream,
}

impl ConsoleSink {
    pub fn stdout() -> Self {
        ConsoleSink { stream: Stream::Stdout }
    }

    /// Standard error; used as the fallback for failing sinks.
    pub fn stderr() -> Self {
        ConsoleSink { stream: Stream::Stderr }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::stdout()
    }
}

impl Sink for ConsoleSink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        match self.stream {
            Stream::Stdout => io::stdout().lock().write_all(line)?,
            Stream::Stderr => io::stderr().lock().write_all(line)?,
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        match self.stream {
            Stream::Stdout => io::stdout().flush()?,
            Stream::Stderr => io::stderr().flush()?,
        }
        Ok(())
    }
}
