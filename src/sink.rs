use std::io;

/// Destination for encoded log lines.
///
/// Implementations are responsible for transporting bytes to a concrete
/// backend (stdout, a rotating file, a message broker). The logger calls
/// `write` directly from application threads, possibly from many at once,
/// so every implementation must serialize its physical writes: one call to
/// `write` lands as one uninterrupted line.
pub trait Sink: Send + Sync {
    /// Write a single newline-terminated line.
    ///
    /// **Returns**
    /// - `Ok(())` if the line was accepted.
    /// - `Err(..)` on an unrecoverable write failure. The logger never
    ///   passes this on to its caller; it redirects the line to the
    ///   fallback console sink instead.
    fn write(&self, line: &[u8]) -> Result<(), SinkError>;

    /// Flush any buffered lines. Default implementation is a no-op.
    fn flush(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Error type returned by sink construction and writes.
#[derive(thiserror::Error, Debug)]
pub enum SinkError {
    #[error("sink i/o error: {0}")]
    Io(#[from] io::Error),

    #[error("cannot reach broker: {0}")]
    Connection(String),

    #[error("publish failed: {0}")]
    Publish(String),

    #[error("sink is closed")]
    Closed,
}
