//! Leveled structured logging with pluggable sinks and a SQL query log
//! adapter.
//!
//! A [`LoggerHandle`] owns one encoder, one sink and an atomic threshold.
//! Sinks write to the console, to a size/age rotated file, or to a message
//! stream. [`QueryLogger`] sits between a data-access layer and a handle and
//! classifies every executed statement as failed, slow or plain trace.

pub mod level;
pub mod field;
pub mod record;
pub mod encoder;

pub mod sink;
pub mod console_sink;
pub mod noop_sink;
pub mod file_sink;
pub mod stream;
#[cfg(feature = "kafka")]
pub mod kafka;

pub mod backend;
pub mod config;
pub mod env;
pub mod watcher;

pub mod handle;
pub mod callsite;
pub mod query;

pub mod layer;
pub mod init;

pub use config::{Config, LogConfig, QueryLogConfig};
pub use field::{Field, FieldValue};
pub use handle::LoggerHandle;
pub use level::Level;
pub use query::{QueryClass, QueryLogger, RecordNotFound};
pub use sink::{Sink, SinkError};
