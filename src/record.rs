use chrono::{DateTime, Utc};

use crate::field::Field;
use crate::level::Level;

/// A single structured log entry, built by the emitting call and handed to
/// the encoder by reference.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: Level,
    /// `path:line` of the originating call, when known.
    pub caller: Option<String>,
    pub message: String,
    pub fields: Vec<Field>,
}

impl LogRecord {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        LogRecord {
            timestamp: Utc::now(),
            level,
            caller: None,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with_caller(mut self, caller: Option<String>) -> Self {
        self.caller = caller.filter(|c| !c.is_empty());
        self
    }

    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        self.fields = fields;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}
