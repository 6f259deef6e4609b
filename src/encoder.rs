use chrono::Local;
use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::record::LogRecord;

/// Second-resolution timestamp layout shared by both encoders.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Turns a [`LogRecord`] into one newline-terminated line of bytes.
///
/// Encoders must be deterministic: the same record always yields the same
/// bytes, with fields in the order `timestamp, level, caller, message,
/// fields`.
pub trait Encoder: Send + Sync {
    fn encode(&self, record: &LogRecord) -> Vec<u8>;
}

fn format_time(record: &LogRecord, utc: bool) -> String {
    if utc {
        record.timestamp.format(TIME_FORMAT).to_string()
    } else {
        record
            .timestamp
            .with_timezone(&Local)
            .format(TIME_FORMAT)
            .to_string()
    }
}

/// Human-readable, tab-separated encoder.
///
/// ```text
/// 2024-06-08 00:51:55	WARN	repo/user.rs:42	slow lookup	{"table": "users", "rows": 3}
/// ```
///
/// The caller column is dropped entirely when the record has none, and the
/// fields column is dropped when there are no fields. Only line breaks and
/// tabs are escaped; the output is meant for people, not parsers.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleEncoder {
    utc: bool,
}

impl ConsoleEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render timestamps in UTC instead of the local zone.
    pub fn utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }
}

fn push_escaped(out: &mut String, text: &str) {
    for ch in text.chars() {
        match ch {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
}

impl Encoder for ConsoleEncoder {
    fn encode(&self, record: &LogRecord) -> Vec<u8> {
        let mut line = format_time(record, self.utc);
        line.push('\t');
        line.push_str(record.level.as_str());
        if let Some(caller) = &record.caller {
            line.push('\t');
            push_escaped(&mut line, caller);
        }
        line.push('\t');
        push_escaped(&mut line, &record.message);

        if !record.fields.is_empty() {
            line.push_str("\t{");
            for (i, field) in record.fields.iter().enumerate() {
                if i > 0 {
                    line.push_str(", ");
                }
                let key = serde_json::to_string(&field.key).unwrap_or_else(|_| "\"?\"".into());
                let value = serde_json::to_string(&field.value).unwrap_or_else(|_| "null".into());
                line.push_str(&key);
                line.push_str(": ");
                line.push_str(&value);
            }
            line.push('}');
        }
        line.push('\n');
        line.into_bytes()
    }
}

/// One JSON object per line, keys in fixed order: `time`, `level`,
/// `caller` (only when present), `msg`, then the record fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonEncoder {
    utc: bool,
}

impl JsonEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn utc(mut self, utc: bool) -> Self {
        self.utc = utc;
        self
    }
}

/// Keys written by the encoder itself; user fields with these names are
/// emitted as `fields.<name>`.
const RESERVED_KEYS: &[&str] = &["time", "level", "caller", "msg"];

struct JsonLine<'a> {
    record: &'a LogRecord,
    utc: bool,
}

impl Serialize for JsonLine<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.record;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("time", &format_time(record, self.utc))?;
        map.serialize_entry("level", record.level.as_str())?;
        if let Some(caller) = &record.caller {
            map.serialize_entry("caller", caller)?;
        }
        map.serialize_entry("msg", &record.message)?;
        for field in &record.fields {
            if RESERVED_KEYS.contains(&field.key.as_str()) {
                map.serialize_entry(&format!("fields.{}", field.key), &field.value)?;
            } else {
                map.serialize_entry(&field.key, &field.value)?;
            }
        }
        map.end()
    }
}

impl Encoder for JsonEncoder {
    fn encode(&self, record: &LogRecord) -> Vec<u8> {
        let line = JsonLine { record, utc: self.utc };
        let mut bytes = serde_json::to_vec(&line).unwrap_or_else(|e| {
            format!("{{\"level\":\"ERROR\",\"msg\":\"unencodable record: {}\"}}", e).into_bytes()
        });
        bytes.push(b'\n');
        bytes
    }
}
