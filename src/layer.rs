use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::field::{Field as TracingField, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

use crate::callsite::short_caller;
use crate::field::{Field, FieldValue};
use crate::handle::LoggerHandle;
use crate::level::Level;
use crate::record::LogRecord;

/// `tracing_subscriber` layer that turns `tracing` events into records on
/// a [`LoggerHandle`].
///
/// Events below the handle's threshold are dropped before their fields are
/// visited. `TRACE` events are treated as `DEBUG`. The event's source
/// location becomes the record's caller.
pub struct HandleLayer {
    handle: Arc<LoggerHandle>,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events that passed the threshold and were handed to the logger.
    pub forwarded_events: Arc<AtomicU64>,
}

impl HandleLayer {
    pub fn new(handle: Arc<LoggerHandle>) -> Self {
        HandleLayer {
            handle,
            total_events: Arc::new(AtomicU64::new(0)),
            forwarded_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<S> Layer<S> for HandleLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);

        let meta = event.metadata();
        let level = Level::from(meta.level());
        if !self.handle.enabled(level) {
            return;
        }

        let mut fields = Vec::new();
        let mut message: Option<String> = None;
        let mut visitor = FieldVisitor {
            fields: &mut fields,
            message: &mut message,
        };
        event.record(&mut visitor);

        let caller = match (meta.file(), meta.line()) {
            (Some(file), Some(line)) => Some(short_caller(file, line)),
            _ => None,
        };

        let record = LogRecord::new(level, message.unwrap_or_default())
            .with_caller(caller)
            .with_fields(fields);
        self.handle.emit(record);
        self.forwarded_events.fetch_add(1, Ordering::Relaxed);
    }
}

/// Collects event fields in declaration order; the `message` field is
/// pulled out separately.
pub struct FieldVisitor<'a> {
    pub fields: &'a mut Vec<Field>,
    pub message: &'a mut Option<String>,
}

impl FieldVisitor<'_> {
    fn push(&mut self, field: &TracingField, value: FieldValue) {
        self.fields.push(Field {
            key: field.name().to_string(),
            value,
        });
    }
}

impl Visit for FieldVisitor<'_> {
    fn record_str(&mut self, field: &TracingField, value: &str) {
        if field.name() == "message" {
            *self.message = Some(value.to_string());
        } else {
            self.push(field, FieldValue::Str(value.to_string()));
        }
    }

    fn record_i64(&mut self, field: &TracingField, value: i64) {
        self.push(field, FieldValue::Int(value));
    }

    fn record_u64(&mut self, field: &TracingField, value: u64) {
        self.push(field, FieldValue::from(value));
    }

    fn record_f64(&mut self, field: &TracingField, value: f64) {
        self.push(field, FieldValue::Float(value));
    }

    fn record_bool(&mut self, field: &TracingField, value: bool) {
        self.push(field, FieldValue::Bool(value));
    }

    fn record_debug(&mut self, field: &TracingField, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = Some(format!("{:?}", value));
        } else {
            self.push(field, FieldValue::Str(format!("{:?}", value)));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::ConsoleEncoder;
    use crate::sink::{Sink, SinkError};
    use std::sync::Mutex;
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::Registry;

    #[derive(Default)]
    struct Memory(Mutex<Vec<String>>);

    impl Sink for Memory {
        fn write(&self, line: &[u8]) -> Result<(), SinkError> {
            self.0.lock().unwrap().push(String::from_utf8_lossy(line).into_owned());
            Ok(())
        }
    }

    #[test]
    fn forwards_events_with_fields_in_order() {
        let memory = Arc::new(Memory::default());
        let handle = Arc::new(LoggerHandle::new(
            memory.clone(),
            Arc::new(ConsoleEncoder::new().utc(true)),
            Level::Info,
        ));
        let layer = HandleLayer::new(handle);
        let total = Arc::clone(&layer.total_events);
        let forwarded = Arc::clone(&layer.forwarded_events);
        let subscriber = Registry::default().with(layer);

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!("too quiet");
            tracing::warn!(user_id = 42, reason = "invalid password", "authentication failed");
        });

        assert_eq!(total.load(Ordering::Relaxed), 2);
        assert_eq!(forwarded.load(Ordering::Relaxed), 1);
        let lines = memory.0.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("\tWARN\tsrc/layer.rs:"));
        assert!(lines[0].ends_with(
            "\tauthentication failed\t{\"user_id\": 42, \"reason\": \"invalid password\"}\n"
        ));
    }
}
