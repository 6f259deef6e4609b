use std::panic::Location;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::{Duration, Instant};

use crate::backend::{make_encoder, make_sink_from_config, sink_config, BuildError};
use crate::callsite::short_caller;
use crate::config::LogConfig;
use crate::console_sink::ConsoleSink;
use crate::encoder::Encoder;
use crate::field::Field;
use crate::level::Level;
use crate::record::LogRecord;
use crate::sink::{Sink, SinkError};

/// How long `replace` waits for in-flight writers to let go of the old
/// pipeline before parking it.
const RETIRE_WAIT: Duration = Duration::from_secs(1);

struct Pipeline {
    encoder: Arc<dyn Encoder>,
    sink: Arc<dyn Sink>,
}

/// Long-lived logger bound to one sink, one encoder and one threshold.
///
/// Handles are shared as `Arc<LoggerHandle>` and are safe to call from any
/// number of threads. The threshold is an atomic, so [`set_level`] never
/// tears against a concurrent log call. The sink/encoder pair can be
/// swapped with [`reload`]: a writer that already picked up the old pair
/// finishes against it, and the old sink is released once the last such
/// writer is done.
///
/// No logging method returns an error. When the sink fails, the line and
/// a short notice go to the fallback sink (stderr unless replaced).
///
/// [`set_level`]: LoggerHandle::set_level
/// [`reload`]: LoggerHandle::reload
pub struct LoggerHandle {
    level: AtomicU8,
    pipeline: RwLock<Arc<Pipeline>>,
    // Replaced pipelines still held by a slow writer.
    retired: Mutex<Vec<Arc<Pipeline>>>,
    fallback: Arc<dyn Sink>,
}

impl LoggerHandle {
    pub fn new(sink: Arc<dyn Sink>, encoder: Arc<dyn Encoder>, level: Level) -> Self {
        LoggerHandle {
            level: AtomicU8::new(level as u8),
            pipeline: RwLock::new(Arc::new(Pipeline { encoder, sink })),
            retired: Mutex::new(Vec::new()),
            fallback: Arc::new(ConsoleSink::stderr()),
        }
    }

    /// Build sink, encoder and threshold from a config snapshot.
    pub fn from_config(cfg: &LogConfig) -> Result<Self, BuildError> {
        let sink = make_sink_from_config(&sink_config(cfg)?)?;
        Ok(Self::new(sink, make_encoder(cfg), cfg.level()))
    }

    /// Replace the sink used when the primary sink fails.
    pub fn with_fallback(mut self, fallback: Arc<dyn Sink>) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Change the threshold for every subsequent call on this handle.
    /// Lines already queued inside a sink are not affected.
    pub fn set_level(&self, level: Level) {
        self.level.store(level as u8, Ordering::Release);
    }

    #[inline]
    pub fn enabled(&self, level: Level) -> bool {
        Level::permits(self.level(), level)
    }

    /// Apply a new config snapshot: build the new sink first, then swap
    /// sink, encoder and threshold. On error the current setup stays.
    pub fn reload(&self, cfg: &LogConfig) -> Result<(), BuildError> {
        let sink = make_sink_from_config(&sink_config(cfg)?)?;
        self.replace(sink, make_encoder(cfg));
        self.set_level(cfg.level());
        Ok(())
    }

    /// Swap the sink and encoder. The previous sink is flushed and then
    /// released on the calling thread once in-flight writes finish, so a
    /// logging call never ends up running a sink's teardown. A writer
    /// still busy after a short wait leaves the old pipeline parked until
    /// the next swap.
    pub fn replace(&self, sink: Arc<dyn Sink>, encoder: Arc<dyn Encoder>) {
        let next = Arc::new(Pipeline { encoder, sink });
        let previous = {
            let mut guard = self.pipeline.write().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *guard, next)
        };

        // No new clones of `previous` can appear after the swap.
        let deadline = Instant::now() + RETIRE_WAIT;
        while Arc::strong_count(&previous) > 1 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }
        if let Err(e) = previous.sink.flush() {
            self.report(&e, None);
        }

        let mut retired = self.retired.lock().unwrap_or_else(|p| p.into_inner());
        retired.retain(|p| Arc::strong_count(p) > 1);
        if Arc::strong_count(&previous) > 1 {
            retired.push(previous);
        }
    }

    /// Pipelines replaced but not yet released because a writer still
    /// held them at swap time.
    pub fn retired_pipelines(&self) -> usize {
        let retired = self.retired.lock().unwrap_or_else(|p| p.into_inner());
        retired.iter().filter(|p| Arc::strong_count(p) > 1).count()
    }

    fn current(&self) -> Arc<Pipeline> {
        let guard = self.pipeline.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    #[track_caller]
    pub fn debug(&self, message: &str, fields: &[Field]) {
        self.log(Level::Debug, message, fields);
    }

    #[track_caller]
    pub fn info(&self, message: &str, fields: &[Field]) {
        self.log(Level::Info, message, fields);
    }

    #[track_caller]
    pub fn warn(&self, message: &str, fields: &[Field]) {
        self.log(Level::Warn, message, fields);
    }

    #[track_caller]
    pub fn error(&self, message: &str, fields: &[Field]) {
        self.log(Level::Error, message, fields);
    }

    /// Log at FATAL and flush. Ending the process is up to the caller.
    #[track_caller]
    pub fn fatal(&self, message: &str, fields: &[Field]) {
        self.log(Level::Fatal, message, fields);
        self.flush();
    }

    #[track_caller]
    pub fn log(&self, level: Level, message: &str, fields: &[Field]) {
        if !self.enabled(level) {
            return;
        }
        let caller = caller_of(Location::caller());
        self.emit(
            LogRecord::new(level, message)
                .with_caller(Some(caller))
                .with_fields(fields.to_vec()),
        );
    }

    /// Log with owned message and fields; used by the `log_*!` macros after
    /// the level check has passed.
    #[track_caller]
    pub fn log_fields(&self, level: Level, message: impl Into<String>, fields: Vec<Field>) {
        if !self.enabled(level) {
            return;
        }
        let caller = caller_of(Location::caller());
        self.emit(
            LogRecord::new(level, message)
                .with_caller(Some(caller))
                .with_fields(fields),
        );
    }

    /// Build message and fields lazily, only if `level` is enabled.
    #[track_caller]
    pub fn log_with<F>(&self, level: Level, build: F)
    where
        F: FnOnce() -> (String, Vec<Field>),
    {
        if !self.enabled(level) {
            return;
        }
        let (message, fields) = build();
        self.log_fields(level, message, fields);
    }

    /// Encode and write a fully built record, subject to the threshold.
    pub fn emit(&self, record: LogRecord) {
        if !self.enabled(record.level) {
            return;
        }
        let pipeline = self.current();
        let line = pipeline.encoder.encode(&record);
        if let Err(e) = pipeline.sink.write(&line) {
            self.report(&e, Some(&line));
        }
    }

    /// Flush the active sink. Failures are reported to the fallback sink.
    pub fn flush(&self) {
        if let Err(e) = self.current().sink.flush() {
            self.report(&e, None);
        }
    }

    fn report(&self, err: &SinkError, line: Option<&[u8]>) {
        let notice = format!("log sink failure: {}\n", err);
        let _ = self.fallback.write(notice.as_bytes());
        if let Some(line) = line {
            let _ = self.fallback.write(line);
        }
    }
}

fn caller_of(location: &Location<'_>) -> String {
    short_caller(location.file(), location.line())
}

/// Log at an explicit level. Message and fields are evaluated only when
/// the level is enabled on the handle.
///
/// ```ignore
/// log_at!(handle, Level::Info, "listening", port = 8080, tls = true);
/// ```
#[macro_export]
macro_rules! log_at {
    ($handle:expr, $level:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {{
        let handle = &$handle;
        let level = $level;
        if handle.enabled(level) {
            handle.log_fields(
                level,
                $msg,
                vec![$($crate::field::Field::new(stringify!($key), $value)),*],
            );
        }
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($handle:expr, $($rest:tt)+) => {
        $crate::log_at!($handle, $crate::level::Level::Debug, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_info {
    ($handle:expr, $($rest:tt)+) => {
        $crate::log_at!($handle, $crate::level::Level::Info, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_warn {
    ($handle:expr, $($rest:tt)+) => {
        $crate::log_at!($handle, $crate::level::Level::Warn, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_error {
    ($handle:expr, $($rest:tt)+) => {
        $crate::log_at!($handle, $crate::level::Level::Error, $($rest)+)
    };
}

#[macro_export]
macro_rules! log_fatal {
    ($handle:expr, $($rest:tt)+) => {{
        let handle = &$handle;
        $crate::log_at!(*handle, $crate::level::Level::Fatal, $($rest)+);
        handle.flush();
    }};
}
