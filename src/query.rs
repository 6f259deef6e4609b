use std::error::Error;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::callsite::CallSiteResolver;
use crate::config::QueryLogConfig;
use crate::field::format_duration;
use crate::handle::LoggerHandle;
use crate::level::Level;
use crate::record::LogRecord;

/// Row count reported when the statement has no meaningful count.
pub const UNKNOWN_ROWS: i64 = -1;

/// Outcome category of one executed statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryClass {
    Error,
    Slow,
    Trace,
    Silent,
}

/// What kind of error, if any, a statement ended with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// A lookup that matched nothing; optionally suppressed.
    RecordNotFound,
    Other,
}

/// Error returned by data-access code when a lookup matched no rows.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[error("record not found")]
pub struct RecordNotFound;

/// Decides whether an error belongs to the suppressible "not found" class.
pub type NotFoundMatcher = fn(&(dyn Error + 'static)) -> bool;

/// Default matcher: true if [`RecordNotFound`] appears anywhere in the
/// error's `source()` chain.
pub fn is_record_not_found(err: &(dyn Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<RecordNotFound>() {
            return true;
        }
        current = e.source();
    }
    false
}

/// Pick the class of a finished statement. Rows are checked in order and
/// the first match wins, so a slow statement that also failed is an
/// `Error`.
pub fn classify(
    error: Option<ErrorClass>,
    elapsed: Duration,
    slow_threshold: Duration,
    ignore_record_not_found: bool,
    level: Level,
) -> QueryClass {
    let reportable_error = match error {
        Some(ErrorClass::RecordNotFound) => !ignore_record_not_found,
        Some(ErrorClass::Other) => true,
        None => false,
    };

    if reportable_error && Level::permits(level, Level::Error) {
        QueryClass::Error
    } else if !slow_threshold.is_zero()
        && elapsed > slow_threshold
        && Level::permits(level, Level::Warn)
    {
        QueryClass::Slow
    } else if level == Level::Info {
        QueryClass::Trace
    } else {
        QueryClass::Silent
    }
}

/// Logs executed SQL statements through a [`LoggerHandle`].
///
/// The data-access layer calls [`trace`](QueryLogger::trace) once per
/// statement with the start instant, a closure producing the SQL text and
/// affected row count, and the error if any. The closure runs only when
/// something is going to be logged.
///
/// The adapter has its own threshold, independent of the handle's; a
/// record has to pass both. Level, slow threshold and the not-found flag
/// can all be changed while statements are being traced.
pub struct QueryLogger {
    handle: Arc<LoggerHandle>,
    level: AtomicU8,
    slow_threshold_ms: AtomicU64,
    ignore_record_not_found_error: AtomicBool,
    resolver: CallSiteResolver,
    not_found: NotFoundMatcher,
}

impl QueryLogger {
    pub fn new(handle: Arc<LoggerHandle>, config: &QueryLogConfig) -> Self {
        QueryLogger {
            handle,
            level: AtomicU8::new(config.level as u8),
            slow_threshold_ms: AtomicU64::new(config.slow_threshold_ms),
            ignore_record_not_found_error: AtomicBool::new(config.ignore_record_not_found_error),
            resolver: CallSiteResolver::from_current_dir(),
            not_found: is_record_not_found,
        }
    }

    /// Take over every setting of a new `[database]` snapshot.
    pub fn apply(&self, config: &QueryLogConfig) {
        self.slow_threshold_ms
            .store(config.slow_threshold_ms, Ordering::Release);
        self.ignore_record_not_found_error
            .store(config.ignore_record_not_found_error, Ordering::Release);
        self.log_mode(config.level);
    }

    pub fn with_resolver(mut self, resolver: CallSiteResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Use a different test for the "record not found" class, e.g. one
    /// that recognizes a database driver's own error type.
    pub fn with_not_found_matcher(mut self, matcher: NotFoundMatcher) -> Self {
        self.not_found = matcher;
        self
    }

    pub fn level(&self) -> Level {
        Level::from_u8(self.level.load(Ordering::Acquire))
    }

    /// Set the adapter threshold for all subsequent statements.
    pub fn log_mode(&self, level: Level) -> &Self {
        self.level.store(level as u8, Ordering::Release);
        self
    }

    pub fn slow_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_threshold_ms.load(Ordering::Acquire))
    }

    pub fn ignores_record_not_found(&self) -> bool {
        self.ignore_record_not_found_error.load(Ordering::Acquire)
    }

    pub fn info(&self, message: &str) {
        self.passthrough(Level::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.passthrough(Level::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.passthrough(Level::Error, message);
    }

    fn passthrough(&self, level: Level, message: &str) {
        if !Level::permits(self.level(), level) || !self.handle.enabled(level) {
            return;
        }
        let caller = self.resolver.resolve(0);
        self.handle
            .emit(LogRecord::new(level, message).with_caller(caller));
    }

    /// Report a statement that started at `begin` and has just finished.
    /// Elapsed time is wall-clock time since `begin`.
    pub fn trace<F>(&self, begin: Instant, sql_and_rows: F, err: Option<&(dyn Error + 'static)>) -> QueryClass
    where
        F: FnOnce() -> (String, i64),
    {
        self.trace_elapsed(begin.elapsed(), sql_and_rows, err)
    }

    /// Same as [`trace`](QueryLogger::trace) with an already measured
    /// duration. Returns the class that was written, or `Silent` when the
    /// adapter or the handle threshold kept the statement out.
    pub fn trace_elapsed<F>(
        &self,
        elapsed: Duration,
        sql_and_rows: F,
        err: Option<&(dyn Error + 'static)>,
    ) -> QueryClass
    where
        F: FnOnce() -> (String, i64),
    {
        let level = self.level();
        if level == Level::Silent {
            return QueryClass::Silent;
        }

        let error_class = err.map(|e| {
            if (self.not_found)(e) {
                ErrorClass::RecordNotFound
            } else {
                ErrorClass::Other
            }
        });
        let slow_threshold = self.slow_threshold();
        let class = classify(
            error_class,
            elapsed,
            slow_threshold,
            self.ignores_record_not_found(),
            level,
        );

        let record_level = match class {
            QueryClass::Silent => return class,
            QueryClass::Error => Level::Error,
            QueryClass::Slow => Level::Warn,
            QueryClass::Trace => Level::Info,
        };
        // The handle would drop the record: skip the SQL and the stack walk.
        if !self.handle.enabled(record_level) {
            return QueryClass::Silent;
        }

        let (sql, rows) = sql_and_rows();
        let message = match class {
            QueryClass::Error => {
                let err = err.map(|e| e.to_string()).unwrap_or_default();
                format_error(elapsed, &sql, rows, &err)
            }
            QueryClass::Slow => format_slow(elapsed, slow_threshold, &sql, rows),
            _ => format_trace(elapsed, &sql, rows),
        };

        let caller = self.resolver.resolve(0);
        self.handle
            .emit(LogRecord::new(record_level, message).with_caller(caller));
        class
    }
}

fn rows_part(rows: i64) -> String {
    if rows == UNKNOWN_ROWS {
        String::new()
    } else {
        format!(" [rows:{}]", rows)
    }
}

fn format_error(elapsed: Duration, sql: &str, rows: i64, err: &str) -> String {
    format!("{}{} {} {}", format_duration(elapsed), rows_part(rows), sql, err)
}

fn format_slow(elapsed: Duration, threshold: Duration, sql: &str, rows: i64) -> String {
    format!(
        "{} SLOW SQL >= {}{} {}",
        format_duration(elapsed),
        format_duration(threshold),
        rows_part(rows),
        sql
    )
}

fn format_trace(elapsed: Duration, sql: &str, rows: i64) -> String {
    format!("{}{} {}", format_duration(elapsed), rows_part(rows), sql)
}
