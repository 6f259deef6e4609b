use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};

use crate::config::{Config, CONFIG_FILE_NAME};
use crate::field::Field;
use crate::handle::LoggerHandle;
use crate::query::QueryLogger;

/// Quiet period after a change event before the file is re-read, so a
/// save that arrives as several events causes one reload.
pub const DEBOUNCE: Duration = Duration::from_millis(200);

/// Watches `<dir>/config.toml` and applies every change to a
/// [`LoggerHandle`] (and optionally a [`QueryLogger`]).
///
/// The directory is watched rather than the file so editors that save by
/// rename are still picked up. A config that fails to load or build is
/// reported through the handle and the running setup stays in place.
/// Dropping the watcher stops it and joins the worker thread.
pub struct ConfigWatcher {
    watcher: Option<RecommendedWatcher>,
    worker: Option<JoinHandle<()>>,
    applied: Arc<AtomicU64>,
    rejected: Arc<AtomicU64>,
}

impl ConfigWatcher {
    pub fn spawn(dir: impl AsRef<Path>, handle: Arc<LoggerHandle>) -> Result<Self, notify::Error> {
        Self::spawn_inner(dir.as_ref(), handle, None)
    }

    /// Like [`spawn`](ConfigWatcher::spawn), and also applies the
    /// `[database]` table to `query` on every reload.
    pub fn spawn_with_query_logger(
        dir: impl AsRef<Path>,
        handle: Arc<LoggerHandle>,
        query: Arc<QueryLogger>,
    ) -> Result<Self, notify::Error> {
        Self::spawn_inner(dir.as_ref(), handle, Some(query))
    }

    fn spawn_inner(
        dir: &Path,
        handle: Arc<LoggerHandle>,
        query: Option<Arc<QueryLogger>>,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel::<()>();

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let relevant = event
                    .paths
                    .iter()
                    .any(|p| p.file_name().is_some_and(|name| name == CONFIG_FILE_NAME));
                if relevant && (event.kind.is_modify() || event.kind.is_create()) {
                    let _ = tx.send(());
                }
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;

        let applied = Arc::new(AtomicU64::new(0));
        let rejected = Arc::new(AtomicU64::new(0));
        let worker = {
            let dir = dir.to_path_buf();
            let applied = Arc::clone(&applied);
            let rejected = Arc::clone(&rejected);
            std::thread::Builder::new()
                .name("log-config-watcher".to_string())
                .spawn(move || {
                    // A closed channel means the watcher was dropped.
                    while rx.recv().is_ok() {
                        loop {
                            match rx.recv_timeout(DEBOUNCE) {
                                Ok(()) => continue,
                                Err(RecvTimeoutError::Timeout) => break,
                                Err(RecvTimeoutError::Disconnected) => return,
                            }
                        }
                        if apply(&dir, &handle, query.as_deref()) {
                            applied.fetch_add(1, Ordering::Relaxed);
                        } else {
                            rejected.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                })
                .map_err(notify::Error::io)?
        };

        Ok(ConfigWatcher {
            watcher: Some(watcher),
            worker: Some(worker),
            applied,
            rejected,
        })
    }

    /// Number of changes that were loaded and applied.
    pub fn applied(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// Number of changes that failed to load or build.
    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        // Dropping the watcher drops its callback and with it the sender.
        self.watcher.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn apply(dir: &Path, handle: &LoggerHandle, query: Option<&QueryLogger>) -> bool {
    let config = match Config::load_dir(dir) {
        Ok(config) => config,
        Err(e) => {
            handle.error(
                "config reload failed, keeping current settings",
                &[Field::new("error", e.to_string())],
            );
            return false;
        }
    };
    if let Err(e) = handle.reload(&config.log) {
        handle.error(
            "config reload failed, keeping current settings",
            &[Field::new("error", e.to_string())],
        );
        return false;
    }
    if let Some(query) = query {
        query.apply(&config.database);
    }
    handle.info(
        "config reloaded",
        &[
            Field::new("output", config.log.output.as_str()),
            Field::new("level", config.log.level().as_str()),
        ],
    );
    true
}
