use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use crate::sink::{Sink, SinkError};

/// Limits that trigger rotation of a [`RotatingFileSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rotation {
    /// Rotate before a write would push the active file past this size.
    /// `0` disables size-based rotation.
    pub max_size_bytes: u64,
    /// Rotate once the active file is older than this.
    pub max_age: Option<Duration>,
    /// Archived files to keep; `0` keeps all of them.
    pub max_backups: usize,
}

impl Rotation {
    /// Build from the flat config limits. Zero hours means no age limit.
    pub fn from_limits(max_size_bytes: u64, max_age_hours: u64, max_backups: usize) -> Self {
        Rotation {
            max_size_bytes,
            max_age: (max_age_hours > 0).then(|| Duration::from_secs(max_age_hours * 3600)),
            max_backups,
        }
    }
}

struct ActiveFile {
    file: Option<File>,
    written: u64,
    opened_at: SystemTime,
}

/// Appending file sink with size/age based rotation.
///
/// Archives are numbered `app.log.1` (newest) to `app.log.N` (oldest). The
/// rotation check runs under the same mutex as the write, before the
/// write, so a write that would overflow the active file lands in a fresh
/// one. Opening an existing file appends to it.
pub struct RotatingFileSink {
    path: PathBuf,
    rotation: Rotation,
    active: Mutex<ActiveFile>,
    rotations: AtomicU64,
}

impl RotatingFileSink {
    pub fn open(path: impl Into<PathBuf>, rotation: Rotation) -> io::Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let (file, written, opened_at) = open_append(&path)?;
        Ok(RotatingFileSink {
            path,
            rotation,
            active: Mutex::new(ActiveFile {
                file: Some(file),
                written,
                opened_at,
            }),
            rotations: AtomicU64::new(0),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of rotations performed by this sink instance.
    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    /// Archived files currently on disk, newest first.
    pub fn archives(&self) -> io::Result<Vec<PathBuf>> {
        let mut found = self.archive_indices()?;
        found.sort_unstable();
        Ok(found.into_iter().map(|i| self.archive_path(i)).collect())
    }

    fn lock(&self) -> MutexGuard<'_, ActiveFile> {
        self.active.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn archive_path(&self, index: usize) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(format!(".{}", index));
        self.path.with_file_name(name)
    }

    fn archive_indices(&self) -> io::Result<Vec<usize>> {
        let dir = match self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            Some(dir) => dir.to_path_buf(),
            None => PathBuf::from("."),
        };
        let prefix = match self.path.file_name().and_then(|n| n.to_str()) {
            Some(name) => format!("{}.", name),
            None => return Ok(Vec::new()),
        };

        let mut indices = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(index) = name
                .strip_prefix(&prefix)
                .and_then(|suffix| suffix.parse::<usize>().ok())
            {
                indices.push(index);
            }
        }
        Ok(indices)
    }

    fn needs_rotation(&self, active: &ActiveFile, incoming: u64) -> bool {
        if active.written == 0 {
            return false;
        }
        let too_big = self.rotation.max_size_bytes > 0
            && active.written + incoming > self.rotation.max_size_bytes;
        let too_old = self.rotation.max_age.is_some_and(|max_age| {
            active.opened_at.elapsed().unwrap_or_default() >= max_age
        });
        too_big || too_old
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        // Close the handle first; some platforms refuse to rename open files.
        if let Some(mut file) = active.file.take() {
            file.flush()?;
        }

        let mut indices = self.archive_indices()?;
        indices.sort_unstable_by(|a, b| b.cmp(a));
        for index in indices {
            fs::rename(self.archive_path(index), self.archive_path(index + 1))?;
        }
        fs::rename(&self.path, self.archive_path(1))?;

        if self.rotation.max_backups > 0 {
            for index in self.archive_indices()? {
                if index > self.rotation.max_backups {
                    fs::remove_file(self.archive_path(index))?;
                }
            }
        }

        let (file, written, opened_at) = open_append(&self.path)?;
        active.file = Some(file);
        active.written = written;
        active.opened_at = opened_at;
        self.rotations.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<(File, u64, SystemTime)> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let meta = file.metadata()?;
    let opened_at = meta
        .created()
        .or_else(|_| meta.modified())
        .unwrap_or_else(|_| SystemTime::now());
    Ok((file, meta.len(), opened_at))
}

impl Sink for RotatingFileSink {
    fn write(&self, line: &[u8]) -> Result<(), SinkError> {
        let mut active = self.lock();
        let incoming = line.len() as u64;

        if self.needs_rotation(&active, incoming) {
            self.rotate(&mut active)?;
        }
        if active.file.is_none() {
            // A previous rotation failed half-way; try to get a file back.
            let (file, written, opened_at) = open_append(&self.path)?;
            active.file = Some(file);
            active.written = written;
            active.opened_at = opened_at;
        }

        if let Some(file) = active.file.as_mut() {
            file.write_all(line)?;
        }
        active.written += incoming;
        Ok(())
    }

    fn flush(&self) -> Result<(), SinkError> {
        let mut active = self.lock();
        if let Some(file) = active.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}
