use std::backtrace::Backtrace;
use std::env;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Frames examined past the starting depth before giving up.
pub const MAX_SEARCH_DEPTH: usize = 12;

/// Path fragments of the Rust toolchain's own sources.
const TOOLCHAIN_MARKERS: &[&str] = &[
    "/rustc/",
    "/library/std/",
    "/library/core/",
    "/library/alloc/",
];

/// One resolved stack frame: source path and line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub path: String,
    pub line: u32,
}

impl Frame {
    pub fn new(path: impl Into<String>, line: u32) -> Self {
        Frame {
            path: path.into(),
            line,
        }
    }
}

/// Finds the first stack frame outside a set of library boundaries and
/// renders it as `relative/path.rs:line`.
///
/// A frame is a library frame when its path contains any boundary
/// substring. By default the boundaries are this crate's own sources, the
/// Rust standard library and everything under the cargo registry, so the
/// result points at application code even when the query went through a
/// third-party database crate.
///
/// Resolution is best effort. No match within the search depth, frames
/// without debug info, or an unreadable base directory all yield `None`.
#[derive(Debug, Clone)]
pub struct CallSiteResolver {
    base_dir: PathBuf,
    boundaries: Vec<String>,
    max_depth: usize,
}

impl CallSiteResolver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        CallSiteResolver {
            base_dir: base_dir.into(),
            boundaries: default_boundaries(),
            max_depth: MAX_SEARCH_DEPTH,
        }
    }

    /// Resolver relative to the process working directory.
    pub fn from_current_dir() -> Self {
        Self::new(env::current_dir().unwrap_or_default())
    }

    pub fn with_boundary(mut self, boundary: impl Into<String>) -> Self {
        self.boundaries.push(boundary.into());
        self
    }

    /// Replace the boundary list entirely.
    pub fn with_boundaries(mut self, boundaries: Vec<String>) -> Self {
        self.boundaries = boundaries;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn is_library_frame(&self, path: &str) -> bool {
        let path = path.replace('\\', "/");
        self.boundaries.iter().any(|b| path.contains(b.as_str()))
    }

    /// Scan `frames[start..start + max_depth]` for the first frame outside
    /// the boundaries.
    pub fn resolve_frames(&self, frames: &[Frame], start: usize) -> Option<String> {
        let (target, line) = frames
            .iter()
            .skip(start)
            .take(self.max_depth)
            .filter_map(|f| absolute(Path::new(&f.path)).map(|p| (p, f.line)))
            .find(|(p, _)| !self.is_library_frame(&p.to_string_lossy()))?;

        let base = fs::canonicalize(&self.base_dir).ok()?;
        let relative = relative_path(&base, &target)?;
        Some(format!("{}:{}", relative, line))
    }

    /// Capture the current stack and resolve it. `start` counts frames
    /// above the logger's own call chain.
    pub fn resolve(&self, start: usize) -> Option<String> {
        self.resolve_captured(&capture_frames(), start)
    }

    /// Resolve a captured stack. Leading frames from this crate's sources
    /// are dropped before `start` and the search depth apply, so the
    /// logger's own frames never use up the depth.
    pub fn resolve_captured(&self, frames: &[Frame], start: usize) -> Option<String> {
        let first_outside = frames
            .iter()
            .position(|f| !is_own_frame(&f.path))
            .unwrap_or(frames.len());
        self.resolve_frames(&frames[first_outside..], start)
    }
}

impl Default for CallSiteResolver {
    fn default() -> Self {
        Self::from_current_dir()
    }
}

/// Boundaries used by [`CallSiteResolver::new`].
pub fn default_boundaries() -> Vec<String> {
    let mut boundaries = vec![own_sources()];
    boundaries.extend(TOOLCHAIN_MARKERS.iter().map(|m| m.to_string()));
    boundaries.push("/.cargo/registry/".to_string());
    boundaries.push("/.cargo/git/".to_string());
    boundaries
}

/// Capture the current thread's stack as frame descriptors, innermost
/// first, with the standard library's own capture frames removed.
///
/// Frames are recovered from the symbolized backtrace text; a binary built
/// without debug info yields an empty list.
pub fn capture_frames() -> Vec<Frame> {
    let text = format!("{:#}", Backtrace::force_capture());
    let frames = parse_backtrace(&text);
    let first_own = frames
        .iter()
        .position(|f| !is_toolchain_path(&f.path))
        .unwrap_or(frames.len());
    frames.into_iter().skip(first_own).collect()
}

fn own_sources() -> String {
    concat!(env!("CARGO_MANIFEST_DIR"), "/src/").replace('\\', "/")
}

fn is_own_frame(path: &str) -> bool {
    let own = own_sources();
    if path.replace('\\', "/").contains(&own) {
        return true;
    }
    absolute(Path::new(path))
        .is_some_and(|p| p.to_string_lossy().replace('\\', "/").contains(&own))
}

fn is_toolchain_path(path: &str) -> bool {
    let path = path.replace('\\', "/");
    TOOLCHAIN_MARKERS.iter().any(|m| path.contains(m))
}

/// Extract `at path:line:col` locations from a rendered backtrace.
pub fn parse_backtrace(text: &str) -> Vec<Frame> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix("at "))
        .filter_map(|location| {
            let mut parts = location.rsplitn(3, ':');
            let _column = parts.next()?;
            let line = parts.next()?.parse::<u32>().ok()?;
            let path = parts.next()?;
            Some(Frame::new(path, line))
        })
        .collect()
}

fn absolute(path: &Path) -> Option<PathBuf> {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        env::current_dir().ok()?.join(path)
    };
    Some(fs::canonicalize(&joined).unwrap_or(joined))
}

/// Lexical relative path from `base` to `target`, `/`-separated, with `..`
/// segments when `target` is outside `base`. `None` if the two paths share
/// no root (for example different drives).
pub fn relative_path(base: &Path, target: &Path) -> Option<String> {
    let base: Vec<Component<'_>> = base.components().filter(|c| *c != Component::CurDir).collect();
    let target: Vec<Component<'_>> = target.components().filter(|c| *c != Component::CurDir).collect();

    if base.first() != target.first() {
        return None;
    }
    let common = base
        .iter()
        .zip(target.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..base.len() {
        parts.push("..".to_string());
    }
    for component in &target[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }
    if parts.is_empty() {
        return Some(".".to_string());
    }
    Some(parts.join("/"))
}

/// Shorten a source path to its last directory and file name, the way
/// caller columns are printed: `/work/app/src/db/user.rs` → `db/user.rs`.
pub fn short_caller(file: &str, line: u32) -> String {
    let normalized = file.replace('\\', "/");
    let short = match normalized.rmatch_indices('/').nth(1) {
        Some((idx, _)) => &normalized[idx + 1..],
        None => normalized.as_str(),
    };
    format!("{}:{}", short, line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver(base: &Path) -> CallSiteResolver {
        CallSiteResolver::new(base).with_boundaries(vec!["/vendor/orm/".to_string()])
    }

    #[test]
    fn skips_library_frames() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let frames = vec![
            Frame::new(base.join("vendor/orm/query.rs").to_string_lossy(), 10),
            Frame::new(base.join("vendor/orm/exec.rs").to_string_lossy(), 20),
            Frame::new(base.join("app/repo/user.rs").to_string_lossy(), 42),
            Frame::new(base.join("app/main.rs").to_string_lossy(), 7),
        ];
        assert_eq!(
            resolver(&base).resolve_frames(&frames, 0),
            Some("app/repo/user.rs:42".to_string())
        );
    }

    #[test]
    fn start_depth_skips_leading_frames() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let frames = vec![
            Frame::new(base.join("app/inner.rs").to_string_lossy(), 1),
            Frame::new(base.join("app/outer.rs").to_string_lossy(), 2),
        ];
        assert_eq!(
            resolver(&base).resolve_frames(&frames, 1),
            Some("app/outer.rs:2".to_string())
        );
    }

    #[test]
    fn own_leading_frames_do_not_use_up_the_depth() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let own = |file: &str| Frame::new(format!("{}{}", own_sources(), file), 1);

        let mut frames = vec![own("callsite.rs"), own("callsite.rs"), own("query.rs"), own("query.rs")];
        frames.extend((0..10).map(|i| Frame::new(base.join("vendor/orm/exec.rs").to_string_lossy(), i)));
        frames.push(Frame::new(base.join("app/repo/user.rs").to_string_lossy(), 42));

        assert_eq!(
            resolver(&base).resolve_captured(&frames, 0),
            Some("app/repo/user.rs:42".to_string())
        );
        // Counted from the first frame outside this crate, 13 library
        // frames push the caller past the depth limit.
        frames.splice(4..4, (0..3).map(|i| Frame::new(base.join("vendor/orm/pool.rs").to_string_lossy(), i)));
        assert_eq!(resolver(&base).resolve_captured(&frames, 0), None);
    }

    #[test]
    fn gives_up_after_search_depth() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let mut frames: Vec<Frame> = (0..MAX_SEARCH_DEPTH)
            .map(|i| Frame::new(base.join("vendor/orm/deep.rs").to_string_lossy(), i as u32))
            .collect();
        frames.push(Frame::new(base.join("app/too_far.rs").to_string_lossy(), 99));

        assert_eq!(resolver(&base).resolve_frames(&frames, 0), None);
        assert_eq!(
            resolver(&base).with_max_depth(MAX_SEARCH_DEPTH + 1).resolve_frames(&frames, 0),
            Some("app/too_far.rs:99".to_string())
        );
    }

    #[test]
    fn never_returns_a_library_frame() {
        let dir = tempfile::tempdir().unwrap();
        let base = fs::canonicalize(dir.path()).unwrap();
        let frames = vec![Frame::new(base.join("vendor/orm/only.rs").to_string_lossy(), 1)];
        assert_eq!(resolver(&base).resolve_frames(&frames, 0), None);
    }

    #[test]
    fn unreadable_base_dir_degrades_to_none() {
        let frames = vec![Frame::new("/srv/app/main.rs", 3)];
        let resolver = CallSiteResolver::new("/definitely/not/a/real/base/dir").with_boundaries(vec![]);
        assert_eq!(resolver.resolve_frames(&frames, 0), None);
    }

    #[test]
    fn paths_outside_base_get_parent_segments() {
        assert_eq!(
            relative_path(Path::new("/work/app"), Path::new("/work/lib/db.rs")),
            Some("../lib/db.rs".to_string())
        );
        assert_eq!(
            relative_path(Path::new("/work/app"), Path::new("/work/app/src/main.rs")),
            Some("src/main.rs".to_string())
        );
    }

    #[test]
    fn parses_rendered_backtrace() {
        let text = "   0: app::handler\n             at /work/app/src/handler.rs:42:9\n   1: std::rt::lang_start\n             at /rustc/abc/library/std/src/rt.rs:10:5\n   2: <unknown>\n";
        assert_eq!(
            parse_backtrace(text),
            vec![
                Frame::new("/work/app/src/handler.rs", 42),
                Frame::new("/rustc/abc/library/std/src/rt.rs", 10),
            ]
        );
    }

    #[test]
    fn short_caller_keeps_last_directory() {
        assert_eq!(short_caller("/work/app/src/db/user.rs", 7), "db/user.rs:7");
        assert_eq!(short_caller("src/main.rs", 3), "src/main.rs:3");
        assert_eq!(short_caller("main.rs", 1), "main.rs:1");
    }

    #[test]
    fn default_boundaries_cover_this_crate_and_toolchain() {
        let resolver = CallSiteResolver::new(".");
        assert!(resolver.is_library_frame(concat!(env!("CARGO_MANIFEST_DIR"), "/src/query.rs")));
        assert!(resolver.is_library_frame("/rustc/abc/library/core/src/ops/function.rs"));
        assert!(resolver.is_library_frame("/home/u/.cargo/registry/src/x/sqlx-0.7/src/lib.rs"));
        assert!(!resolver.is_library_frame("/home/u/project/src/main.rs"));
    }
}
