mod common;

use std::fs;
use std::sync::Arc;

use query_log_sink::encoder::ConsoleEncoder;
use query_log_sink::file_sink::{Rotation, RotatingFileSink};
use query_log_sink::{Field, Level, LoggerHandle, Sink};

#[test]
fn rotated_files_stay_under_size_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("logs").join("app.log");
    let rotation = Rotation::from_limits(256, 0, 3);
    let sink = Arc::new(RotatingFileSink::open(&path, rotation).unwrap());
    let handle = LoggerHandle::new(sink.clone(), Arc::new(ConsoleEncoder::new()), Level::Info);

    for i in 0..60 {
        handle.info("request served", &[Field::new("seq", i)]);
    }
    handle.flush();

    assert!(sink.rotations() > 0);
    let archives = sink.archives().unwrap();
    assert_eq!(archives.len(), 3);

    for file in std::iter::once(path.clone()).chain(archives) {
        let text = fs::read_to_string(&file).unwrap();
        assert!(text.len() <= 256, "{} is {} bytes", file.display(), text.len());
        for line in text.lines() {
            assert!(line.ends_with('}'), "torn line in {}: {:?}", file.display(), line);
        }
    }
}

#[test]
fn newest_archive_holds_the_lines_just_before_the_active_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let sink = RotatingFileSink::open(&path, Rotation::from_limits(10, 0, 0)).unwrap();

    sink.write(b"first\n").unwrap();
    sink.write(b"second\n").unwrap();
    sink.write(b"third\n").unwrap();

    assert_eq!(fs::read_to_string(&path).unwrap(), "third\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.log.1")).unwrap(), "second\n");
    assert_eq!(fs::read_to_string(dir.path().join("app.log.2")).unwrap(), "first\n");
}

#[test]
fn restart_appends_to_existing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    {
        let sink = RotatingFileSink::open(&path, Rotation::default()).unwrap();
        sink.write(b"before restart\n").unwrap();
    }
    let sink = RotatingFileSink::open(&path, Rotation::default()).unwrap();
    sink.write(b"after restart\n").unwrap();

    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        "before restart\nafter restart\n"
    );
}
