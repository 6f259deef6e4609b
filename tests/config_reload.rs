mod common;

use std::fs;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use query_log_sink::config::CONFIG_FILE_NAME;
use query_log_sink::watcher::ConfigWatcher;
use query_log_sink::{Config, Level, LogConfig, LoggerHandle, QueryLogger};

fn file_config(path: &std::path::Path, level: &str) -> LogConfig {
    LogConfig {
        output: "file".to_string(),
        path: path.to_string_lossy().into_owned(),
        level: level.to_string(),
        ..LogConfig::default()
    }
}

fn toml_for(path: &std::path::Path, level: &str, db_level: &str) -> String {
    toml_with_database(path, level, db_level, 200, false)
}

fn toml_with_database(
    path: &std::path::Path,
    level: &str,
    db_level: &str,
    slow_ms: u64,
    ignore_not_found: bool,
) -> String {
    format!(
        "[log]\noutput = \"file\"\npath = {:?}\nlevel = \"{}\"\n\n[database]\nlevel = \"{}\"\nslowThresholdMs = {}\nignoreRecordNotFoundError = {}\n",
        path.to_string_lossy(),
        level,
        db_level,
        slow_ms,
        ignore_not_found
    )
}

fn wait_until(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(50));
    }
    false
}

#[test]
fn reload_swaps_sink_and_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");

    let handle = LoggerHandle::from_config(&file_config(&first, "INFO")).unwrap();
    handle.info("to first", &[]);

    handle.reload(&file_config(&second, "WARN")).unwrap();
    assert_eq!(handle.level(), Level::Warn);
    handle.info("dropped", &[]);
    handle.warn("to second", &[]);
    handle.flush();

    let first_text = fs::read_to_string(&first).unwrap();
    let second_text = fs::read_to_string(&second).unwrap();
    assert!(first_text.contains("to first"));
    assert!(!second_text.contains("dropped"));
    assert!(second_text.contains("to second"));
}

#[test]
fn failed_reload_keeps_previous_setup() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.log");
    let handle = LoggerHandle::from_config(&file_config(&path, "DEBUG")).unwrap();

    let broken = LogConfig {
        output: "file".to_string(),
        level: "ERROR".to_string(),
        ..LogConfig::default()
    };
    assert!(handle.reload(&broken).is_err());
    assert_eq!(handle.level(), Level::Debug);

    handle.debug("still here", &[]);
    assert!(fs::read_to_string(&path).unwrap().contains("still here"));
}

#[test]
fn watcher_applies_file_changes() {
    let dir = tempfile::tempdir().unwrap();
    let first = dir.path().join("first.log");
    let second = dir.path().join("second.log");
    let config_path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&config_path, toml_for(&first, "INFO", "WARN")).unwrap();

    let config = Config::load_dir(dir.path()).unwrap();
    let handle = Arc::new(LoggerHandle::from_config(&config.log).unwrap());
    let query = Arc::new(QueryLogger::new(Arc::clone(&handle), &config.database));
    let watcher =
        ConfigWatcher::spawn_with_query_logger(dir.path(), Arc::clone(&handle), Arc::clone(&query))
            .unwrap();

    assert_eq!(query.slow_threshold(), Duration::from_millis(200));
    assert!(!query.ignores_record_not_found());

    fs::write(
        &config_path,
        toml_with_database(&second, "DEBUG", "INFO", 750, true),
    )
    .unwrap();
    assert!(
        wait_until(|| handle.level() == Level::Debug && query.level() == Level::Info),
        "config change was not applied"
    );
    assert!(watcher.applied() >= 1);
    assert_eq!(query.slow_threshold(), Duration::from_millis(750));
    assert!(query.ignores_record_not_found());
    handle.debug("after reload", &[]);
    assert!(fs::read_to_string(&second).unwrap().contains("after reload"));
}

#[test]
fn watcher_rejects_broken_file_and_keeps_running() {
    let dir = tempfile::tempdir().unwrap();
    let log_path = dir.path().join("app.log");
    let config_path = dir.path().join(CONFIG_FILE_NAME);
    fs::write(&config_path, toml_for(&log_path, "INFO", "WARN")).unwrap();

    let config = Config::load_dir(dir.path()).unwrap();
    let handle = Arc::new(LoggerHandle::from_config(&config.log).unwrap());
    let watcher = ConfigWatcher::spawn(dir.path(), Arc::clone(&handle)).unwrap();

    fs::write(&config_path, "[log\nlevel = ").unwrap();
    assert!(wait_until(|| watcher.rejected() >= 1), "broken config was not noticed");
    assert_eq!(handle.level(), Level::Info);
    assert!(fs::read_to_string(&log_path)
        .unwrap()
        .contains("config reload failed"));
}
