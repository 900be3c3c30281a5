//! Watcher lifecycle: draining, aborting and interrupting a session.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use voicetrace_core::{
    QuitState, SpeechSink, VoiceTraceError, WatchReport, Watcher, WatcherConfig, WatcherState,
};

/// Sink that records every sentence, optionally taking its time about it.
#[derive(Clone, Default)]
struct RecordingSink {
    spoken: Arc<Mutex<Vec<String>>>,
    delay: Duration,
}

impl RecordingSink {
    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    fn spoken(&self) -> Vec<String> {
        self.spoken.lock().clone()
    }
}

impl SpeechSink for RecordingSink {
    fn speak(&mut self, text: &str) -> voicetrace_core::Result<()> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.spoken.lock().push(text.to_string());
        Ok(())
    }
}

struct FailingSink;

impl SpeechSink for FailingSink {
    fn speak(&mut self, _text: &str) -> voicetrace_core::Result<()> {
        Err(VoiceTraceError::SpeechError("no audio device".to_string()))
    }
}

fn descriptions() -> HashMap<String, String> {
    let mut db = HashMap::new();
    db.insert("openat".to_string(), "open {1}, {succeeded}".to_string());
    db.insert("write".to_string(), "write {2} bytes to {0}".to_string());
    db.insert("read".to_string(), "read {2} bytes from {0}".to_string());
    db
}

fn config(path: &Path) -> WatcherConfig {
    let mut cfg = WatcherConfig::new(path);
    cfg.poll_interval = Duration::from_millis(1);
    cfg.join_poll_interval = Duration::from_millis(2);
    cfg
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
}

fn write_lines(path: &Path, count: usize) {
    let mut text = String::new();
    for i in 0..count {
        text.push_str(&format!("write(1, \"line {}\\n\", {}) = {}\n", i, i, i));
    }
    append(path, &text);
}

#[test]
fn test_drain_processes_every_pending_line() {
    let trace = NamedTempFile::new().unwrap();
    write_lines(trace.path(), 25);

    let sink = RecordingSink::default();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink.clone()).unwrap();
    assert_eq!(watcher.state(), WatcherState::Running);

    let report = watcher.stop(QuitState::Drain).unwrap();
    assert_eq!(watcher.state(), WatcherState::Stopped);
    assert_eq!(report.lines_read, 25);
    assert_eq!(report.narrated, 25);

    let spoken = sink.spoken();
    assert_eq!(spoken.len(), 25);
    assert_eq!(spoken[0], "write 0 bytes to 1");
    assert_eq!(spoken[24], "write 24 bytes to 1");
}

#[test]
fn test_lines_appended_while_running_are_narrated_in_order() {
    let trace = NamedTempFile::new().unwrap();
    let sink = RecordingSink::default();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink.clone()).unwrap();

    append(trace.path(), "openat(AT_FDCWD, \"/etc/hosts\", O_RDONLY) = 3\n");
    thread::sleep(Duration::from_millis(20));
    append(trace.path(), "read(3, \"127.0.0.1 localhost\\n\", 4096) = 20\n");
    append(trace.path(), "--- SIGCHLD {si_signo=SIGCHLD, si_code=CLD_EXITED} ---\n");
    append(trace.path(), "openat(AT_FDCWD, \"/nope\", O_RDONLY) = -1 ENOENT (No such file or directory)\n");

    let report = watcher.stop(QuitState::Drain).unwrap();
    assert_eq!(
        report,
        WatchReport {
            lines_read: 4,
            narrated: 3,
            ignored: 1,
            skipped: 0,
        }
    );
    assert_eq!(
        sink.spoken(),
        vec![
            "open /etc/hosts, succeeded",
            "read 4096 bytes from 3",
            "open /nope, failed with error ENOENT (No such file or directory)",
        ]
    );
}

#[test]
fn test_line_split_across_writes_is_read_once() {
    let trace = NamedTempFile::new().unwrap();
    let sink = RecordingSink::default();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink.clone()).unwrap();

    append(trace.path(), "write(2, \"oops\", ");
    thread::sleep(Duration::from_millis(20));
    append(trace.path(), "4) = 4\n");
    append(trace.path(), "write(2, \"tail\", 4) = 4");

    let report = watcher.stop(QuitState::Drain).unwrap();
    assert_eq!(report.lines_read, 2);
    assert_eq!(sink.spoken(), vec!["write 4 bytes to 2", "write 4 bytes to 2"]);
}

#[test]
fn test_abort_leaves_backlog_unread() {
    let trace = NamedTempFile::new().unwrap();
    write_lines(trace.path(), 2_000);

    let sink = RecordingSink::slow(Duration::from_millis(5));
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink.clone()).unwrap();
    thread::sleep(Duration::from_millis(20));

    let started = Instant::now();
    let report = watcher.stop(QuitState::Abort).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(report.lines_read < 2_000);
    assert_eq!(sink.spoken().len() as u64, report.narrated);
}

#[test]
fn test_abort_without_any_input() {
    let trace = NamedTempFile::new().unwrap();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher
        .start(descriptions(), RecordingSink::default())
        .unwrap();

    let started = Instant::now();
    let report = watcher.stop(QuitState::Abort).unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(report, WatchReport::default());
}

#[test]
fn test_interrupt_during_drain_escalates_to_abort() {
    let trace = NamedTempFile::new().unwrap();
    write_lines(trace.path(), 2_000);

    let sink = RecordingSink::slow(Duration::from_millis(5));
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink).unwrap();

    let mut checks = 0;
    let report = watcher
        .stop_with(QuitState::Drain, || {
            checks += 1;
            checks > 3
        })
        .unwrap();
    assert_eq!(watcher.quit_state(), QuitState::Abort);
    assert!(report.lines_read < 2_000);
}

#[test]
fn test_second_stop_is_rejected() {
    let trace = NamedTempFile::new().unwrap();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher
        .start(descriptions(), RecordingSink::default())
        .unwrap();
    assert!(watcher.start(descriptions(), RecordingSink::default()).is_err());

    watcher.stop(QuitState::Drain).unwrap();
    assert!(matches!(
        watcher.stop(QuitState::Abort),
        Err(VoiceTraceError::WatcherError(_))
    ));
}

#[test]
fn test_speech_failures_do_not_stop_the_session() {
    let trace = NamedTempFile::new().unwrap();
    write_lines(trace.path(), 5);

    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), FailingSink).unwrap();
    let report = watcher.stop(QuitState::Drain).unwrap();
    assert_eq!(report.lines_read, 5);
    assert_eq!(report.narrated, 5);
}

#[test]
fn test_unrenderable_lines_are_skipped() {
    let trace = NamedTempFile::new().unwrap();
    append(trace.path(), "read(3, \n");
    append(trace.path(), "read(3, \"x\", 1) = 1\n");

    let sink = RecordingSink::default();
    let mut watcher = Watcher::new(config(trace.path()));
    watcher.start(descriptions(), sink.clone()).unwrap();
    let report = watcher.stop(QuitState::Drain).unwrap();
    assert_eq!(report.skipped, 1);
    assert_eq!(sink.spoken(), vec!["read 1 bytes from 3"]);
}

#[test]
fn test_watch_scope_drains_on_success() {
    let trace = NamedTempFile::new().unwrap();
    let sink = RecordingSink::default();
    let path = trace.path().to_path_buf();

    let (value, report) = Watcher::watch(config(trace.path()), descriptions(), sink.clone(), || {
        write_lines(&path, 3);
        Ok(42)
    })
    .unwrap();
    assert_eq!(value, 42);
    assert_eq!(report.lines_read, 3);
    assert_eq!(sink.spoken().len(), 3);
}

#[test]
fn test_watch_scope_aborts_on_error() {
    let trace = NamedTempFile::new().unwrap();
    let result: voicetrace_core::Result<((), WatchReport)> = Watcher::watch(
        config(trace.path()),
        descriptions(),
        RecordingSink::default(),
        || Err(VoiceTraceError::WatcherError("tracer failed".to_string())),
    );
    assert!(matches!(result, Err(VoiceTraceError::WatcherError(msg)) if msg == "tracer failed"));
}

#[test]
fn test_dropping_a_running_watcher_releases_the_worker() {
    let trace = NamedTempFile::new().unwrap();
    let sink = RecordingSink::default();
    let shared = Arc::clone(&sink.spoken);
    {
        let mut watcher = Watcher::new(config(trace.path()));
        watcher.start(descriptions(), sink).unwrap();
    }
    assert_eq!(Arc::strong_count(&shared), 1);
}
