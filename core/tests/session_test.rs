//! End-to-end: SQLite descriptions + trace file + watcher.

use parking_lot::Mutex;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tempfile::tempdir;
use voicetrace_core::{
    Formatter, QuitState, SpeechSink, SqliteDescriptions, Watcher, WatcherConfig,
};

#[derive(Clone, Default)]
struct Transcript(Arc<Mutex<Vec<String>>>);

impl SpeechSink for Transcript {
    fn speak(&mut self, text: &str) -> voicetrace_core::Result<()> {
        self.0.lock().push(text.to_string());
        Ok(())
    }
}

fn create_db(path: &Path) {
    let conn = Connection::open(path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tab (name TEXT, description TEXT);
         INSERT INTO tab VALUES ('openat', 'open file {1}, {succeeded}');
         INSERT INTO tab VALUES ('socket', 'create a socket');
         INSERT INTO tab VALUES ('connect', 'connect socket {0} to port {1[sin_port][1]}, {succeeded}');
         INSERT INTO tab VALUES ('close', 'close {type} {0}');
         INSERT INTO tab VALUES ('execve', 'run {0} with arguments {1}');",
    )
    .unwrap();
}

const TRACE: &str = r#"execve("/usr/bin/curl", ["curl", "localhost"], 0x7ffd3e2a1c38 /* 30 vars */) = 0
brk(NULL)                               = 0x5581cba5c000
openat(AT_FDCWD, "/etc/ld.so.cache", O_RDONLY|O_CLOEXEC) = 3
close(3)                                = 0
socket(AF_INET, SOCK_STREAM, IPPROTO_TCP) = 5
connect(5, {sa_family=AF_INET, sin_port=htons(80), sin_addr=inet_addr("127.0.0.1")}, 16) = -1 ECONNREFUSED (Connection refused)
close(5)                                = 0
exit_group(7)                           = ?
+++ exited with 7 +++
"#;

fn expected() -> Vec<String> {
    vec![
        "run /usr/bin/curl with arguments curl, localhost".to_string(),
        "open file /etc/ld.so.cache, succeeded".to_string(),
        "create a socket".to_string(),
        "connect socket 5 to port 80, failed with error ECONNREFUSED (Connection refused)"
            .to_string(),
        "close socket 5".to_string(),
    ]
}

#[test]
fn test_session_narrates_curl_trace() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("desctab.db");
    let trace_path = dir.path().join("voice-trace-test.log");
    create_db(&db_path);
    fs::write(&trace_path, TRACE).unwrap();

    let store = SqliteDescriptions::open(&db_path).unwrap();
    let transcript = Transcript::default();
    let mut watcher = Watcher::new(WatcherConfig::new(&trace_path));
    watcher.start(store, transcript.clone()).unwrap();
    let report = watcher.stop(QuitState::Drain).unwrap();

    assert_eq!(report.lines_read, 9);
    assert_eq!(report.narrated, 5);
    assert_eq!(*transcript.0.lock(), expected());
}

#[test]
fn test_replaying_a_trace_is_deterministic() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("desctab.db");
    create_db(&db_path);
    let store = SqliteDescriptions::open(&db_path).unwrap();

    let run = || {
        let mut formatter = Formatter::new();
        TRACE
            .lines()
            .filter_map(|line| formatter.format_line(line, &store).unwrap())
            .collect::<Vec<_>>()
    };
    assert_eq!(run(), expected());
    assert_eq!(run(), run());
}
