//! Trace-file watcher: a background worker tails the trace, formats each line
//! and speaks the result, while the controlling thread decides when to stop.
//!
//! Lifecycle: `Idle` → `start` → `Running` → `stop` → `Stopping` → `Stopped`.
//!
//! Stopping comes in two strengths:
//! - `QuitState::Drain`: keep reading until the file has no more lines, then stop
//! - `QuitState::Abort`: stop before the next line, leaving any backlog unread
//!
//! The quit state only ever escalates (`Running` → `Drain` → `Abort`).

mod tail;

pub use tail::TraceTail;

use crate::formatter::Formatter;
use crate::lookup::DescriptionLookup;
use crate::speech::SpeechSink;
use crate::{Result, VoiceTraceError};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shutdown request shared between the controller and the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum QuitState {
    /// Keep tailing.
    #[default]
    Running,
    /// Stop once the backlog is exhausted.
    Drain,
    /// Stop now.
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

/// What the worker did during one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchReport {
    /// Lines handed to the formatter.
    pub lines_read: u64,
    /// Lines that produced a sentence.
    pub narrated: u64,
    /// Lines with nothing to say (not a call, undescribed, vetoed).
    pub ignored: u64,
    /// Lines dropped because their template could not be rendered.
    pub skipped: u64,
}

#[derive(Clone, Debug)]
pub struct WatcherConfig {
    /// Trace file written by the tracer. Must exist before `start`.
    pub trace_path: PathBuf,
    /// Pause between reads while no new line is available.
    pub poll_interval: Duration,
    /// Slice the controller waits between checks while joining the worker.
    pub join_poll_interval: Duration,
}

impl WatcherConfig {
    pub fn new(trace_path: impl Into<PathBuf>) -> Self {
        Self {
            trace_path: trace_path.into(),
            poll_interval: Duration::from_millis(1),
            join_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Controller handle for one watch session.
pub struct Watcher {
    config: WatcherConfig,
    quit: Arc<Mutex<QuitState>>,
    handle: Option<JoinHandle<WatchReport>>,
    state: WatcherState,
}

impl Watcher {
    pub fn new(config: WatcherConfig) -> Self {
        Self {
            config,
            quit: Arc::new(Mutex::new(QuitState::Running)),
            handle: None,
            state: WatcherState::Idle,
        }
    }

    pub fn state(&self) -> WatcherState {
        self.state
    }

    pub fn quit_state(&self) -> QuitState {
        *self.quit.lock()
    }

    /// Open the trace file and spawn the worker.
    ///
    /// The trace file is opened here so that a missing file is reported to the
    /// caller instead of killing the worker. `lookup` and `sink` move into the
    /// worker and are dropped when it exits.
    pub fn start<L, S>(&mut self, lookup: L, sink: S) -> Result<()>
    where
        L: DescriptionLookup + Send + 'static,
        S: SpeechSink + 'static,
    {
        if self.state != WatcherState::Idle {
            return Err(VoiceTraceError::WatcherError(format!(
                "cannot start watcher in state {:?}",
                self.state
            )));
        }
        let tail = TraceTail::open(&self.config.trace_path)?;
        let quit = Arc::clone(&self.quit);
        let poll_interval = self.config.poll_interval;

        let handle = thread::Builder::new()
            .name("voicetrace-watcher".to_string())
            .spawn(move || run_worker(tail, lookup, sink, quit, poll_interval))?;

        info!(target: "watcher", path = %self.config.trace_path.display(), "Watcher started");
        self.handle = Some(handle);
        self.state = WatcherState::Running;
        Ok(())
    }

    /// Raise the quit state to `level`. Lower levels are ignored.
    pub fn request_quit(&self, level: QuitState) {
        escalate(&self.quit, level);
    }

    /// Request `level` and wait for the worker to finish.
    pub fn stop(&mut self, level: QuitState) -> Result<WatchReport> {
        self.stop_with(level, || false)
    }

    /// Like [`stop`](Self::stop), but checks `interrupted` between wait slices
    /// and escalates to `Abort` as soon as it returns true. Does not return
    /// while the worker is still alive.
    pub fn stop_with<F>(&mut self, level: QuitState, mut interrupted: F) -> Result<WatchReport>
    where
        F: FnMut() -> bool,
    {
        match self.state {
            WatcherState::Idle => {
                self.state = WatcherState::Stopped;
                return Ok(WatchReport::default());
            }
            WatcherState::Stopped => {
                return Err(VoiceTraceError::WatcherError(
                    "watcher already stopped".to_string(),
                ));
            }
            WatcherState::Running | WatcherState::Stopping => {}
        }

        self.request_quit(level);
        self.state = WatcherState::Stopping;
        debug!(target: "watcher", quit = ?self.quit_state(), "Waiting for watcher to finish");

        let handle = self.handle.take().ok_or_else(|| {
            VoiceTraceError::WatcherError("watcher has no worker thread".to_string())
        })?;
        while !handle.is_finished() {
            if interrupted() && self.quit_state() != QuitState::Abort {
                warn!(target: "watcher", "Interrupted while waiting; aborting watcher");
                self.request_quit(QuitState::Abort);
            }
            thread::sleep(self.config.join_poll_interval);
        }

        self.state = WatcherState::Stopped;
        let report = handle
            .join()
            .map_err(|_| VoiceTraceError::WatcherError("watcher thread panicked".to_string()))?;
        info!(
            target: "watcher",
            lines_read = report.lines_read,
            narrated = report.narrated,
            ignored = report.ignored,
            skipped = report.skipped,
            "Watcher stopped"
        );
        Ok(report)
    }

    /// Run `body` with a watcher active for its whole duration.
    ///
    /// On `Ok` the watcher drains the remaining trace before returning; on
    /// `Err` it is aborted and the body's error is returned.
    pub fn watch<L, S, T, F>(
        config: WatcherConfig,
        lookup: L,
        sink: S,
        body: F,
    ) -> Result<(T, WatchReport)>
    where
        L: DescriptionLookup + Send + 'static,
        S: SpeechSink + 'static,
        F: FnOnce() -> Result<T>,
    {
        let mut watcher = Watcher::new(config);
        watcher.start(lookup, sink)?;
        match body() {
            Ok(value) => {
                let report = watcher.stop(QuitState::Drain)?;
                Ok((value, report))
            }
            Err(e) => {
                if let Err(stop_err) = watcher.stop(QuitState::Abort) {
                    warn!(target: "watcher", error = %stop_err, "Failed to stop watcher");
                }
                Err(e)
            }
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            escalate(&self.quit, QuitState::Abort);
            if handle.join().is_err() {
                warn!(target: "watcher", "Watcher thread panicked");
            }
            self.state = WatcherState::Stopped;
        }
    }
}

fn escalate(quit: &Mutex<QuitState>, level: QuitState) {
    let mut current = quit.lock();
    if level > *current {
        *current = level;
    }
}

fn run_worker<L, S>(
    mut tail: TraceTail,
    lookup: L,
    mut sink: S,
    quit: Arc<Mutex<QuitState>>,
    poll_interval: Duration,
) -> WatchReport
where
    L: DescriptionLookup,
    S: SpeechSink,
{
    let mut formatter = Formatter::new();
    let mut report = WatchReport::default();

    loop {
        let quit_state = *quit.lock();
        if quit_state == QuitState::Abort {
            debug!(target: "watcher", "Abort requested");
            break;
        }

        match tail.next_line() {
            Ok(Some(line)) => {
                handle_line(&line, &mut formatter, &lookup, &mut sink, &mut report);
            }
            Ok(None) if quit_state == QuitState::Running => thread::sleep(poll_interval),
            Ok(None) => {
                if let Some(line) = tail.take_partial() {
                    handle_line(&line, &mut formatter, &lookup, &mut sink, &mut report);
                }
                debug!(target: "watcher", "Trace drained");
                break;
            }
            Err(e) => {
                warn!(target: "watcher", error = %e, "Failed to read trace file");
                if quit_state != QuitState::Running {
                    break;
                }
                thread::sleep(poll_interval);
            }
        }
    }

    debug!(target: "watcher", "Releasing trace file and description store");
    report
}

fn handle_line<L, S>(
    line: &str,
    formatter: &mut Formatter,
    lookup: &L,
    sink: &mut S,
    report: &mut WatchReport,
) where
    L: DescriptionLookup,
    S: SpeechSink,
{
    report.lines_read += 1;
    match formatter.format_line(line, lookup) {
        Ok(Some(sentence)) => {
            report.narrated += 1;
            debug!(target: "watcher", sentence = %sentence, "Narrating");
            if let Err(e) = sink.speak(&sentence) {
                warn!(target: "watcher", error = %e, "Speech output failed");
            }
        }
        Ok(None) => report.ignored += 1,
        Err(e) => {
            report.skipped += 1;
            warn!(target: "watcher", line = %line, error = %e, "Line skipped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_state_only_escalates() {
        let quit = Mutex::new(QuitState::Running);
        escalate(&quit, QuitState::Drain);
        assert_eq!(*quit.lock(), QuitState::Drain);
        escalate(&quit, QuitState::Running);
        assert_eq!(*quit.lock(), QuitState::Drain);
        escalate(&quit, QuitState::Abort);
        escalate(&quit, QuitState::Drain);
        assert_eq!(*quit.lock(), QuitState::Abort);
    }

    #[test]
    fn test_start_fails_without_trace_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = Watcher::new(WatcherConfig::new(dir.path().join("missing.log")));
        let lookup = std::collections::HashMap::<String, String>::new();
        let result = watcher.start(lookup, crate::ConsoleSink);
        assert!(matches!(result, Err(VoiceTraceError::IoError(_))));
        assert_eq!(watcher.state(), WatcherState::Idle);
    }

    #[test]
    fn test_handle_line_counts_and_speaks() {
        let mut sink = crate::speech::MockSpeechSink::new();
        sink.expect_speak()
            .withf(|text| text.starts_with("read from 3"))
            .times(2)
            .returning(|_| Err(VoiceTraceError::SpeechError("device busy".to_string())));
        let lookup: std::collections::HashMap<String, String> = [
            ("read".to_string(), "read from {0}".to_string()),
            ("write".to_string(), "write {5}".to_string()),
        ]
        .into_iter()
        .collect();

        let mut formatter = Formatter::new();
        let mut report = WatchReport::default();
        for line in [
            "read(3, \"\", 4096) = 0",
            "write(1, \"x\", 1) = 1",
            "fstat(3, {st_mode=S_IFREG|0644}) = 0",
            "read(3, \"\", 4096) = 0",
        ] {
            handle_line(line, &mut formatter, &lookup, &mut sink, &mut report);
        }
        assert_eq!(
            report,
            WatchReport {
                lines_read: 4,
                narrated: 2,
                ignored: 1,
                skipped: 1,
            }
        );
    }

    #[test]
    fn test_stop_before_start() {
        let mut watcher = Watcher::new(WatcherConfig::new("unused.log"));
        assert_eq!(watcher.stop(QuitState::Drain).unwrap(), WatchReport::default());
        assert_eq!(watcher.state(), WatcherState::Stopped);
        assert!(watcher.stop(QuitState::Drain).is_err());
    }
}
