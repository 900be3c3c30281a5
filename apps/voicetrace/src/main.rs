mod config;

use clap::{CommandFactory, Parser};
use config::VoiceTraceConfig;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::process::Command;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use voicetrace_audio::TtsSpeaker;
use voicetrace_core::{ConsoleSink, QuitState, SpeechSink, SqliteDescriptions, Watcher};

/// Run a command under strace and narrate its system calls out loud.
#[derive(Parser, Debug)]
#[command(name = "voicetrace", version)]
struct Cli {
    /// Description database (SQLite table `tab(name, description)`)
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print each sentence instead of speaking it
    #[arg(long)]
    print_only: bool,

    /// Command to trace, followed by its arguments
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "CMD")]
    command: Vec<String>,
}

/// How the traced command ended.
enum TracerOutcome {
    Finished(ExitStatus),
    Interrupted,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logging / tracing (stderr, so the traced program's stdout stays clean)
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "warn,voicetrace=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if cli.command.is_empty() {
        eprintln!("{}", Cli::command().render_usage());
        std::process::exit(1);
    }

    let mut cfg = VoiceTraceConfig::load(cli.config.as_deref());
    if let Some(db) = cli.db {
        cfg.db_path = db;
    }

    if cfg.follows_forks() {
        warn!(
            target: "voicetrace",
            args = ?cfg.tracer_args,
            "Following forks prefixes trace lines with a pid; those lines will not be narrated"
        );
    }

    println!("Voicetracer: tracing `{}`", cli.command.join(" "));

    // The trace file must exist (empty) before the watcher opens it
    let trace_file = tempfile::Builder::new()
        .prefix("voice-trace-")
        .suffix(".log")
        .rand_bytes(10)
        .tempfile()?;
    let trace_path = trace_file.path().to_path_buf();

    let store = SqliteDescriptions::open(&cfg.db_path)?;
    let sink: Box<dyn SpeechSink> = if cli.print_only {
        Box::new(ConsoleSink)
    } else {
        let speaker = TtsSpeaker::new(cfg.tts.clone());
        info!(target: "voicetrace", engine = speaker.engine(), "Speech engine selected");
        Box::new(speaker)
    };

    let mut watcher = Watcher::new(cfg.watcher_config(&trace_path));
    watcher.start(store, sink)?;

    // Ctrl+C is counted rather than fatal, so the watcher can always be shut down
    let interrupt_count = Arc::new(AtomicUsize::new(0));
    let interrupted = Arc::new(Notify::new());
    spawn_interrupt_listener(Arc::clone(&interrupt_count), Arc::clone(&interrupted));
    let interrupts = Interrupts::since(&interrupt_count);

    let outcome = run_tracer(&cfg, &trace_path, &cli.command, &interrupted).await;
    let level = quit_level(&outcome, &interrupts);
    if matches!(outcome, Ok(TracerOutcome::Interrupted)) || interrupts.any() {
        println!("Voicetracer: quitting...");
    }

    // Wait off the async runtime; a further Ctrl+C escalates to abort
    let report =
        tokio::task::spawn_blocking(move || watcher.stop_with(level, || interrupts.any()))
            .await??;
    info!(
        target: "voicetrace",
        lines = report.lines_read,
        narrated = report.narrated,
        skipped = report.skipped,
        "Trace session finished"
    );

    drop(trace_file);
    match outcome? {
        TracerOutcome::Finished(status) => match status.code() {
            Some(0) => Ok(()),
            Some(code) => std::process::exit(code),
            None => std::process::exit(1),
        },
        TracerOutcome::Interrupted => std::process::exit(130),
    }
}

/// Ctrl+C presses counted from a fixed point of the session.
struct Interrupts {
    count: Arc<AtomicUsize>,
    baseline: usize,
}

impl Interrupts {
    fn since(count: &Arc<AtomicUsize>) -> Self {
        Self {
            count: Arc::clone(count),
            baseline: count.load(Ordering::SeqCst),
        }
    }

    fn any(&self) -> bool {
        self.count.load(Ordering::SeqCst) > self.baseline
    }
}

/// Drain after a clean tracer exit, abort on failure or any interrupt.
fn quit_level(outcome: &std::io::Result<TracerOutcome>, interrupts: &Interrupts) -> QuitState {
    match outcome {
        Ok(TracerOutcome::Finished(_)) if !interrupts.any() => QuitState::Drain,
        _ => QuitState::Abort,
    }
}

fn spawn_interrupt_listener(count: Arc<AtomicUsize>, notify: Arc<Notify>) {
    tokio::spawn(async move {
        while signal::ctrl_c().await.is_ok() {
            count.fetch_add(1, Ordering::SeqCst);
            notify.notify_one();
        }
    });
}

/// Run `command` under the tracer until it exits or the user interrupts.
async fn run_tracer(
    cfg: &VoiceTraceConfig,
    trace_path: &Path,
    command: &[String],
    interrupted: &Notify,
) -> std::io::Result<TracerOutcome> {
    let mut cmd = Command::new(&cfg.tracer_bin);
    cmd.args(&cfg.tracer_args)
        .arg("-o")
        .arg(trace_path)
        .arg("--")
        .args(command);

    let mut child = cmd.spawn().map_err(|e| {
        error!(target: "voicetrace", error = %e, tracer = %cfg.tracer_bin.display(), "Failed to start tracer");
        e
    })?;

    tokio::select! {
        status = child.wait() => Ok(TracerOutcome::Finished(status?)),
        _ = interrupted.notified() => {
            // The tracer normally sees the same Ctrl+C; make sure it is gone
            if let Err(e) = child.start_kill() {
                warn!(target: "voicetrace", error = %e, "Failed to signal tracer");
            }
            let _ = child.wait().await;
            Ok(TracerOutcome::Interrupted)
        }
    }
}
