use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use voicetrace_audio::TtsSpeakerConfig;
use voicetrace_core::WatcherConfig;

/// High-level configuration for a voicetrace run
#[derive(Clone, Debug)]
pub struct VoiceTraceConfig {
    /// SQLite description database
    pub db_path: PathBuf,
    /// Tracer executable (strace)
    pub tracer_bin: PathBuf,
    /// Extra tracer arguments placed before `-o <trace file>`
    pub tracer_args: Vec<String>,
    /// Worker pause while the trace has no new lines
    pub poll_interval_ms: u64,
    /// Controller wait slice while the watcher shuts down
    pub join_poll_ms: u64,
    pub tts: TtsSpeakerConfig,
}

impl Default for VoiceTraceConfig {
    fn default() -> Self {
        let db_path = std::env::var("VOICETRACE_DB")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_db_path);
        let tracer_bin = std::env::var("STRACE_BIN")
            .ok()
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("strace"));
        // Comma-separated, e.g. "-s,128,-e,trace=file"
        let tracer_args = std::env::var("TRACER_EXTRA_ARGS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|arg| arg.trim().to_string())
                    .filter(|arg| !arg.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            db_path,
            tracer_bin,
            tracer_args,
            poll_interval_ms: std::env::var("VOICETRACE_POLL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(1),
            join_poll_ms: std::env::var("VOICETRACE_JOIN_POLL_MS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(10),
            tts: TtsSpeakerConfig::default(),
        }
    }
}

/// `desctab.db` next to the executable, or in the working directory.
fn default_db_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join("desctab.db")))
        .unwrap_or_else(|| PathBuf::from("desctab.db"))
}

impl VoiceTraceConfig {
    /// Load configuration from a TOML file (explicit path, else VOICETRACE_CONFIG,
    /// else ./voicetrace.toml), overlaying values onto env-driven defaults.
    pub fn load(explicit: Option<&Path>) -> Self {
        let default = Self::default();
        let path = explicit.map(Path::to_path_buf).unwrap_or_else(|| {
            PathBuf::from(
                std::env::var("VOICETRACE_CONFIG").unwrap_or_else(|_| "voicetrace.toml".into()),
            )
        });
        if !path.exists() {
            if explicit.is_some() {
                tracing::warn!(target: "voicetrace", path = %path.display(), "Config file not found; using defaults/env");
            } else {
                tracing::debug!(target: "voicetrace", path = %path.display(), "No TOML config found; using defaults/env");
            }
            return default;
        }
        match fs::read_to_string(&path) {
            Ok(s) => Self::from_toml_str(&s, default),
            Err(e) => {
                tracing::warn!(target: "voicetrace", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }

    fn from_toml_str(s: &str, default: Self) -> Self {
        match toml::from_str::<VoiceTraceToml>(s) {
            Ok(t) => t.overlay(default),
            Err(e) => {
                tracing::warn!(target: "voicetrace", error = %e, "Failed to parse TOML; using defaults");
                default
            }
        }
    }

    /// Whether `tracer_args` make strace prefix each line with a pid, which
    /// hides the syscall name from the formatter.
    pub fn follows_forks(&self) -> bool {
        self.tracer_args.iter().any(|arg| {
            matches!(arg.as_str(), "-f" | "-ff" | "--follow-forks")
                || arg.starts_with("--follow-forks=")
        })
    }

    pub fn watcher_config(&self, trace_path: &Path) -> WatcherConfig {
        let mut cfg = WatcherConfig::new(trace_path);
        cfg.poll_interval = Duration::from_millis(self.poll_interval_ms);
        cfg.join_poll_interval = Duration::from_millis(self.join_poll_ms.max(1));
        cfg
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct VoiceTraceToml {
    pub db_path: Option<PathBuf>,
    pub tracer_bin: Option<PathBuf>,
    pub tracer_args: Option<Vec<String>>,
    pub poll_interval_ms: Option<u64>,
    pub join_poll_ms: Option<u64>,
    pub tts: Option<TtsToml>,
}

impl VoiceTraceToml {
    fn overlay(self, mut base: VoiceTraceConfig) -> VoiceTraceConfig {
        if let Some(x) = self.db_path {
            base.db_path = x;
        }
        if let Some(x) = self.tracer_bin {
            base.tracer_bin = x;
        }
        if let Some(x) = self.tracer_args {
            base.tracer_args = x.into_iter().filter(|a| !a.is_empty()).collect();
        }
        if let Some(x) = self.poll_interval_ms {
            base.poll_interval_ms = x;
        }
        if let Some(x) = self.join_poll_ms {
            base.join_poll_ms = x;
        }
        if let Some(t) = self.tts {
            t.apply(&mut base.tts);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct TtsToml {
    pub voice: Option<String>,
    pub rate: Option<f32>,
    pub volume: Option<f32>,
    pub sample_rate: Option<u32>,
    pub player: Option<String>,
    pub timeout_ms: Option<u64>,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
}

impl TtsToml {
    fn apply(self, t: &mut TtsSpeakerConfig) {
        if let Some(x) = self.voice {
            t.voice = x;
        }
        if let Some(x) = self.rate {
            t.rate = x.clamp(0.5, 2.0);
        }
        if let Some(x) = self.volume {
            t.volume = x.clamp(0.5, 2.0);
        }
        if let Some(x) = self.sample_rate {
            t.sample_rate = x;
        }
        if let Some(x) = self.player {
            t.player = Some(x);
        }
        if let Some(x) = self.timeout_ms {
            t.timeout_ms = x;
        }
        if let Some(x) = self.piper_bin {
            t.piper_bin = Some(x);
        }
        if let Some(x) = self.piper_voice {
            t.piper_voice = Some(x);
        }
        if let Some(x) = self.piper_voice_dir {
            t.piper_voice_dir = Some(x);
        }
        if let Some(x) = self.espeak_bin {
            t.espeak_bin = Some(x);
        }
    }
}
