//! Text-to-Speech (TTS) speech sink
//!
//! Speaks narration sentences using local CLI engines with graceful degradation:
//! - Prefer Piper (higher quality, requires voice model)
//! - Fallback to espeak-ng (widely available)
//! - If neither present, logs the text and returns OK
//!
//! Env overrides:
//! - PIPER_BIN, PIPER_VOICE, PIPER_VOICE_DIR
//! - ESPEAK_BIN
//! - TTS_TIMEOUT_MS, TTS_TEMP_DIR
//!
//! Speech processes run in their own process group so that a Ctrl+C meant for
//! the traced command does not cut narration short.

use crate::utils::{gen_id, now_ms};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use voicetrace_core::{Result, SpeechSink, VoiceTraceError};

#[derive(Clone, Debug)]
pub struct TtsSpeakerConfig {
    pub temp_dir: PathBuf,
    pub timeout_ms: u64,
    pub sample_rate: u32,
    pub piper_bin: Option<PathBuf>,
    pub piper_voice: Option<PathBuf>,
    pub piper_voice_dir: Option<PathBuf>,
    pub espeak_bin: Option<PathBuf>,
    /// Piper voice model path/name or espeak voice code; empty for default
    pub voice: String,
    /// Speaking rate multiplier (0.5–2.0)
    pub rate: f32,
    /// Volume multiplier (0.5–2.0)
    pub volume: f32,
    /// Preferred WAV player for Piper output (aplay|paplay|ffplay)
    pub player: Option<String>,
}

impl Default for TtsSpeakerConfig {
    fn default() -> Self {
        let temp_dir = std::env::var("TTS_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir());
        let timeout_ms = std::env::var("TTS_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(20_000);

        let piper_bin = get_from_env_or_path("PIPER_BIN", "piper");
        let piper_voice = std::env::var("PIPER_VOICE").ok().map(PathBuf::from);
        let piper_voice_dir = std::env::var("PIPER_VOICE_DIR").ok().map(PathBuf::from);
        let espeak_bin =
            get_from_env_or_path("ESPEAK_BIN", "espeak-ng").or_else(|| get_from_path("espeak"));

        Self {
            temp_dir,
            timeout_ms,
            sample_rate: 16_000,
            piper_bin,
            piper_voice,
            piper_voice_dir,
            espeak_bin,
            voice: String::new(),
            rate: 1.0,
            volume: 1.0,
            player: None,
        }
    }
}

impl TtsSpeakerConfig {
    /// Configuration with no engines at all: every sentence is only logged.
    pub fn silent() -> Self {
        Self {
            piper_bin: None,
            piper_voice: None,
            espeak_bin: None,
            ..Self::default()
        }
    }
}

fn get_from_env_or_path(env_key: &str, default_bin: &str) -> Option<PathBuf> {
    if let Ok(p) = std::env::var(env_key) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return Some(pb);
        }
    }
    get_from_path(default_bin)
}

fn get_from_path(bin: &str) -> Option<PathBuf> {
    // If a path-like string is provided, respect it directly
    if bin.contains(std::path::MAIN_SEPARATOR) {
        let p = PathBuf::from(bin);
        return if p.exists() { Some(p) } else { None };
    }

    let paths_os = std::env::var_os("PATH")?;
    std::env::split_paths(&paths_os)
        .map(|dir| dir.join(bin))
        .find(|candidate| candidate.exists())
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Engine {
    Piper,
    Espeak,
    None,
}

impl Engine {
    fn as_str(self) -> &'static str {
        match self {
            Engine::Piper => "piper",
            Engine::Espeak => "espeak-ng",
            Engine::None => "none",
        }
    }
}

/// Speech sink backed by a local TTS engine.
pub struct TtsSpeaker {
    cfg: TtsSpeakerConfig,
    engine: Engine,
    warned_no_engine: bool,
}

impl TtsSpeaker {
    pub fn new(cfg: TtsSpeakerConfig) -> Self {
        let engine = select_engine(&cfg);
        // Log detected engines once
        if let Some(ref p) = cfg.piper_bin {
            info!(target: "tts", bin = ?p, "Detected Piper binary");
        }
        if let Some(ref e) = cfg.espeak_bin {
            info!(target: "tts", bin = ?e, "Detected espeak-ng binary");
        }
        Self {
            cfg,
            engine,
            warned_no_engine: false,
        }
    }

    /// Name of the engine used for speaking ("piper", "espeak-ng" or "none").
    pub fn engine(&self) -> &'static str {
        self.engine.as_str()
    }

    fn rate(&self) -> f32 {
        self.cfg.rate.clamp(0.5, 2.0)
    }

    fn volume(&self) -> f32 {
        self.cfg.volume.clamp(0.5, 2.0)
    }

    fn timeout(&self) -> Duration {
        Duration::from_millis(self.cfg.timeout_ms)
    }

    fn speak_with_piper(&self, text: &str) -> Result<()> {
        let wav_path = self
            .cfg
            .temp_dir
            .join(format!("voicetrace_tts_{}.wav", gen_id()));

        let synth_start = now_ms();
        synth_with_piper(&self.cfg, self.rate(), text, &wav_path, self.timeout())?;
        let synthesis_ms = now_ms() - synth_start;

        // Piper has no volume flag; scale the samples instead
        let volume = self.volume();
        if (volume - 1.0).abs() > f32::EPSILON {
            if let Err(e) = scale_wav_pcm16_inplace(&wav_path, volume) {
                warn!(target: "tts", error = %e, "Failed to scale volume for WAV");
            }
        }

        let play_start = now_ms();
        match select_player(self.cfg.player.as_deref()) {
            Some(player) => {
                let mut cmd = play_command(&player, &wav_path);
                run_with_timeout(&mut cmd, player.as_str(), self.timeout())?;
            }
            None => {
                info!(target: "tts", path = ?wav_path, "No audio player found; kept WAV on disk");
                return Ok(());
            }
        }
        let playback_ms = now_ms() - play_start;
        debug!(target: "tts", synthesis_ms, playback_ms, "Piper narration finished");

        if let Err(e) = fs::remove_file(&wav_path) {
            debug!(target: "tts", error = %e, path = ?wav_path, "Could not remove WAV");
        }
        Ok(())
    }

    fn speak_with_espeak(&self, text: &str) -> Result<()> {
        let espeak = self
            .cfg
            .espeak_bin
            .as_ref()
            .ok_or_else(|| VoiceTraceError::SpeechError("espeak-ng not found".into()))?;
        let mut cmd = Command::new(espeak);
        let wpm = (160.0 * self.rate()).round().clamp(80.0, 450.0) as i32;
        let amp = (100.0 * self.volume()).round().clamp(50.0, 200.0) as i32;
        if !self.cfg.voice.is_empty() {
            cmd.arg("-v").arg(&self.cfg.voice);
        }
        cmd.arg("-s").arg(wpm.to_string());
        cmd.arg("-a").arg(amp.to_string());
        cmd.arg("--").arg(text);
        debug!(target: "tts", command = ?cmd, "Running espeak-ng");
        run_with_timeout(&mut cmd, "espeak-ng", self.timeout())
    }
}

impl SpeechSink for TtsSpeaker {
    fn speak(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }
        match self.engine {
            Engine::Piper => self.speak_with_piper(text),
            Engine::Espeak => self.speak_with_espeak(text),
            Engine::None => {
                if !self.warned_no_engine {
                    warn!(
                        target: "tts",
                        "No TTS engine detected (Piper/espeak-ng missing). Printing only."
                    );
                    self.warned_no_engine = true;
                }
                info!(target: "tts", text = %text, "Narration");
                Ok(())
            }
        }
    }
}

fn select_engine(cfg: &TtsSpeakerConfig) -> Engine {
    if cfg.piper_bin.is_some() && resolve_piper_voice_path(cfg).is_some() {
        return Engine::Piper;
    }
    if cfg.espeak_bin.is_some() {
        return Engine::Espeak;
    }
    Engine::None
}

fn resolve_piper_voice_path(cfg: &TtsSpeakerConfig) -> Option<PathBuf> {
    if let Some(v) = &cfg.piper_voice {
        return Some(v.clone());
    }
    if cfg.voice.is_empty() {
        return None;
    }
    let vh = PathBuf::from(&cfg.voice);
    if vh.exists() {
        return Some(vh);
    }
    let dir = cfg.piper_voice_dir.as_ref()?;
    let candidate = dir.join(&cfg.voice);
    if candidate.exists() {
        return Some(candidate);
    }
    ["onnx", "onnx.gz", "pt", "pth"]
        .iter()
        .map(|ext| dir.join(format!("{}.{}", cfg.voice, ext)))
        .find(|c| c.exists())
}

fn detach(cmd: &mut Command) {
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        cmd.process_group(0);
    }
    #[cfg(not(unix))]
    let _ = cmd;
}

/// Wait for `child`, killing it once `timeout` has passed.
fn wait_with_timeout(mut child: Child, name: &str, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait()? {
            if status.success() {
                return Ok(());
            }
            return Err(VoiceTraceError::SpeechError(format!(
                "{} exited with {}",
                name, status
            )));
        }
        if Instant::now() >= deadline {
            let _ = child.kill();
            let _ = child.wait();
            return Err(VoiceTraceError::SpeechError(format!(
                "{} timed out after {} ms",
                name,
                timeout.as_millis()
            )));
        }
        thread::sleep(Duration::from_millis(10));
    }
}

fn run_with_timeout(cmd: &mut Command, name: &str, timeout: Duration) -> Result<()> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    detach(cmd);
    let child = cmd.spawn()?;
    wait_with_timeout(child, name, timeout)
}

fn synth_with_piper(
    cfg: &TtsSpeakerConfig,
    rate: f32,
    text: &str,
    out_wav: &Path,
    timeout: Duration,
) -> Result<()> {
    let piper = cfg
        .piper_bin
        .as_ref()
        .ok_or_else(|| VoiceTraceError::SpeechError("Piper binary not found".into()))?;
    let voice_path = resolve_piper_voice_path(cfg).ok_or_else(|| {
        VoiceTraceError::SpeechError("Piper voice not found; set PIPER_VOICE or tts.voice".into())
    })?;

    let mut cmd = Command::new(piper);
    cmd.arg("-m").arg(voice_path);
    cmd.arg("-f").arg(out_wav);
    let length_scale = (1.0f32 / rate).clamp(0.5, 2.0);
    cmd.arg("--length_scale")
        .arg(format!("{:.2}", length_scale));
    cmd.arg("--sample_rate").arg(cfg.sample_rate.to_string());
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::null());
    cmd.stderr(Stdio::null());
    detach(&mut cmd);

    debug!(target: "tts", command = ?cmd, "Running piper");
    let mut child = cmd.spawn()?;
    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(text.as_bytes())?;
    }
    wait_with_timeout(child, "piper", timeout)
}

fn play_command(player: &str, wav_path: &Path) -> Command {
    let bin = get_from_path(player).unwrap_or_else(|| PathBuf::from(player));
    let mut cmd = Command::new(bin);
    if player == "ffplay" {
        cmd.arg("-autoexit").arg("-nodisp");
    }
    cmd.arg(wav_path);
    cmd
}

fn select_player(pref: Option<&str>) -> Option<String> {
    if let Some(p) = pref {
        if get_from_path(p).is_some() {
            return Some(p.to_string());
        }
    }
    ["aplay", "paplay", "ffplay"]
        .into_iter()
        .find(|p| get_from_path(p).is_some())
        .map(str::to_string)
}

/// Multiply the PCM16 samples of a WAV file by `gain`, in place.
/// Files that are not RIFF/WAVE are left untouched.
pub fn scale_wav_pcm16_inplace(path: &Path, gain: f32) -> std::io::Result<()> {
    let mut f = File::open(path)?;
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;

    if buf.len() < 12 || &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Ok(());
    }
    let mut idx = 12;
    let mut data = None;
    while idx + 8 <= buf.len() {
        let chunk_id = &buf[idx..idx + 4];
        let sz =
            u32::from_le_bytes([buf[idx + 4], buf[idx + 5], buf[idx + 6], buf[idx + 7]]) as usize;
        if chunk_id == b"data" {
            let start = idx + 8;
            data = Some(start..(start + sz).min(buf.len()));
            break;
        }
        idx += 8 + sz;
    }
    if let Some(range) = data {
        for chunk in buf[range].chunks_exact_mut(2) {
            let s = i16::from_le_bytes([chunk[0], chunk[1]]);
            let scaled = (s as f32 * gain).clamp(i16::MIN as f32, i16::MAX as f32) as i16;
            chunk.copy_from_slice(&scaled.to_le_bytes());
        }
        let mut out = File::create(path)?;
        out.write_all(&buf)?;
    }
    Ok(())
}
