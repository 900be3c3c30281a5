//! TtsSpeaker against stand-in engine binaries.

use std::path::{Path, PathBuf};
use voicetrace_audio::{TtsSpeaker, TtsSpeakerConfig};
use voicetrace_core::{SpeechSink, VoiceTraceError};

fn with_espeak(bin: &str) -> Option<TtsSpeakerConfig> {
    if !Path::new(bin).exists() {
        return None;
    }
    Some(TtsSpeakerConfig {
        espeak_bin: Some(PathBuf::from(bin)),
        timeout_ms: 5_000,
        ..TtsSpeakerConfig::silent()
    })
}

#[test]
fn test_no_engine_only_logs() {
    let mut speaker = TtsSpeaker::new(TtsSpeakerConfig::silent());
    assert_eq!(speaker.engine(), "none");
    speaker.speak("open file /etc/hosts, succeeded").unwrap();
    speaker.speak("second sentence").unwrap();
}

#[test]
fn test_blank_text_is_not_spoken() {
    let Some(cfg) = with_espeak("/bin/false") else {
        return;
    };
    let mut speaker = TtsSpeaker::new(cfg);
    // Would fail if the engine were actually invoked
    speaker.speak("   ").unwrap();
}

#[test]
fn test_espeak_engine_success() {
    let Some(cfg) = with_espeak("/bin/true") else {
        return;
    };
    let mut speaker = TtsSpeaker::new(cfg);
    assert_eq!(speaker.engine(), "espeak-ng");
    speaker.speak("-starts with a dash").unwrap();
}

#[test]
fn test_espeak_engine_failure_is_reported() {
    let Some(cfg) = with_espeak("/bin/false") else {
        return;
    };
    let mut speaker = TtsSpeaker::new(cfg);
    let err = speaker.speak("close socket 5").unwrap_err();
    assert!(matches!(err, VoiceTraceError::SpeechError(_)));
}
