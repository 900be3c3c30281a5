// Audio output for voicetrace

// Shared audio utilities
pub(crate) mod utils;

pub mod tts;

pub use tts::{TtsSpeaker, TtsSpeakerConfig};
