// Voicetrace Core Library
// Trace-line parsing, description formatting and the trace-file watcher

pub mod formatter;
pub mod handlers;
pub mod lookup;
pub mod speech;
pub mod template;
pub mod trace;
pub mod watcher;

// Export core types
pub use formatter::{describe_outcome, Formatter};
pub use handlers::{HandlerState, SpecialHandler};
pub use lookup::{DescriptionLookup, SqliteDescriptions};
pub use speech::{ConsoleSink, SpeechSink};
pub use trace::{parse_call, syscall_name, ParsedCall, Stream, Val};
pub use watcher::{QuitState, WatchReport, Watcher, WatcherConfig, WatcherState};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceTraceError {
    #[error("Lookup store error: {0}")]
    StoreError(String),

    #[error("Template error: {0}")]
    TemplateError(String),

    #[error("Watcher error: {0}")]
    WatcherError(String),

    #[error("Speech error: {0}")]
    SpeechError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
}
pub type Result<T> = std::result::Result<T, VoiceTraceError>;
