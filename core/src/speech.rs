//! Output side of the narration: anything that can say a sentence.

use crate::Result;
use std::io::Write;

/// Receives each rendered sentence. Delivery is best effort: the watcher logs
/// errors and carries on with the next line.
#[cfg_attr(test, mockall::automock)]
pub trait SpeechSink: Send {
    fn speak(&mut self, text: &str) -> Result<()>;
}

impl<T: SpeechSink + ?Sized> SpeechSink for Box<T> {
    fn speak(&mut self, text: &str) -> Result<()> {
        (**self).speak(text)
    }
}

/// Prints sentences instead of speaking them.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl SpeechSink for ConsoleSink {
    fn speak(&mut self, text: &str) -> Result<()> {
        let mut out = std::io::stdout().lock();
        writeln!(out, "{}", text)?;
        out.flush()?;
        Ok(())
    }
}
