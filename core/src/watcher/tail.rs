//! Line reader for a file that another process is still appending to.

use crate::Result;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;

/// Reads complete lines from a growing file.
///
/// Reaching the current end of file is not an error, just "no line yet". A
/// line whose newline has not been written yet is held back until it is
/// completed, so each appended line is returned exactly once.
pub struct TraceTail {
    reader: BufReader<File>,
    pending: Vec<u8>,
}

impl TraceTail {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::from_file(File::open(path)?))
    }

    pub fn from_file(file: File) -> Self {
        Self {
            reader: BufReader::new(file),
            pending: Vec::new(),
        }
    }

    /// Next complete line without its line terminator, or `None` if no full
    /// line is available right now.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending)?;
        if read == 0 || !self.pending.ends_with(b"\n") {
            return Ok(None);
        }
        Ok(Some(self.take_pending()))
    }

    /// Whatever unterminated text is left over, used once the writer is done.
    pub fn take_partial(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take_pending())
        }
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.pending.clear();
        line
    }
}
