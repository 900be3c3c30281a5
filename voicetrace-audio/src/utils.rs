//! Shared audio utilities.

use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since UNIX epoch, for timing synthesis and playback.
#[inline]
pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Process id plus current time in nanoseconds, used to name temporary WAV
/// files so concurrent sessions never share one.
#[inline]
pub(crate) fn gen_id() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{}_{:x}", std::process::id(), nanos)
}
