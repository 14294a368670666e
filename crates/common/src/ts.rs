//! Millisecond-precision wall-clock timestamps, used anywhere a spec field is
//! documented as epoch milliseconds (message timestamps, lease deadlines,
//! dedupe-cache entries).

use std::time::{SystemTime, UNIX_EPOCH};

/// Current time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as i64
}
