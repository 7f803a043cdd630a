//! Time source abstraction for key expiry checks
//!
//! Key expiry is the only place where "now" matters, and it needs to be
//! pluggable so that expiry behavior can be pinned down in tests.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of the current time.
pub trait TimeSource: Send + Sync {
    /// Get the current time from this source.
    fn now(&self) -> SystemTime;

    /// Get the current time as a Unix timestamp (seconds since epoch).
    fn now_unix(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs()
    }
}

/// System time source using `std::time::SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A fixed time source, for tests and known-good timestamps.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    unix_secs: u64,
}

impl FixedTimeSource {
    pub fn from_unix_secs(unix_secs: u64) -> Self {
        Self { unix_secs }
    }
}

impl TimeSource for FixedTimeSource {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(self.unix_secs)
    }
}
