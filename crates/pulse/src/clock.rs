//! Strictly monotonic millisecond clock.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Get current wall-clock timestamp in milliseconds.
pub fn system_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Issues millisecond timestamps that never repeat and never go backwards.
///
/// Event ordering and event identity both rely on this: two events recorded
/// in the same millisecond still get distinct timestamps.
pub struct Clock {
    last: Mutex<i64>,
    source: Box<dyn Fn() -> i64 + Send + Sync>,
}

impl Clock {
    /// Clock backed by the system wall clock.
    pub fn system() -> Self {
        Self::with_source(system_now_ms)
    }

    /// Clock backed by an arbitrary millisecond source.
    pub fn with_source(source: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self {
            last: Mutex::new(i64::MIN),
            source: Box::new(source),
        }
    }

    /// Current timestamp, strictly greater than any previously returned one.
    pub fn now(&self) -> i64 {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        let raw = (self.source)();
        let next = if raw > *last { raw } else { *last + 1 };
        *last = next;
        next
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::system()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = *self.last.lock().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Clock").field("last", &last).finish()
    }
}
