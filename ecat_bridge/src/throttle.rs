//! Per-code notification throttling.
//!
//! Each throttled code keeps the time it was last let through. A notification
//! arriving before `last_seen + timeout` is suppressed and does not move the
//! window.

use ecat_common::notify::NotifyCode;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Millisecond time source.
pub trait Clock: Send + Sync {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u64;
}

/// Wall clock, milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for tests and simulations.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    /// Clock starting at `start_ms`.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    /// Jump to `ms`.
    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy)]
struct ThrottleElem {
    code: NotifyCode,
    last_seen: Option<u64>,
    timeout_ms: u64,
}

/// Throttle entries, at most one per code.
#[derive(Debug, Default)]
pub struct ThrottleQueue {
    entries: Vec<ThrottleElem>,
}

impl ThrottleQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Throttle `code` with a window of `timeout_ms` (0 disables).
    ///
    /// Replaces any previous entry for `code`; the new entry starts unseen.
    pub fn set(&mut self, code: NotifyCode, timeout_ms: u64) {
        self.entries.retain(|e| e.code != code);
        self.entries.push(ThrottleElem {
            code,
            last_seen: None,
            timeout_ms,
        });
    }

    /// Decide whether a notification of `code` arriving at `now_ms` is suppressed.
    ///
    /// Records `now_ms` as last seen whenever the notification passes.
    pub fn check(&mut self, code: NotifyCode, now_ms: u64) -> bool {
        let Some(elem) = self.entries.iter_mut().find(|e| e.code == code) else {
            return false;
        };

        let timeout = elem.timeout_ms;
        if elem
            .last_seen
            .is_some_and(|last| last.saturating_add(timeout) > now_ms)
        {
            return true;
        }

        elem.last_seen = Some(now_ms);
        false
    }

    /// Configured window for `code`.
    pub fn timeout(&self, code: NotifyCode) -> Option<u64> {
        self.entries.iter().find(|e| e.code == code).map(|e| e.timeout_ms)
    }

    /// Number of throttled codes.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no code is throttled.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unthrottled_code_passes() {
        let mut q = ThrottleQueue::new();
        assert!(!q.check(NotifyCode::SbStatus, 0));
        assert!(q.is_empty());
    }

    #[test]
    fn window_timeline() {
        let mut q = ThrottleQueue::new();
        q.set(NotifyCode::CyccmdWkcError, 1000);

        assert!(!q.check(NotifyCode::CyccmdWkcError, 0));
        assert!(q.check(NotifyCode::CyccmdWkcError, 500));
        assert!(!q.check(NotifyCode::CyccmdWkcError, 1500));
        // Window restarted at 1500.
        assert!(q.check(NotifyCode::CyccmdWkcError, 2499));
        assert!(!q.check(NotifyCode::CyccmdWkcError, 2500));
    }

    #[test]
    fn suppressed_notification_does_not_extend_window() {
        let mut q = ThrottleQueue::new();
        q.set(NotifyCode::SbStatus, 100);
        assert!(!q.check(NotifyCode::SbStatus, 10));
        assert!(q.check(NotifyCode::SbStatus, 90));
        assert!(!q.check(NotifyCode::SbStatus, 110));
    }

    #[test]
    fn zero_timeout_never_throttles() {
        let mut q = ThrottleQueue::new();
        q.set(NotifyCode::StateChanged, 0);
        for t in [0, 0, 1, 1, 2] {
            assert!(!q.check(NotifyCode::StateChanged, t));
        }
    }

    #[test]
    fn reset_replaces_entry() {
        let mut q = ThrottleQueue::new();
        q.set(NotifyCode::SbStatus, 1000);
        assert!(!q.check(NotifyCode::SbStatus, 0));
        q.set(NotifyCode::SbStatus, 50);

        assert_eq!(q.len(), 1);
        assert_eq!(q.timeout(NotifyCode::SbStatus), Some(50));
        // Fresh entry: the next one passes regardless of the old window.
        assert!(!q.check(NotifyCode::SbStatus, 10));
        assert!(q.check(NotifyCode::SbStatus, 20));
    }

    #[test]
    fn manual_clock_moves() {
        let clock = ManualClock::new(5);
        clock.advance(10);
        assert_eq!(clock.now_ms(), 15);
        clock.set(2);
        assert_eq!(clock.now_ms(), 2);
        assert!(SystemClock.now_ms() > 0);
    }
}
