//! [`ActivityLock`] – advisory arbitration between the idle loop and live
//! conversations.
//!
//! Chat- and voice-driven turns call [`ActivityLock::enter`] (or wrap their
//! work in [`ActivityLock::run`]) for the duration of one model round-trip.
//! The idle behavior loop calls [`ActivityLock::is_active`] before each turn
//! and skips the turn while anyone holds the lock.
//!
//! The lock is a counter, not a mutex: several turns may hold it at once and
//! nobody ever waits on it.  A holder that never exits cannot wedge the idle
//! loop forever: once the first holder has been in for longer than the
//! maximum lock duration, the next `is_active` call logs a warning, resets the
//! count, and reports the lock free.  A stuck holder may therefore have the
//! lock released from under it.
//!
//! # Example
//!
//! ```
//! use embody_kernel::ActivityLock;
//!
//! let lock = ActivityLock::new();
//! assert!(!lock.is_active());
//!
//! {
//!     let _guard = lock.acquire();
//!     assert!(lock.is_active());
//! }
//!
//! assert!(!lock.is_active());
//! ```

use std::future::Future;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

/// Default hold time after which the safety valve releases the lock.
pub const DEFAULT_MAX_LOCK_DURATION: Duration = Duration::from_secs(30);

// ────────────────────────────────────────────────────────────────────────────
// Internal state
// ────────────────────────────────────────────────────────────────────────────

/// `count == 0` ⇔ `last_acquired_at.is_none()`.
#[derive(Debug, Default)]
struct LockState {
    count: usize,
    last_acquired_at: Option<Instant>,
}

// ────────────────────────────────────────────────────────────────────────────
// ActivityLock
// ────────────────────────────────────────────────────────────────────────────

/// Reference-counted advisory lock with a safety timeout.
///
/// Construct one per agent and share it (`Arc<ActivityLock>`) with every
/// component that produces or yields to activity.
#[derive(Debug)]
pub struct ActivityLock {
    state: Mutex<LockState>,
    max_duration: Duration,
}

impl Default for ActivityLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ActivityLock {
    /// Create a free lock with the default 30 s safety valve.
    pub fn new() -> Self {
        Self::with_max_duration(DEFAULT_MAX_LOCK_DURATION)
    }

    /// Create a free lock whose safety valve trips after `max_duration`.
    pub fn with_max_duration(max_duration: Duration) -> Self {
        Self {
            state: Mutex::new(LockState::default()),
            max_duration,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, LockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register one more in-flight activity.
    ///
    /// The acquisition timestamp is recorded only on the 0 → 1 transition.
    pub fn enter(&self) {
        let mut state = self.lock_state();
        state.count += 1;
        if state.count == 1 {
            state.last_acquired_at = Some(Instant::now());
        }
        debug!(holders = state.count, "activity lock entered");
    }

    /// Release one in-flight activity.  The count never drops below zero.
    pub fn exit(&self) {
        let mut state = self.lock_state();
        state.count = state.count.saturating_sub(1);
        if state.count == 0 {
            state.last_acquired_at = None;
        }
        debug!(holders = state.count, "activity lock exited");
    }

    /// `true` while at least one activity holds the lock.
    ///
    /// If the lock has been held for longer than the maximum duration it is
    /// force-reset, a warning is logged, and `false` is returned.
    pub fn is_active(&self) -> bool {
        let mut state = self.lock_state();
        if state.count == 0 {
            return false;
        }
        match state.last_acquired_at {
            Some(at) if at.elapsed() > self.max_duration => {
                warn!(
                    holders = state.count,
                    held_for_ms = at.elapsed().as_millis() as u64,
                    "activity lock held past its maximum duration; force-releasing"
                );
                state.count = 0;
                state.last_acquired_at = None;
                false
            }
            _ => true,
        }
    }

    /// Number of current holders, without tripping the safety valve.
    pub fn holders(&self) -> usize {
        self.lock_state().count
    }

    /// Enter the lock and return a guard that exits it on drop.
    pub fn acquire(&self) -> ActivityGuard<'_> {
        self.enter();
        ActivityGuard { lock: self }
    }

    /// Hold the lock for the whole of `work`.
    ///
    /// The lock is released when `work` completes, fails, panics, or is
    /// dropped mid-flight.  Whatever `work` returns, including an `Err`, is
    /// handed back to the caller.
    pub async fn run<F, T>(&self, work: F) -> T
    where
        F: Future<Output = T>,
    {
        let _guard = self.acquire();
        work.await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// RAII guard
// ────────────────────────────────────────────────────────────────────────────

/// Holds one count on an [`ActivityLock`]; dropping it calls
/// [`ActivityLock::exit`].
#[must_use = "the lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ActivityGuard<'a> {
    lock: &'a ActivityLock,
}

impl Drop for ActivityGuard<'_> {
    fn drop(&mut self) {
        self.lock.exit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lock_is_inactive() {
        let lock = ActivityLock::new();
        assert!(!lock.is_active());
        assert_eq!(lock.holders(), 0);
    }

    #[test]
    fn enter_and_exit_balance() {
        let lock = ActivityLock::new();
        lock.enter();
        assert!(lock.is_active());
        lock.exit();
        assert!(!lock.is_active());
    }

    #[test]
    fn counter_allows_overlapping_holders() {
        let lock = ActivityLock::new();
        lock.enter();
        lock.enter();
        lock.exit();
        // One holder still in flight.
        assert!(lock.is_active());
        lock.exit();
        assert!(!lock.is_active());
    }

    #[test]
    fn exit_is_floored_at_zero() {
        let lock = ActivityLock::new();
        lock.exit();
        lock.exit();
        assert_eq!(lock.holders(), 0);
        lock.enter();
        assert!(lock.is_active());
        assert_eq!(lock.holders(), 1);
    }

    #[test]
    fn timestamp_tracks_count() {
        let lock = ActivityLock::new();
        let steps: [bool; 8] = [true, true, false, true, false, false, false, true];
        for enter in steps {
            if enter {
                lock.enter();
            } else {
                lock.exit();
            }
            let state = lock.lock_state();
            assert_eq!(state.count == 0, state.last_acquired_at.is_none());
        }
    }

    #[test]
    fn second_enter_keeps_first_timestamp() {
        let lock = ActivityLock::new();
        lock.enter();
        let first = lock.lock_state().last_acquired_at;
        lock.enter();
        assert_eq!(lock.lock_state().last_acquired_at, first);
    }

    #[test]
    fn guard_releases_on_drop() {
        let lock = ActivityLock::new();
        let guard = lock.acquire();
        assert!(lock.is_active());
        drop(guard);
        assert!(!lock.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn unmatched_enter_expires_after_max_duration() {
        let lock = ActivityLock::new();
        lock.enter();

        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(lock.is_active());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(!lock.is_active());
        assert_eq!(lock.holders(), 0);

        // A late exit from the stuck holder must not underflow.
        lock.exit();
        assert_eq!(lock.holders(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_max_duration_is_honoured() {
        let lock = ActivityLock::with_max_duration(Duration::from_millis(500));
        lock.enter();
        tokio::time::advance(Duration::from_millis(501)).await;
        assert!(!lock.is_active());
    }

    #[tokio::test]
    async fn run_releases_after_success() {
        let lock = ActivityLock::new();
        let value = lock
            .run(async {
                assert!(lock.is_active());
                42
            })
            .await;
        assert_eq!(value, 42);
        assert!(!lock.is_active());
    }

    #[tokio::test]
    async fn run_releases_and_propagates_errors() {
        let lock = ActivityLock::new();
        let result: Result<(), &str> = lock.run(async { Err("model down") }).await;
        assert_eq!(result, Err("model down"));
        assert!(!lock.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn run_releases_when_future_is_dropped() {
        let lock = ActivityLock::new();
        let slow = lock.run(tokio::time::sleep(Duration::from_secs(10)));
        let timed_out = tokio::time::timeout(Duration::from_secs(1), slow).await;
        assert!(timed_out.is_err());
        assert!(!lock.is_active());
    }
}
