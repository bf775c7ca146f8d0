use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;

/// Suppression interval after an ACCEPT.
pub const COOLDOWN: Duration = Duration::from_secs(3);

/// Shared "locked" flag. Readable from any thread; only `CooldownTimer`
/// writes it.
#[derive(Clone, Debug, Default)]
pub struct DetectionState {
    locked: Arc<AtomicBool>,
}

impl DetectionState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw flag value. Does not apply an elapsed deadline; use
    /// `CooldownTimer::is_locked` for that.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    fn set(&self, locked: bool) {
        self.locked.store(locked, Ordering::SeqCst);
    }

    /// Clear the flag. Returns false if it was already clear.
    fn try_unlock(&self) -> bool {
        self.locked
            .compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// One-shot deferred unlock.
///
/// `arm` locks the state and records a deadline. The lock is released by the
/// first `refresh` (or `is_locked`) that observes the deadline has passed,
/// whichever thread that happens on. The timer cannot be cancelled.
pub struct CooldownTimer {
    state: DetectionState,
    clock: Arc<dyn Clock>,
    period: Duration,
    deadline_nanos: AtomicU64,
}

impl CooldownTimer {
    pub fn new(state: DetectionState, clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self {
            state,
            clock,
            period,
            deadline_nanos: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> &DetectionState {
        &self.state
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Lock now and schedule the unlock `period` from now.
    pub fn arm(&self) {
        let deadline = self.clock.now().saturating_add(self.period);
        let nanos = u64::try_from(deadline.as_nanos()).unwrap_or(u64::MAX);
        self.deadline_nanos.store(nanos, Ordering::SeqCst);
        self.state.set(true);
        log::debug!("cooldown armed for {:?}", self.period);
    }

    /// Release the lock if its deadline has passed.
    ///
    /// An `arm` racing with this call always wins: if the deadline moved
    /// while the lock was being cleared, the lock is restored.
    pub fn refresh(&self) {
        if !self.state.is_locked() {
            return;
        }
        let seen = self.deadline_nanos.load(Ordering::SeqCst);
        if self.clock.now() < Duration::from_nanos(seen) {
            return;
        }
        if !self.state.try_unlock() {
            return;
        }
        if self.deadline_nanos.load(Ordering::SeqCst) != seen {
            self.state.set(true);
            return;
        }
        log::debug!("cooldown elapsed, detection unlocked");
    }

    pub fn is_locked(&self) -> bool {
        self.refresh();
        self.state.is_locked()
    }

    /// Time left before the lock clears, zero when unlocked.
    pub fn remaining(&self) -> Duration {
        if !self.is_locked() {
            return Duration::ZERO;
        }
        let deadline = Duration::from_nanos(self.deadline_nanos.load(Ordering::SeqCst));
        deadline.saturating_sub(self.clock.now())
    }
}
