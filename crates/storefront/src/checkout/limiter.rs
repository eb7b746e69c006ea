//! Per-customer payment attempt limiter.
//!
//! A fixed window counter keyed by user id: the first attempt opens a window,
//! later attempts inside it count against `max_attempts`, and the first
//! attempt after it closes opens a fresh one. This is an early, friendly
//! refusal only; the backend enforces its own limits on order creation.
//!
//! Records whose window has closed are swept at most once per window, so the
//! store holds only customers who attempted recently.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use himal_core::UserId;

use crate::config::CheckoutConfig;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Attempt counter for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    pub count: u32,
    pub window_start: DateTime<Utc>,
}

/// Storage for attempt records.
///
/// `with_record` must run `f` atomically with respect to other calls for the
/// same user. Setting the slot to `None` removes the record.
pub trait AttemptStore: Send + Sync {
    fn with_record<R>(&self, user: &UserId, f: impl FnOnce(&mut Option<AttemptRecord>) -> R)
    -> R;

    fn remove(&self, user: &UserId);

    /// Keep only the records for which `keep` returns true.
    fn retain(&self, keep: impl FnMut(&AttemptRecord) -> bool);
}

/// Process-local store. Records are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryAttemptStore {
    records: DashMap<UserId, AttemptRecord>,
}

impl MemoryAttemptStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of users with a live record.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AttemptStore for MemoryAttemptStore {
    fn with_record<R>(
        &self,
        user: &UserId,
        f: impl FnOnce(&mut Option<AttemptRecord>) -> R,
    ) -> R {
        match self.records.entry(user.clone()) {
            Entry::Occupied(mut entry) => {
                let mut slot = Some(*entry.get());
                let result = f(&mut slot);
                match slot {
                    Some(record) => *entry.get_mut() = record,
                    None => {
                        entry.remove();
                    }
                }
                result
            }
            Entry::Vacant(entry) => {
                let mut slot = None;
                let result = f(&mut slot);
                if let Some(record) = slot {
                    entry.insert(record);
                }
                result
            }
        }
    }

    fn remove(&self, user: &UserId) {
        self.records.remove(user);
    }

    fn retain(&self, mut keep: impl FnMut(&AttemptRecord) -> bool) {
        self.records.retain(|_, record| keep(record));
    }
}

/// Outcome of [`AttemptLimiter::can_attempt`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptDecision {
    pub allowed: bool,
    pub remaining_attempts: u32,
    /// When a denied user may try again.
    pub reset_time: Option<DateTime<Utc>>,
}

/// Counts payment attempts per user inside a time window.
#[derive(Debug)]
pub struct AttemptLimiter<S = MemoryAttemptStore, C = SystemClock> {
    store: S,
    clock: C,
    max_attempts: u32,
    window: TimeDelta,
    /// Milliseconds since the epoch of the last sweep.
    last_sweep: AtomicI64,
}

impl AttemptLimiter {
    /// In-memory limiter on the wall clock.
    #[must_use]
    pub fn from_config(config: &CheckoutConfig) -> Self {
        Self::new(
            MemoryAttemptStore::new(),
            SystemClock,
            config.max_attempts,
            config.window,
        )
    }
}

impl<S: AttemptStore, C: Clock> AttemptLimiter<S, C> {
    #[must_use]
    pub fn new(store: S, clock: C, max_attempts: u32, window: Duration) -> Self {
        let last_sweep = AtomicI64::new(clock.now().timestamp_millis());
        Self {
            store,
            clock,
            max_attempts,
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            last_sweep,
        }
    }

    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Record an attempt for `user` and say whether it may proceed.
    ///
    /// Denied attempts do not extend the window.
    pub fn can_attempt(&self, user: &UserId) -> AttemptDecision {
        let now = self.clock.now();
        let max = self.max_attempts;
        let window = self.window;

        self.sweep_expired(now);

        self.store.with_record(user, |slot| {
            let fresh = |slot: &mut Option<AttemptRecord>| {
                *slot = Some(AttemptRecord {
                    count: 1,
                    window_start: now,
                });
                AttemptDecision {
                    allowed: true,
                    remaining_attempts: max.saturating_sub(1),
                    reset_time: None,
                }
            };

            let Some(record) = slot.as_mut() else {
                return fresh(slot);
            };

            if now.signed_duration_since(record.window_start) > window {
                return fresh(slot);
            }

            if record.count >= max {
                return AttemptDecision {
                    allowed: false,
                    remaining_attempts: 0,
                    reset_time: record.window_start.checked_add_signed(window),
                };
            }

            record.count += 1;
            AttemptDecision {
                allowed: true,
                remaining_attempts: max.saturating_sub(record.count),
                reset_time: None,
            }
        })
    }

    /// Drop records whose window closed, once per window at most.
    ///
    /// Must not run while a record is borrowed from the store.
    fn sweep_expired(&self, now: DateTime<Utc>) {
        let now_ms = now.timestamp_millis();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now_ms.saturating_sub(last) <= self.window.num_milliseconds() {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now_ms, Ordering::Relaxed, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let window = self.window;
        self.store
            .retain(|record| now.signed_duration_since(record.window_start) <= window);
        tracing::debug!("Swept expired payment attempts");
    }

    /// Forget every attempt recorded for `user`.
    pub fn reset_attempts(&self, user: &UserId) {
        self.store.remove(user);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
pub(crate) mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    /// Clock that only moves when told to.
    #[derive(Debug, Clone)]
    pub(crate) struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

    impl ManualClock {
        pub(crate) fn new() -> Self {
            Self(Arc::new(Mutex::new(
                DateTime::parse_from_rfc3339("2026-03-01T10:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
            )))
        }

        pub(crate) fn advance(&self, by: TimeDelta) {
            let mut now = self.0.lock().unwrap();
            *now += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn limiter(clock: &ManualClock) -> AttemptLimiter<MemoryAttemptStore, ManualClock> {
        AttemptLimiter::new(
            MemoryAttemptStore::new(),
            clock.clone(),
            5,
            Duration::from_secs(15 * 60),
        )
    }

    #[test]
    fn test_sixth_attempt_in_window_is_denied() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);
        let user = UserId::new("u1");

        for expected_remaining in [4, 3, 2, 1, 0] {
            let decision = limiter.can_attempt(&user);
            assert!(decision.allowed);
            assert_eq!(decision.remaining_attempts, expected_remaining);
            assert_eq!(decision.reset_time, None);
            clock.advance(TimeDelta::minutes(1));
        }

        let start = clock.now() - TimeDelta::minutes(5);
        let denied = limiter.can_attempt(&user);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining_attempts, 0);
        assert_eq!(denied.reset_time, Some(start + TimeDelta::minutes(15)));
    }

    #[test]
    fn test_window_expiry_starts_fresh() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);
        let user = UserId::new("u1");

        for _ in 0..5 {
            assert!(limiter.can_attempt(&user).allowed);
        }
        assert!(!limiter.can_attempt(&user).allowed);

        // Exactly at the boundary the window is still open.
        clock.advance(TimeDelta::minutes(15));
        assert!(!limiter.can_attempt(&user).allowed);

        clock.advance(TimeDelta::seconds(1));
        let decision = limiter.can_attempt(&user);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 4);
    }

    #[test]
    fn test_users_are_independent() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);
        let a = UserId::new("a");
        let b = UserId::new("b");

        for _ in 0..5 {
            limiter.can_attempt(&a);
        }
        assert!(!limiter.can_attempt(&a).allowed);
        assert!(limiter.can_attempt(&b).allowed);
        assert_eq!(limiter.store().len(), 2);
    }

    #[test]
    fn test_reset_attempts_clears_record() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);
        let user = UserId::new("u1");

        for _ in 0..6 {
            limiter.can_attempt(&user);
        }
        limiter.reset_attempts(&user);
        assert!(limiter.store().is_empty());

        let decision = limiter.can_attempt(&user);
        assert!(decision.allowed);
        assert_eq!(decision.remaining_attempts, 4);
    }

    #[test]
    fn test_expired_records_are_swept() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);

        for i in 0..1000 {
            limiter.can_attempt(&UserId::new(format!("u{i}")));
        }
        assert_eq!(limiter.store().len(), 1000);

        clock.advance(TimeDelta::days(30));
        assert!(limiter.can_attempt(&UserId::new("late")).allowed);
        assert_eq!(limiter.store().len(), 1);
    }

    #[test]
    fn test_sweep_keeps_open_windows() {
        let clock = ManualClock::new();
        let limiter = limiter(&clock);
        let early = UserId::new("early");
        let recent = UserId::new("recent");

        limiter.can_attempt(&early);
        clock.advance(TimeDelta::minutes(10));
        limiter.can_attempt(&recent);
        clock.advance(TimeDelta::minutes(6));

        let decision = limiter.can_attempt(&recent);
        assert_eq!(decision.remaining_attempts, 3);
        assert_eq!(limiter.store().len(), 1);
    }

    #[test]
    fn test_from_config_uses_configured_maximum() {
        let config = CheckoutConfig {
            max_attempts: 2,
            ..CheckoutConfig::default()
        };
        let limiter = AttemptLimiter::from_config(&config);
        let user = UserId::new("u1");
        assert!(limiter.can_attempt(&user).allowed);
        assert!(limiter.can_attempt(&user).allowed);
        assert!(!limiter.can_attempt(&user).allowed);
    }
}
