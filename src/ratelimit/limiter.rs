//! Core rate limiter implementation.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, trace};

use super::clock::{Clock, SystemClock};
use super::key::LimitKey;
use super::policy::Policy;
use super::record::{Decision, RateRecord};

/// Fixed-window rate limiter shared by every request handler in the process.
///
/// Each `(policy, identifier)` pair owns one [`RateRecord`]: a counter and the
/// instant its window closes. A request opens a window if none is live, is
/// counted while the window has quota left and is rejected otherwise.
/// Rejections never touch the record.
///
/// Fixed windows admit up to twice the quota across a window boundary. That is
/// fine for abuse protection; anything needing exact enforcement should swap
/// the internals of [`RateLimiter::check_at`] for a sliding log or token bucket.
///
/// This struct is thread-safe and can be shared across multiple tasks. The
/// read-modify-write for a key runs under that key's shard lock, so concurrent
/// requests can never both take the last unit of quota.
pub struct RateLimiter {
    /// Live and not-yet-swept windows indexed by key
    records: DashMap<LimitKey, RateRecord>,
    /// Time source
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a new rate limiter driven by the system clock.
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    /// Create a new rate limiter driven by `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: DashMap::new(),
            clock,
        }
    }

    /// Current time according to this limiter's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Check whether `identifier` may make another request under `policy`.
    pub fn check(&self, identifier: &str, policy: &Policy) -> Decision {
        self.check_at(identifier, policy, self.clock.now_ms())
    }

    /// Check `identifier` against `policy` as of `now_ms`.
    pub fn check_at(&self, identifier: &str, policy: &Policy, now_ms: u64) -> Decision {
        let limit = policy.max_requests();
        let key = LimitKey::new(policy.name(), identifier);

        trace!(key = %key, now_ms, "Checking rate limit");

        match self.records.entry(key) {
            Entry::Vacant(vacant) => {
                let record = RateRecord::open(now_ms, policy.window_ms());
                debug!(
                    key = %vacant.key(),
                    limit,
                    reset_at_ms = record.reset_at_ms,
                    "Opening rate limit window"
                );
                vacant.insert(record);
                Decision::allowed(limit, &record)
            }
            Entry::Occupied(mut occupied) => {
                let record = occupied.get_mut();

                if record.is_expired(now_ms) {
                    *record = RateRecord::open(now_ms, policy.window_ms());
                    return Decision::allowed(limit, record);
                }

                if record.count >= limit {
                    let decision = Decision::rejected(limit, record);
                    debug!(
                        key = %occupied.key(),
                        limit,
                        reset_at_ms = decision.reset_at_ms,
                        "Rate limit exceeded"
                    );
                    return decision;
                }

                record.count += 1;
                Decision::allowed(limit, record)
            }
        }
    }

    /// Remove every record whose window closed at or before `now_ms`.
    ///
    /// Returns the number of records removed.
    pub fn sweep(&self, now_ms: u64) -> usize {
        let mut removed = 0;
        self.records.retain(|_, record| {
            let keep = !record.is_expired(now_ms);
            if !keep {
                removed += 1;
            }
            keep
        });

        if removed > 0 {
            debug!(removed, remaining = self.records.len(), "Swept expired rate limit records");
        }
        removed
    }

    /// Sweep against the limiter's own clock.
    pub fn sweep_expired(&self) -> usize {
        self.sweep(self.clock.now_ms())
    }

    /// Snapshot of the record for `identifier` under `policy`, if one is stored.
    ///
    /// The record may be expired but not yet swept.
    pub fn record(&self, identifier: &str, policy: &Policy) -> Option<RateRecord> {
        let key = LimitKey::new(policy.name(), identifier);
        self.records.get(&key).map(|r| *r)
    }

    /// Clear all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.records.clear();
    }

    /// Get the number of stored records, expired ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("records", &self.records.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::ManualClock;

    fn policy(max: u32, window_ms: u64) -> Policy {
        Policy::new("test", max, window_ms).unwrap()
    }

    fn limiter_at(now_ms: u64) -> (RateLimiter, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(now_ms));
        (RateLimiter::with_clock(clock.clone()), clock)
    }

    #[test]
    fn test_rate_limiter_creation() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.len(), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_first_check_creates_record() {
        let (limiter, _clock) = limiter_at(1_000);
        let policy = policy(5, 60_000);

        let decision = limiter.check("10.0.0.1", &policy);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 4);
        assert_eq!(decision.reset_at_ms, 61_000);
        assert_eq!(
            limiter.record("10.0.0.1", &policy),
            Some(RateRecord { count: 1, reset_at_ms: 61_000 })
        );
    }

    #[test]
    fn test_check_increments_within_window() {
        let (limiter, clock) = limiter_at(0);
        let policy = policy(5, 60_000);

        limiter.check("client", &policy);
        clock.advance(10);
        let decision = limiter.check("client", &policy);

        assert!(decision.allowed);
        assert_eq!(decision.remaining, 3);
        // The window is anchored at the first request, not the latest.
        assert_eq!(decision.reset_at_ms, 60_000);
        assert_eq!(limiter.record("client", &policy).unwrap().count, 2);
    }

    #[test]
    fn test_concrete_window_scenario() {
        let (limiter, clock) = limiter_at(0);
        let policy = policy(3, 60_000);

        let remaining: Vec<u32> = (0..3)
            .map(|_| {
                let d = limiter.check("client", &policy);
                assert!(d.allowed);
                d.remaining
            })
            .collect();
        assert_eq!(remaining, vec![2, 1, 0]);

        clock.set(100);
        let rejected = limiter.check("client", &policy);
        assert!(!rejected.allowed);
        assert_eq!(rejected.remaining, 0);
        assert_eq!(rejected.reset_at_ms, 60_000);

        clock.set(60_001);
        let reopened = limiter.check("client", &policy);
        assert!(reopened.allowed);
        assert_eq!(reopened.remaining, 2);
        assert_eq!(reopened.reset_at_ms, 120_001);
    }

    #[test]
    fn test_rejection_does_not_mutate_record() {
        let (limiter, _clock) = limiter_at(0);
        let policy = policy(2, 1_000);

        limiter.check("client", &policy);
        limiter.check("client", &policy);
        let before = limiter.record("client", &policy);

        for _ in 0..7 {
            let decision = limiter.check("client", &policy);
            assert!(!decision.allowed);
            assert_eq!(decision.remaining, 0);
            assert_eq!(decision.reset_at_ms, 1_000);
        }

        assert_eq!(limiter.record("client", &policy), before);
    }

    #[test]
    fn test_window_expires_exactly_at_reset() {
        let (limiter, clock) = limiter_at(0);
        let policy = policy(1, 1_000);

        assert!(limiter.check("client", &policy).allowed);
        clock.set(999);
        assert!(!limiter.check("client", &policy).allowed);

        clock.set(1_000);
        let decision = limiter.check("client", &policy);
        assert!(decision.allowed);
        assert_eq!(decision.reset_at_ms, 2_000);
    }

    #[test]
    fn test_identifiers_have_separate_quota() {
        let (limiter, _clock) = limiter_at(0);
        let policy = policy(2, 60_000);

        limiter.check("a", &policy);
        limiter.check("a", &policy);
        assert!(!limiter.check("a", &policy).allowed);

        let decision = limiter.check("b", &policy);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 1);
    }

    #[test]
    fn test_policies_have_separate_quota() {
        let (limiter, _clock) = limiter_at(0);
        let chat = Policy::new("chat", 1, 60_000).unwrap();
        let api = Policy::new("api", 10, 60_000).unwrap();

        assert!(limiter.check("client", &chat).allowed);
        assert!(!limiter.check("client", &chat).allowed);

        let decision = limiter.check("client", &api);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 9);
        assert_eq!(limiter.len(), 2);
    }

    #[test]
    fn test_sweep_removes_only_expired() {
        let (limiter, clock) = limiter_at(0);
        let short = Policy::new("short", 5, 1_000).unwrap();
        let long = Policy::new("long", 5, 10_000).unwrap();

        limiter.check("a", &short);
        limiter.check("b", &long);
        clock.set(500);
        limiter.check("c", &short);

        // "a" expires at 1_000, "c" at 1_500, "b" at 10_000.
        let c_before = limiter.record("c", &short);
        let b_before = limiter.record("b", &long);
        assert_eq!(c_before, Some(RateRecord { count: 1, reset_at_ms: 1_500 }));
        assert_eq!(b_before, Some(RateRecord { count: 1, reset_at_ms: 10_000 }));

        assert_eq!(limiter.sweep(1_000), 1);
        assert!(limiter.record("a", &short).is_none());
        assert_eq!(limiter.record("c", &short), c_before);
        assert_eq!(limiter.record("b", &long), b_before);

        assert_eq!(limiter.sweep(10_000), 2);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_record_returns_expired_until_swept() {
        let (limiter, clock) = limiter_at(0);
        let policy = policy(5, 1_000);
        limiter.check("client", &policy);

        clock.set(2_000);
        let stale = limiter.record("client", &policy).unwrap();
        assert!(stale.is_expired(clock.now_ms()));

        limiter.sweep_expired();
        assert!(limiter.record("client", &policy).is_none());
    }

    #[test]
    fn test_sweep_empty_table_is_noop() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.sweep(u64::MAX), 0);
        assert!(limiter.is_empty());
    }

    #[test]
    fn test_sweep_expired_uses_clock() {
        let (limiter, clock) = limiter_at(0);
        let policy = policy(5, 100);

        limiter.check("client", &policy);
        assert_eq!(limiter.sweep_expired(), 0);

        clock.advance(100);
        assert_eq!(limiter.sweep_expired(), 1);
    }

    #[test]
    fn test_clear_records() {
        let (limiter, _clock) = limiter_at(0);
        limiter.check("client", &policy(5, 100));
        assert_eq!(limiter.len(), 1);

        limiter.clear();
        assert_eq!(limiter.len(), 0);
    }
}
