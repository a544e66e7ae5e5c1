use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;

use retroweb_gate::ratelimit::{ManualClock, Policy, RateLimiter};

fn limiter_at(now_ms: u64) -> (Arc<RateLimiter>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(now_ms));
    (Arc::new(RateLimiter::with_clock(clock.clone())), clock)
}

#[test]
fn first_n_calls_admitted_then_rejected() {
    for max in [1u32, 2, 7, 50] {
        let (limiter, _clock) = limiter_at(10_000);
        let policy = Policy::new("api", max, 5_000).unwrap();

        let mut previous = None;
        for _ in 0..max {
            let decision = limiter.check("client", &policy);
            assert!(decision.allowed);
            if let Some(prev) = previous {
                assert_eq!(decision.remaining, prev - 1, "remaining drops by one per admitted call");
            }
            previous = Some(decision.remaining);
        }
        assert_eq!(previous, Some(0));

        let decision = limiter.check("client", &policy);
        assert!(!decision.allowed, "call {} must be rejected", max + 1);
    }
}

#[test]
fn rejected_calls_are_idempotent() {
    let (limiter, clock) = limiter_at(0);
    let policy = Policy::new("api", 3, 60_000).unwrap();
    for _ in 0..3 {
        limiter.check("client", &policy);
    }

    let first = limiter.check("client", &policy);
    for step in 0..8 {
        clock.advance(1_000 * step);
        assert_eq!(limiter.check("client", &policy), first);
    }
}

#[test]
fn window_resets_without_carry_over() {
    let (limiter, clock) = limiter_at(0);
    let policy = Policy::new("api", 4, 1_000).unwrap();

    for _ in 0..10 {
        limiter.check("client", &policy);
    }

    clock.set(5_000);
    let decision = limiter.check("client", &policy);
    assert!(decision.allowed);
    assert_eq!(decision.remaining, 3);
    assert_eq!(decision.reset_at_ms, 6_000);
}

#[test]
fn sweep_does_not_change_next_decision() {
    let policy = Policy::new("api", 2, 1_000).unwrap();

    let (swept, swept_clock) = limiter_at(0);
    let (unswept, unswept_clock) = limiter_at(0);
    for limiter in [&swept, &unswept] {
        limiter.check("a", &policy);
        limiter.check("a", &policy);
    }

    for now in [999, 1_000, 1_001] {
        swept_clock.set(now);
        unswept_clock.set(now);
        swept.sweep(now);
        assert_eq!(swept.check("a", &policy), unswept.check("a", &policy), "at t={}", now);
    }
}

#[test]
fn distinct_identifiers_never_share_quota() {
    let (limiter, _clock) = limiter_at(0);
    let policy = Policy::new("api", 2, 60_000).unwrap();

    for _ in 0..5 {
        limiter.check("a", &policy);
    }
    assert!(!limiter.check("a", &policy).allowed);

    assert!(limiter.check("b", &policy).allowed);
    assert!(limiter.check("b", &policy).allowed);
    assert!(!limiter.check("b", &policy).allowed);
}

#[test]
fn concurrent_checks_never_exceed_quota() {
    let (limiter, _clock) = limiter_at(0);
    let policy = Arc::new(Policy::new("api", 100, 60_000).unwrap());
    let admitted = Arc::new(AtomicU32::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let limiter = limiter.clone();
            let policy = policy.clone();
            let admitted = admitted.clone();
            thread::spawn(move || {
                for _ in 0..50 {
                    if limiter.check("shared", &policy).allowed {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(admitted.load(Ordering::SeqCst), 100);
    assert_eq!(limiter.record("shared", &policy).unwrap().count, 100);
}

#[test]
fn concurrent_sweep_and_check() {
    let (limiter, clock) = limiter_at(0);
    let policy = Arc::new(Policy::new("api", 1_000, 10).unwrap());

    let checker = {
        let limiter = limiter.clone();
        let policy = policy.clone();
        thread::spawn(move || {
            for i in 0..2_000 {
                limiter.check(&format!("client-{}", i % 64), &policy);
            }
        })
    };
    let sweeper = {
        let limiter = limiter.clone();
        thread::spawn(move || {
            for now in 0..200 {
                limiter.sweep(now);
            }
        })
    };

    checker.join().unwrap();
    sweeper.join().unwrap();

    clock.set(1_000);
    limiter.sweep_expired();
    assert!(limiter.is_empty());
}
