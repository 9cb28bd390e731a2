//! Tests for the backoff policy.

use super::*;

fn fixed_backoff() -> ErrorBackoff {
    ErrorBackoff::new(Duration::from_secs(1), Duration::from_secs(16), 2.0).without_jitter()
}

fn streak_of(failures: u32) -> FailureStreak {
    let mut streak = FailureStreak::new();
    for _ in 0..failures {
        streak.record_failure();
    }
    streak
}

#[test]
fn test_default_policy_uses_idle_interval_for_errors() {
    let policy = BackoffPolicy::new(Duration::from_secs(5));

    assert_eq!(policy.idle_delay(), Duration::from_secs(5));
    assert_eq!(policy.error_delay(&streak_of(1)), Duration::from_secs(5));
    assert_eq!(policy.error_delay(&streak_of(50)), Duration::from_secs(5));
}

#[test]
fn test_zero_interval_means_no_wait() {
    let policy = BackoffPolicy::new(Duration::ZERO);

    assert_eq!(policy.idle_delay(), Duration::ZERO);
    assert_eq!(policy.error_delay(&streak_of(3)), Duration::ZERO);
}

#[test]
fn test_error_backoff_escalates_per_failure() {
    let policy = BackoffPolicy::new(Duration::ZERO).with_error_backoff(fixed_backoff());

    assert_eq!(policy.error_delay(&streak_of(1)), Duration::from_secs(1));
    assert_eq!(policy.error_delay(&streak_of(2)), Duration::from_secs(2));
    assert_eq!(policy.error_delay(&streak_of(3)), Duration::from_secs(4));
    assert_eq!(policy.error_delay(&streak_of(5)), Duration::from_secs(16));
    assert_eq!(policy.error_delay(&streak_of(30)), Duration::from_secs(16));
}

#[test]
fn test_error_backoff_never_undercuts_idle_interval() {
    let policy = BackoffPolicy::new(Duration::from_secs(3)).with_error_backoff(fixed_backoff());

    assert_eq!(policy.error_delay(&streak_of(1)), Duration::from_secs(3));
    assert_eq!(policy.error_delay(&streak_of(3)), Duration::from_secs(4));
}

#[test]
fn test_jitter_stays_within_range() {
    let backoff = ErrorBackoff::new(Duration::from_secs(4), Duration::from_secs(4), 2.0)
        .with_jitter_percent(0.25);

    for _ in 0..100 {
        let delay = backoff.calculate_delay(0);
        assert!(delay >= Duration::from_secs(3), "delay too short: {:?}", delay);
        assert!(delay <= Duration::from_secs(5), "delay too long: {:?}", delay);
    }
}

#[test]
fn test_jitter_percent_is_clamped() {
    let backoff = fixed_backoff().with_jitter_percent(3.0);
    assert_eq!(backoff.jitter_percent, 1.0);
    assert!(backoff.use_jitter);

    let backoff = fixed_backoff().with_jitter_percent(0.0);
    assert!(!backoff.use_jitter);
}

#[test]
fn test_failure_streak_reset() {
    let mut streak = streak_of(4);
    assert_eq!(streak.consecutive(), 4);

    streak.reset();
    assert_eq!(streak.consecutive(), 0);
}
