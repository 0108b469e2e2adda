//! Tests for SimClock

use mci_simulator_core_rs::core::time::DEFAULT_HORIZON_MINUTES;
use mci_simulator_core_rs::SimClock;

#[test]
fn test_clock_starts_at_minute_zero() {
    let clock = SimClock::new(180);
    assert_eq!(clock.current_minute(), 0);
    assert_eq!(clock.horizon(), 180);
    assert!(!clock.is_expired());
}

#[test]
fn test_advance_minute() {
    let mut clock = SimClock::new(10);

    clock.advance();
    assert_eq!(clock.current_minute(), 1);

    clock.advance();
    assert_eq!(clock.current_minute(), 2);
}

#[test]
fn test_expires_exactly_at_horizon() {
    let mut clock = SimClock::new(3);

    for _ in 0..2 {
        clock.advance();
    }
    assert!(!clock.is_expired());

    clock.advance();
    assert_eq!(clock.current_minute(), 3);
    assert!(clock.is_expired());
}

#[test]
fn test_elapsed_fraction() {
    let mut clock = SimClock::new(4);
    assert_eq!(clock.elapsed_fraction(), 0.0);

    clock.advance();
    assert_eq!(clock.elapsed_fraction(), 0.25);

    for _ in 0..10 {
        clock.advance();
    }
    // Clamped once past the horizon
    assert_eq!(clock.elapsed_fraction(), 1.0);
}

#[test]
fn test_zero_horizon_is_already_expired() {
    let clock = SimClock::new(0);
    assert!(clock.is_expired());
    assert_eq!(clock.elapsed_fraction(), 1.0);
}

#[test]
fn test_default_horizon() {
    let clock = SimClock::default();
    assert_eq!(clock.horizon(), DEFAULT_HORIZON_MINUTES);
    assert_eq!(DEFAULT_HORIZON_MINUTES, 180);
}
