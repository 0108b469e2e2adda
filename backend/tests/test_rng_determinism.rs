//! Tests for deterministic RNG
//!
//! CRITICAL: Determinism is sacred. Same seed MUST produce same sequence.

use mci_simulator_core_rs::RngManager;
use proptest::prelude::*;

#[test]
fn test_rng_remembers_seed() {
    let rng = RngManager::new(12345);
    assert_eq!(rng.seed(), 12345);
}

#[test]
fn test_rng_next_deterministic() {
    let mut rng1 = RngManager::new(12345);
    let mut rng2 = RngManager::new(12345);

    for _ in 0..100 {
        assert_eq!(rng1.next(), rng2.next(), "RNG not deterministic!");
    }
}

#[test]
fn test_rng_different_seeds_different_sequences() {
    let mut rng1 = RngManager::new(12345);
    let mut rng2 = RngManager::new(54321);

    let a: Vec<u64> = (0..4).map(|_| rng1.next()).collect();
    let b: Vec<u64> = (0..4).map(|_| rng2.next()).collect();
    assert_ne!(a, b, "Different seeds should produce different values");
}

#[test]
fn test_derived_streams_do_not_consume_parent() {
    let mut parent = RngManager::new(7);
    let mut untouched = RngManager::new(7);

    let mut child = parent.derive(1);
    let _ = child.next();

    assert_eq!(parent.next(), untouched.next());
}

#[test]
fn test_derived_streams_differ() {
    let base = RngManager::new(7);
    let mut a = base.derive(1);
    let mut b = base.derive(2);
    assert_ne!(a.next(), b.next());
}

#[test]
fn test_choose_weighted_respects_zero_weights() {
    let mut rng = RngManager::new(99);
    for _ in 0..1000 {
        let i = rng.choose_weighted(&[0.0, 1.0, 0.0, 3.0]).unwrap();
        assert!(i == 1 || i == 3);
    }
    assert_eq!(rng.choose_weighted(&[]), None);
    assert_eq!(rng.choose_weighted(&[0.0, 0.0]), None);
}

#[test]
fn test_choose_weighted_matches_triage_mix() {
    let mut rng = RngManager::new(2024);
    let mut counts = [0u32; 4];
    for _ in 0..20_000 {
        counts[rng.choose_weighted(&[0.25, 0.40, 0.30, 0.05]).unwrap()] += 1;
    }
    let expected = [0.25, 0.40, 0.30, 0.05];
    for (count, p) in counts.iter().zip(expected) {
        let observed = *count as f64 / 20_000.0;
        assert!((observed - p).abs() < 0.02, "observed {} expected {}", observed, p);
    }
}

#[test]
fn test_normal_sample_moments() {
    let mut rng = RngManager::new(5);
    let samples: Vec<f64> = (0..20_000).map(|_| rng.normal(10.0, 2.0)).collect();
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / samples.len() as f64;
    assert!((mean - 10.0).abs() < 0.1);
    assert!((var.sqrt() - 2.0).abs() < 0.1);
}

#[test]
fn test_index_on_empty_collection() {
    let mut rng = RngManager::new(1);
    assert_eq!(rng.index(0), None);
    assert_eq!(rng.index(1), Some(0));
}

proptest! {
    #[test]
    fn prop_uniform_stays_in_interval(seed in any::<u64>(), low in -100.0f64..100.0, width in 0.0f64..50.0) {
        let mut rng = RngManager::new(seed);
        for _ in 0..32 {
            let v = rng.uniform(low, low + width);
            prop_assert!(v >= low);
            prop_assert!(width == 0.0 || v < low + width);
        }
    }

    #[test]
    fn prop_range_inclusive_hits_bounds_only(seed in any::<u64>(), v in 0i64..5) {
        let mut rng = RngManager::new(seed);
        for _ in 0..32 {
            let x = rng.range_inclusive(-v, v);
            prop_assert!(x.is_some_and(|x| (-v..=v).contains(&x)));
        }
    }

    #[test]
    fn prop_empty_range_is_none(seed in any::<u64>(), min in -50i64..50, gap in 0i64..10) {
        let mut rng = RngManager::new(seed);
        prop_assert_eq!(rng.range(min, min - gap), None);
        prop_assert_eq!(rng.range_inclusive(min, min - gap - 1), None);
    }
}
