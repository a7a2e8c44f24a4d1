use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use servo_core::SampleBuffer;
use servo_traits::clock::test_clock::ManualClock;

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

#[test]
fn empty_buffer_has_no_statistics() {
    let mut buf = SampleBuffer::new(10);
    assert_eq!(buf.statistics(), None);
    buf.push(1.0, 1.0, Some(0.0));
    buf.clear();
    assert!(buf.is_empty());
    assert_eq!(buf.statistics(), None);
}

#[test]
fn statistics_over_mixed_errors() {
    let mut buf = SampleBuffer::new(10);
    buf.push(10.0, 9.0, Some(0.0));
    buf.push(10.0, 11.0, Some(1.0));
    buf.push(10.0, 10.0, Some(2.0));
    let stats = buf.statistics().unwrap();
    assert_eq!(stats.count, 3);
    assert!(approx(stats.avg_error, 0.0));
    assert!(approx(stats.max_abs_error, 1.0));
    assert!(approx(stats.std_error, (2.0f64 / 3.0).sqrt()));
}

#[test]
fn error_is_commanded_minus_feedback() {
    let mut buf = SampleBuffer::new(2);
    let s = buf.push(90.0, 87.5, Some(5.0));
    assert!(approx(s.error, 2.5));
    assert!(approx(s.timestamp, 5.0));
}

#[test]
fn timestamps_come_from_the_clock() {
    let clock = ManualClock::starting_at(1_000.0);
    let mut buf = SampleBuffer::with_clock(4, Arc::new(clock.clone()));
    let a = buf.push(1.0, 0.0, None);
    clock.advance(Duration::from_millis(250));
    let b = buf.push(1.0, 0.0, None);
    assert!(approx(a.timestamp, 1_000.0));
    assert!(approx(b.timestamp, 1_000.25));
}

#[test]
fn sequence_survives_eviction_and_restarts_on_clear() {
    let mut buf = SampleBuffer::new(2);
    for i in 0..5 {
        buf.push(f64::from(i), 0.0, Some(0.0));
    }
    let seqs: Vec<u64> = buf.iter().map(|s| s.sequence).collect();
    assert_eq!(seqs, vec![4, 5]);
    buf.clear();
    assert_eq!(buf.push(0.0, 0.0, Some(0.0)).sequence, 1);
}

proptest! {
    #[test]
    fn length_never_exceeds_capacity(cap in 1usize..64, n in 0usize..300) {
        let mut buf = SampleBuffer::new(cap);
        for i in 0..n {
            buf.push(i as f64, 0.0, Some(0.0));
            prop_assert!(buf.len() <= cap);
        }
        prop_assert_eq!(buf.len(), n.min(cap));
    }

    #[test]
    fn eviction_keeps_newest_in_order(cap in 1usize..32, n in 1usize..100) {
        let mut buf = SampleBuffer::new(cap);
        for i in 0..n {
            buf.push(i as f64, 0.0, Some(0.0));
        }
        let kept: Vec<f64> = buf.iter().map(|s| s.commanded_angle).collect();
        let expected: Vec<f64> = (n.saturating_sub(cap)..n).map(|i| i as f64).collect();
        prop_assert_eq!(kept, expected);
    }

    #[test]
    fn cached_statistics_match_fresh(errors in proptest::collection::vec(-90.0f64..90.0, 1..50)) {
        let mut buf = SampleBuffer::new(64);
        for e in &errors {
            buf.push(*e, 0.0, Some(0.0));
        }
        let first = buf.statistics().unwrap();
        prop_assert_eq!(buf.statistics().unwrap(), first);
        let mean = errors.iter().sum::<f64>() / errors.len() as f64;
        prop_assert!((first.avg_error - mean).abs() < 1e-9);
        prop_assert!(first.std_error >= 0.0);
    }
}
