//! Property-based tests using quickcheck

use chrono::{Duration, TimeZone, Utc};
use commodity_monitor::{
    config::SyntheticConfig,
    data::PriceObservation,
    history::{SlidingHistory, DEFAULT_HISTORY_CAPACITY},
    synthetic::RandomWalk,
};
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

fn observation(i: usize, price: f64) -> PriceObservation {
    let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    PriceObservation::new(price, base + Duration::seconds(i as i64))
}

// Property: the window keeps exactly the most recent observations, in order
#[quickcheck]
fn prop_history_keeps_last_hundred_in_order(extra: u16) -> bool {
    let total = DEFAULT_HISTORY_CAPACITY + 1 + (extra as usize % 400);
    let mut history = SlidingHistory::new();
    for i in 0..total {
        history.append(observation(i, i as f64));
    }

    let retained: Vec<f64> = history.iter().map(|o| o.price).collect();
    let expected: Vec<f64> = (total - DEFAULT_HISTORY_CAPACITY..total).map(|i| i as f64).collect();
    history.len() == DEFAULT_HISTORY_CAPACITY && retained == expected
}

// Property: length never exceeds capacity, whatever the capacity
#[quickcheck]
fn prop_history_length_bounded(capacity: u8, appends: u16) -> bool {
    let mut history = SlidingHistory::with_capacity(capacity as usize);
    for i in 0..appends as usize {
        history.append(observation(i, 8500.0));
    }
    history.len() <= history.capacity() && history.len() == (appends as usize).min(history.capacity())
}

// Property: statistics never panic and are absent below two samples
#[quickcheck]
fn prop_statistics_total(prices: Vec<f64>) -> TestResult {
    if prices.iter().any(|p| !p.is_finite()) {
        return TestResult::discard();
    }

    let mut history = SlidingHistory::new();
    for (i, price) in prices.iter().enumerate() {
        history.append(observation(i, *price));
    }

    match history.statistics() {
        None => TestResult::from_bool(history.len() < 2),
        Some(stats) => TestResult::from_bool(
            history.len() >= 2
                && stats.count == history.len()
                && stats.low <= stats.high
                && !stats.change_percent.is_nan(),
        ),
    }
}

// Property: the high and low bracket every retained price
#[quickcheck]
fn prop_statistics_bracket_window(prices: Vec<u16>) -> TestResult {
    if prices.len() < 2 {
        return TestResult::discard();
    }

    let mut history = SlidingHistory::new();
    for (i, price) in prices.iter().enumerate() {
        history.append(observation(i, *price as f64 + 1.0));
    }
    let stats = history.statistics().unwrap();

    let bracketed = history.iter().all(|o| o.price <= stats.high && o.price >= stats.low);
    TestResult::from_bool(bracketed)
}

// Property: the same seed always yields the same walk
#[quickcheck]
fn prop_seeded_walk_is_deterministic(seed: u64) -> bool {
    let config = SyntheticConfig {
        seed: Some(seed),
        ..SyntheticConfig::default()
    };
    let mut a = RandomWalk::new(&config).unwrap();
    let mut b = RandomWalk::new(&config).unwrap();
    (0..20).all(|_| a.step() == b.step())
}
