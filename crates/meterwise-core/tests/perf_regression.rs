//! Performance regression tests
//!
//! The report is recomputed after every reading or settings change, so it
//! has to stay cheap even for users who log several readings a day.
//!
//! Run with:
//! ```bash
//! cargo test --test perf_regression --release
//! ```

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use meterwise_core::analytics::kwh_for_budget;
use meterwise_core::tariff::preset;
use meterwise_core::{ReadingStore, UsageReport};
use meterwise_types::{Reading, ReadingId, Settings};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Performance targets (debug builds, generous margins)
mod targets {
    use std::time::Duration;

    /// One report over a month of hourly readings
    pub const REPORT_720_MAX: Duration = Duration::from_millis(50);

    /// Report time should scale roughly linearly (n log n)
    pub const REPORT_LINEAR_FACTOR: u128 = 30;

    /// 1000 budget inversions
    pub const BUDGET_1000_MAX: Duration = Duration::from_millis(200);

    /// Opening a store with a year of daily readings
    pub const STORE_OPEN_MAX: Duration = Duration::from_millis(500);
}

fn hourly_readings(count: usize) -> Vec<Reading> {
    let start = Utc.with_ymd_and_hms(2025, 7, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            Reading::new(
                ReadingId(i as u64 + 1),
                start + ChronoDuration::minutes(i as i64 * 60 * 720 / count as i64),
                20_000.0 + i as f64 * 0.5,
            )
        })
        .collect()
}

fn settings() -> Settings {
    Settings {
        tariffs: preset("MA").unwrap(),
        goal: 300.0,
        ..Settings::default()
    }
}

fn time_report(readings: &[Reading]) -> Duration {
    let settings = settings();
    let now = Utc.with_ymd_and_hms(2025, 7, 31, 12, 0, 0).unwrap();

    // Warm-up
    let _ = UsageReport::compute(readings, &settings, &now);

    let start = Instant::now();
    let report = UsageReport::compute(readings, &settings, &now);
    let elapsed = start.elapsed();

    assert!(report.trend.sample_count > 0);
    elapsed
}

#[test]
fn test_report_month_of_hourly_readings() {
    let readings = hourly_readings(720);
    let elapsed = time_report(&readings);

    eprintln!("Report over 720 readings: {:?}", elapsed);
    assert!(
        elapsed < targets::REPORT_720_MAX,
        "Report took {:?}, target {:?}",
        elapsed,
        targets::REPORT_720_MAX
    );
}

#[test]
fn test_report_scales_linearly() {
    let small = time_report(&hourly_readings(100)).as_micros().max(1);
    let large = time_report(&hourly_readings(1000)).as_micros().max(1);

    eprintln!("100 readings: {}µs, 1000 readings: {}µs", small, large);

    // 10x the input; allow noise on tiny timings
    assert!(
        large <= small * targets::REPORT_LINEAR_FACTOR || large < 5_000,
        "Report scaling looks super-linear: {}µs -> {}µs",
        small,
        large
    );
}

#[test]
fn test_budget_inversion_speed() {
    let schedule = preset("MA").unwrap();

    let start = Instant::now();
    let mut total = 0.0;
    for i in 0..1000 {
        total += kwh_for_budget(50.0 + i as f64, &schedule);
    }
    let elapsed = start.elapsed();

    assert!(total > 0.0);
    assert!(
        elapsed < targets::BUDGET_1000_MAX,
        "1000 inversions took {:?}",
        elapsed
    );
}

#[tokio::test]
async fn test_store_open_with_a_year_of_readings() {
    let dir = TempDir::new().unwrap();
    {
        let (store, _) = ReadingStore::open(dir.path().to_path_buf()).await;
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 8, 0, 0).unwrap();
        for day in 0..365 {
            store
                .add_reading(1000.0 + day as f64 * 11.0, start + ChronoDuration::days(day))
                .unwrap();
        }
    }

    let start = Instant::now();
    let (store, report) = ReadingStore::open(dir.path().to_path_buf()).await;
    let elapsed = start.elapsed();

    eprintln!("Store open (365 readings): {:?}", elapsed);
    assert_eq!(report.reading_count, 365);
    assert_eq!(store.reading_count(), 365);
    assert!(
        elapsed < targets::STORE_OPEN_MAX,
        "Store open took {:?}, target {:?}",
        elapsed,
        targets::STORE_OPEN_MAX
    );
}
