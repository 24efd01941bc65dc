//! Consumption trend with linear regression
//!
//! Turns cumulative meter readings into usage so far this month, a raw
//! average daily rate, a regression-based trend rate (kWh/day) and a
//! month-end forecast.

use chrono::{DateTime, TimeZone};
use meterwise_types::Reading;
use serde::Serialize;

use super::month::{days_between, finite_value, month_readings, MonthWindow, MIN_SPAN_DAYS};

/// Degenerate regression denominator (all readings at the same instant)
const MIN_REGRESSION_DENOM: f64 = 1e-9;

/// Trend and forecast for the current month
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendResult {
    /// kWh consumed since the first in-month reading
    pub usage_so_far: f64,
    /// `usage_so_far` divided by days since the first in-month reading
    pub raw_average_daily_rate: f64,
    /// Regression slope (kWh/day), never negative
    pub trend_daily_rate: f64,
    /// Projected month-end usage, never below `usage_so_far`
    pub forecast_usage: f64,
    /// R² of the regression fit (0.0-1.0, 0 when no fit was possible)
    pub fit_quality: f64,
    /// Number of in-month readings used
    pub sample_count: usize,
    pub window: MonthWindow,
}

impl TrendResult {
    /// All-zero trend (no in-month readings)
    pub fn empty(window: MonthWindow) -> Self {
        Self {
            usage_so_far: 0.0,
            raw_average_daily_rate: 0.0,
            trend_daily_rate: 0.0,
            forecast_usage: 0.0,
            fit_quality: 0.0,
            sample_count: 0,
            window,
        }
    }
}

/// Estimate trend and forecast at the reference instant `now`
pub fn estimate_trend<Tz: TimeZone>(readings: &[Reading], now: &DateTime<Tz>) -> TrendResult {
    estimate_trend_in(readings, &MonthWindow::for_instant(now))
}

/// Estimate trend and forecast within an already computed month window
///
/// # Algorithm
/// 1. Keep readings on or after the month start, sorted by time
/// 2. Usage = last value - first value (clamped at 0)
/// 3. Raw rate = usage / days from first reading to now (floored at 1e-6 days)
/// 4. Trend = least-squares slope of cumulative delta vs days since first
///    reading, clamped at 0; raw rate when fewer than 2 points
/// 5. Forecast = usage + trend × days remaining
///
/// # Graceful Degradation
/// - No in-month readings: all zero
/// - Decreasing values (meter reset): deltas clamped, trend stays ≥ 0
pub fn estimate_trend_in(readings: &[Reading], window: &MonthWindow) -> TrendResult {
    let month = month_readings(readings, window);

    let (Some(first), Some(last)) = (month.first(), month.last()) else {
        return TrendResult::empty(*window);
    };

    let first_value = finite_value(first.value);
    let usage_so_far = (finite_value(last.value) - first_value).max(0.0);

    let span_days = days_between(&first.timestamp, &window.now).max(MIN_SPAN_DAYS);
    let raw_average_daily_rate = usage_so_far / span_days;

    let points: Vec<(f64, f64)> = month
        .iter()
        .map(|r| {
            let x = days_between(&first.timestamp, &r.timestamp).max(0.0);
            let y = (finite_value(r.value) - first_value).max(0.0);
            (x, y)
        })
        .collect();

    let fit = linear_regression(&points);
    let trend_daily_rate = match &fit {
        Some(fit) => fit.slope.max(0.0),
        None => raw_average_daily_rate.max(0.0),
    };

    let forecast_usage =
        (usage_so_far + trend_daily_rate * f64::from(window.days_remaining)).max(usage_so_far);

    TrendResult {
        usage_so_far: finite_or_zero(usage_so_far),
        raw_average_daily_rate: finite_or_zero(raw_average_daily_rate),
        trend_daily_rate: finite_or_zero(trend_daily_rate),
        forecast_usage: finite_or_zero(forecast_usage),
        fit_quality: fit.map(|f| f.r_squared.clamp(0.0, 1.0)).unwrap_or(0.0),
        sample_count: month.len(),
        window: *window,
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value.max(0.0)
    } else {
        0.0
    }
}

/// Best-fit line y = slope * x + intercept
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct LinearFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

/// Ordinary least squares with R² calculation
///
/// Returns `None` with fewer than 2 points or when every x is (nearly) equal.
pub(crate) fn linear_regression(points: &[(f64, f64)]) -> Option<LinearFit> {
    if points.len() < 2 {
        return None;
    }

    let n = points.len() as f64;
    let sum_x: f64 = points.iter().map(|p| p.0).sum();
    let sum_y: f64 = points.iter().map(|p| p.1).sum();
    let sum_xx: f64 = points.iter().map(|p| p.0 * p.0).sum();
    let sum_xy: f64 = points.iter().map(|p| p.0 * p.1).sum();

    let denom = n * sum_xx - sum_x * sum_x;
    if !(denom > MIN_REGRESSION_DENOM) {
        return None;
    }

    let slope = (n * sum_xy - sum_x * sum_y) / denom;
    let intercept = (sum_y - slope * sum_x) / n;

    // R² (coefficient of determination)
    let mean_y = sum_y / n;
    let ss_tot: f64 = points.iter().map(|p| (p.1 - mean_y).powi(2)).sum();
    let ss_res: f64 = points
        .iter()
        .map(|p| {
            let predicted = slope * p.0 + intercept;
            (p.1 - predicted).powi(2)
        })
        .sum();

    let r_squared = if ss_tot > 0.0 {
        1.0 - (ss_res / ss_tot)
    } else {
        0.0
    };

    Some(LinearFit {
        slope,
        intercept,
        r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use meterwise_types::ReadingId;

    fn reading(id: u64, ts: DateTime<Utc>, value: f64) -> Reading {
        Reading::new(ReadingId(id), ts, value)
    }

    #[test]
    fn test_regression_perfect_line() {
        let points = vec![(0.0, 1.0), (1.0, 3.0), (2.0, 5.0), (3.0, 7.0)];
        let fit = linear_regression(&points).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-12);
        assert!((fit.intercept - 1.0).abs() < 1e-12);
        assert!((fit.r_squared - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_regression_degenerate() {
        assert!(linear_regression(&[(1.0, 2.0)]).is_none());
        assert!(linear_regression(&[(1.0, 2.0), (1.0, 5.0)]).is_none());
    }

    #[test]
    fn test_single_reading_at_now_is_zero() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 9, 0, 0).unwrap();
        let result = estimate_trend(&[reading(1, now, 4200.0)], &now);

        assert_eq!(result.usage_so_far, 0.0);
        assert_eq!(result.raw_average_daily_rate, 0.0);
        assert_eq!(result.trend_daily_rate, 0.0);
        assert_eq!(result.forecast_usage, 0.0);
        assert_eq!(result.sample_count, 1);
    }

    #[test]
    fn test_readings_before_month_start_ignored() {
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap();
        let last_month = Utc.with_ymd_and_hms(2025, 5, 20, 0, 0, 0).unwrap();
        let result = estimate_trend(&[reading(1, last_month, 100.0)], &now);

        assert_eq!(result, TrendResult::empty(MonthWindow::for_instant(&now)));
        assert_eq!(result.window.days_remaining, 20);
    }

    #[test]
    fn test_unsorted_input_is_sorted() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let now = start + Duration::days(4);
        let readings = vec![
            reading(3, start + Duration::days(4), 140.0),
            reading(1, start, 100.0),
            reading(2, start + Duration::days(2), 120.0),
        ];

        let result = estimate_trend(&readings, &now);
        assert_eq!(result.usage_so_far, 40.0);
        assert!((result.trend_daily_rate - 10.0).abs() < 1e-9);
        assert!((result.fit_quality - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_tied_timestamps_keep_insertion_order() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let later = start + Duration::days(2);

        let readings = vec![
            reading(1, start, 100.0),
            reading(2, later, 120.0),
            reading(3, later, 125.0),
        ];
        let result = estimate_trend(&readings, &later);
        assert_eq!(result.usage_so_far, 25.0);
        assert_eq!(result.sample_count, 3);

        // Same readings, the tie inserted the other way round
        let swapped = vec![
            reading(1, start, 100.0),
            reading(3, later, 125.0),
            reading(2, later, 120.0),
        ];
        let result = estimate_trend(&swapped, &later);
        assert_eq!(result.usage_so_far, 20.0);
    }

    #[test]
    fn test_meter_reset_never_negative() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let now = start + Duration::days(6);
        let readings = vec![
            reading(1, start, 5000.0),
            reading(2, start + Duration::days(2), 5030.0),
            reading(3, start + Duration::days(4), 12.0),
            reading(4, start + Duration::days(6), 20.0),
        ];

        let result = estimate_trend(&readings, &now);
        assert_eq!(result.usage_so_far, 0.0);
        assert!(result.trend_daily_rate >= 0.0);
        assert!(result.forecast_usage >= result.usage_so_far);
        assert!(result.raw_average_daily_rate.is_finite());
    }
}
