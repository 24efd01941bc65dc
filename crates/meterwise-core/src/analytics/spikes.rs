//! Spike detection on short-term consumption rate
//!
//! Compares the consumption rate of the most recent reading interval with a
//! short rolling baseline (the mean of up to 3 preceding intervals).

use chrono::{DateTime, TimeZone, Utc};
use meterwise_types::Reading;
use serde::Serialize;

use super::month::{days_between, finite_value, month_readings, MonthWindow, MIN_SPAN_DAYS};

/// Minimum rise over baseline (percent) flagged as a spike
pub const SPIKE_THRESHOLD_PCT: f64 = 25.0;

/// Number of intervals preceding the last one averaged into the baseline
pub const BASELINE_WINDOW: usize = 3;

/// Consumption between two consecutive in-month readings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntervalRate {
    /// Timestamp of the later reading
    pub at: DateTime<Utc>,
    pub delta_kwh: f64,
    pub delta_days: f64,
    /// kWh/day
    pub rate: f64,
}

/// Outcome of spike detection
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SpikeResult {
    pub is_spike: bool,
    /// Rate of the most recent interval (kWh/day)
    pub last_rate: f64,
    /// Mean rate of the preceding intervals (kWh/day)
    pub baseline_rate: f64,
    /// Change of `last_rate` relative to `baseline_rate`
    pub percent_change: f64,
}

impl SpikeResult {
    /// No spike, all rates zero
    pub fn none() -> Self {
        Self::default()
    }

    /// Format change as percentage with sign
    pub fn format_change(&self) -> String {
        let sign = if self.percent_change >= 0.0 { "+" } else { "" };
        format!("{}{:.0}%", sign, self.percent_change)
    }
}

/// Per-interval rates for the month containing `now`
pub fn interval_rates<Tz: TimeZone>(readings: &[Reading], now: &DateTime<Tz>) -> Vec<IntervalRate> {
    interval_rates_in(readings, &MonthWindow::for_instant(now))
}

/// Per-interval rates within a month window
///
/// Deltas are clamped at 0 kWh and spans floored at 1e-6 days.
pub fn interval_rates_in(readings: &[Reading], window: &MonthWindow) -> Vec<IntervalRate> {
    month_readings(readings, window)
        .windows(2)
        .map(|pair| {
            let (prev, curr) = (pair[0], pair[1]);
            let delta_kwh = (finite_value(curr.value) - finite_value(prev.value)).max(0.0);
            let delta_days = days_between(&prev.timestamp, &curr.timestamp).max(MIN_SPAN_DAYS);
            IntervalRate {
                at: curr.timestamp,
                delta_kwh,
                delta_days,
                rate: delta_kwh / delta_days,
            }
        })
        .collect()
}

/// Detect a spike in the month containing `now`
pub fn detect_spike<Tz: TimeZone>(readings: &[Reading], now: &DateTime<Tz>) -> SpikeResult {
    detect_spike_in(readings, &MonthWindow::for_instant(now))
}

/// Detect a spike within a month window
pub fn detect_spike_in(readings: &[Reading], window: &MonthWindow) -> SpikeResult {
    let rates: Vec<f64> = interval_rates_in(readings, window)
        .iter()
        .map(|i| i.rate)
        .collect();
    detect_spike_from_rates(&rates)
}

/// Spike decision on a chronological series of interval rates
///
/// # Algorithm
/// - last = final rate
/// - baseline = mean of up to [`BASELINE_WINDOW`] rates before it
///   (the last rate itself when there are none)
/// - change = (last - baseline) / baseline × 100; 100 when the baseline is 0
///   and the last rate is positive; 0 otherwise
/// - spike when change ≥ [`SPIKE_THRESHOLD_PCT`]
pub fn detect_spike_from_rates(rates: &[f64]) -> SpikeResult {
    let Some((&last_rate, previous)) = rates.split_last() else {
        return SpikeResult::none();
    };

    let recent = &previous[previous.len().saturating_sub(BASELINE_WINDOW)..];
    let baseline_rate = if recent.is_empty() {
        last_rate
    } else {
        recent.iter().sum::<f64>() / recent.len() as f64
    };

    let percent_change = if baseline_rate > 0.0 {
        (last_rate - baseline_rate) / baseline_rate * 100.0
    } else if last_rate > 0.0 {
        100.0
    } else {
        0.0
    };

    SpikeResult {
        is_spike: percent_change >= SPIKE_THRESHOLD_PCT,
        last_rate,
        baseline_rate,
        percent_change,
    }
}
