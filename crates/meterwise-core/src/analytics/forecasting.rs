//! Derived forecast views: uncertainty band and what-if simulation
//!
//! Both take the point forecast from [`super::trends`] and run it back
//! through tariff billing.

use meterwise_types::{TariffMode, TariffSchedule};
use serde::Serialize;

use super::trends::TrendResult;
use crate::tariff::{compute_bill, round2, sanitize_kwh, Bill};

/// Default half-width of the forecast band (±10%)
pub const DEFAULT_BAND_FRACTION: f64 = 0.10;

/// Low/high bill range around the point forecast
///
/// Display-only: a fixed percentage, not derived from data variance.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ForecastBand {
    pub low_usage: f64,
    pub high_usage: f64,
    pub low: Bill,
    pub high: Bill,
}

/// Bill range for `forecast_usage × (1 ± band_fraction)`
pub fn forecast_band(
    forecast_usage: f64,
    schedule: &TariffSchedule,
    mode: TariffMode,
    band_fraction: f64,
) -> ForecastBand {
    let usage = sanitize_kwh(forecast_usage);
    let fraction = sanitize_kwh(band_fraction);

    let low_usage = (usage * (1.0 - fraction)).max(0.0);
    let high_usage = usage * (1.0 + fraction);

    ForecastBand {
        low_usage,
        high_usage,
        low: compute_bill(low_usage, schedule, mode),
        high: compute_bill(high_usage, schedule, mode),
    }
}

/// Month-end usage if consumption drops by `reduction_pct` for the rest of the month
///
/// `reduction_pct` is clamped to 0-100.
pub fn predicted_usage_what_if(
    usage_so_far: f64,
    trend_daily_rate: f64,
    days_remaining: u32,
    reduction_pct: f64,
) -> f64 {
    let pct = if reduction_pct.is_finite() {
        reduction_pct.clamp(0.0, 100.0)
    } else {
        0.0
    };
    let factor = 1.0 - pct / 100.0;
    let projected = usage_so_far + trend_daily_rate * f64::from(days_remaining) * factor;

    if projected.is_finite() {
        projected.max(0.0)
    } else {
        0.0
    }
}

/// What-if scenario compared with the unreduced forecast
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhatIfScenario {
    pub reduction_pct: f64,
    pub predicted_usage: f64,
    pub bill: Bill,
    /// Bill of the unreduced forecast
    pub baseline_bill: Bill,
    /// `baseline_bill - bill`, never negative
    pub savings: f64,
}

impl WhatIfScenario {
    pub fn simulate(
        trend: &TrendResult,
        schedule: &TariffSchedule,
        mode: TariffMode,
        reduction_pct: f64,
    ) -> Self {
        let predicted_usage = predicted_usage_what_if(
            trend.usage_so_far,
            trend.trend_daily_rate,
            trend.window.days_remaining,
            reduction_pct,
        );
        let bill = compute_bill(predicted_usage, schedule, mode);
        let baseline_bill = compute_bill(trend.forecast_usage, schedule, mode);
        let savings = round2((baseline_bill.amount - bill.amount).max(0.0));

        Self {
            reduction_pct: reduction_pct.clamp(0.0, 100.0),
            predicted_usage,
            bill,
            baseline_bill,
            savings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::month::MonthWindow;
    use crate::tariff::preset;
    use chrono::{TimeZone, Utc};
    use meterwise_types::TariffTier;

    #[test]
    fn test_band_ten_percent() {
        let schedule = preset("US").unwrap();
        let band = forecast_band(400.0, &schedule, TariffMode::Progressive, DEFAULT_BAND_FRACTION);

        assert!((band.low_usage - 360.0).abs() < 1e-9);
        assert!((band.high_usage - 440.0).abs() < 1e-9);
        assert_eq!(band.low.amount, 64.8);
        assert_eq!(band.high.amount, 79.2);
        assert_eq!(band.low.currency, "USD");
    }

    #[test]
    fn test_band_respects_mode() {
        let schedule = TariffSchedule::new(
            "MAD",
            vec![TariffTier::bounded(100.0, 0.90), TariffTier::unbounded(1.70)],
        );
        let progressive = forecast_band(150.0, &schedule, TariffMode::Progressive, 0.1);
        let whole = forecast_band(150.0, &schedule, TariffMode::WholeTier, 0.1);
        assert!(whole.high.amount > progressive.high.amount);
    }

    #[test]
    fn test_band_negative_forecast() {
        let schedule = preset("US").unwrap();
        let band = forecast_band(-50.0, &schedule, TariffMode::Progressive, 0.1);
        assert_eq!(band.low_usage, 0.0);
        assert_eq!(band.high_usage, 0.0);
        assert_eq!(band.high.amount, 0.0);
    }

    #[test]
    fn test_what_if_reduction() {
        // 200 used, 10/day for 15 days, cut by 20% → 200 + 120
        assert!((predicted_usage_what_if(200.0, 10.0, 15, 20.0) - 320.0).abs() < 1e-9);
        // No reduction equals the plain forecast
        assert!((predicted_usage_what_if(200.0, 10.0, 15, 0.0) - 350.0).abs() < 1e-9);
        // Clamped percentages
        assert!((predicted_usage_what_if(200.0, 10.0, 15, 150.0) - 200.0).abs() < 1e-9);
        assert!((predicted_usage_what_if(200.0, 10.0, 15, -30.0) - 350.0).abs() < 1e-9);
    }

    #[test]
    fn test_what_if_scenario_savings() {
        let now = Utc.with_ymd_and_hms(2025, 4, 15, 0, 0, 0).unwrap();
        let window = MonthWindow::for_instant(&now);
        let trend = TrendResult {
            usage_so_far: 200.0,
            raw_average_daily_rate: 10.0,
            trend_daily_rate: 10.0,
            forecast_usage: 350.0,
            fit_quality: 1.0,
            sample_count: 5,
            window,
        };
        let schedule = preset("US").unwrap();

        let scenario = WhatIfScenario::simulate(&trend, &schedule, TariffMode::Progressive, 50.0);
        assert!((scenario.predicted_usage - 275.0).abs() < 1e-9);
        assert_eq!(scenario.baseline_bill.amount, 63.0);
        assert_eq!(scenario.bill.amount, 49.5);
        assert_eq!(scenario.savings, 13.5);
    }
}
