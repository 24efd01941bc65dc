//! Usage forecasting engine
//!
//! Pure functions turning cumulative meter readings and a tariff
//! configuration into month-to-date usage, trend, forecast, bill, budget
//! and spike results. Nothing here performs I/O or keeps state: every call
//! takes `(readings, settings, reference instant)` explicitly.

use chrono::{DateTime, TimeZone, Utc};
use meterwise_types::{Reading, Settings, TariffMode};
use serde::Serialize;

use crate::tariff::{compute_bill, estimate_tier_cross_day, kwh_to_next_tier, Bill};

pub mod budget;
pub mod forecasting;
pub mod insights;
pub mod month;
pub mod spikes;
pub mod trends;


pub use budget::{
    daily_target_for_budget, kwh_for_budget, AlertLevel, BudgetStatus, BudgetTarget,
};
pub use forecasting::{
    forecast_band, predicted_usage_what_if, ForecastBand, WhatIfScenario, DEFAULT_BAND_FRACTION,
};
pub use insights::{generate_alerts, Alert};
pub use month::MonthWindow;
pub use spikes::{
    detect_spike, detect_spike_from_rates, interval_rates, IntervalRate, SpikeResult,
    SPIKE_THRESHOLD_PCT,
};
pub use trends::{estimate_trend, TrendResult};

/// Every derived value for one reference instant
#[derive(Debug, Clone, Serialize)]
pub struct UsageReport {
    /// Reference instant of the computation
    pub computed_at: DateTime<Utc>,
    pub tariff_mode: TariffMode,
    pub trend: TrendResult,
    /// Bill for usage so far
    pub current_bill: Bill,
    /// Bill for the month-end forecast
    pub predicted_bill: Bill,
    pub band: ForecastBand,
    /// kWh left in the current tier (None = already in the last tier)
    pub kwh_to_next_tier: Option<f64>,
    /// Estimated day of month the next tier starts
    pub tier_cross_day: Option<u32>,
    pub budget: BudgetTarget,
    pub budget_status: BudgetStatus,
    pub spike: SpikeResult,
    pub intervals: Vec<IntervalRate>,
    pub alerts: Vec<Alert>,
}

impl UsageReport {
    /// Compute the report at reference instant `now` (sync function)
    ///
    /// O(n log n) in the number of readings (one sort per pass); cheap
    /// enough to recompute on every reading or settings change.
    pub fn compute<Tz: TimeZone>(
        readings: &[Reading],
        settings: &Settings,
        now: &DateTime<Tz>,
    ) -> Self {
        let window = MonthWindow::for_instant(now);
        let schedule = &settings.tariffs;
        let mode = settings.tariff_mode;
        let goal = settings.budget();

        let trend = trends::estimate_trend_in(readings, &window);
        let current_bill = compute_bill(trend.usage_so_far, schedule, mode);
        let predicted_bill = compute_bill(trend.forecast_usage, schedule, mode);
        let band = forecast_band(trend.forecast_usage, schedule, mode, DEFAULT_BAND_FRACTION);

        let to_next = kwh_to_next_tier(trend.usage_so_far, schedule);
        let tier_cross_day = estimate_tier_cross_day(
            trend.trend_daily_rate,
            to_next,
            window.days_elapsed,
            window.days_in_month,
        );

        let budget = daily_target_for_budget(
            goal,
            schedule,
            window.days_in_month,
            trend.usage_so_far,
            window.days_elapsed,
        );
        let budget_status =
            BudgetStatus::evaluate(current_bill.amount, predicted_bill.amount, goal);

        let intervals = spikes::interval_rates_in(readings, &window);
        let rates: Vec<f64> = intervals.iter().map(|i| i.rate).collect();
        let spike = detect_spike_from_rates(&rates);

        let mut report = Self {
            computed_at: window.now,
            tariff_mode: mode,
            trend,
            current_bill,
            predicted_bill,
            band,
            kwh_to_next_tier: to_next,
            tier_cross_day,
            budget,
            budget_status,
            spike,
            intervals,
            alerts: Vec::new(),
        };
        report.alerts = generate_alerts(&report, goal);

        tracing::debug!(
            usage = report.trend.usage_so_far,
            trend = report.trend.trend_daily_rate,
            forecast = report.trend.forecast_usage,
            alerts = report.alerts.len(),
            "Usage report computed"
        );

        report
    }

    /// Report for the current local time
    pub fn compute_now(readings: &[Reading], settings: &Settings) -> Self {
        Self::compute(readings, settings, &chrono::Local::now())
    }

    /// Month window of the report
    pub fn window(&self) -> &MonthWindow {
        &self.trend.window
    }

    /// What-if simulation on top of this report
    pub fn what_if(&self, settings: &Settings, reduction_pct: f64) -> WhatIfScenario {
        WhatIfScenario::simulate(&self.trend, &settings.tariffs, self.tariff_mode, reduction_pct)
    }
}
