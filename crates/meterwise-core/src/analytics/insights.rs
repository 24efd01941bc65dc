//! Rule-based alerts derived from a usage report
//!
//! Feeds both the status display and the coach prompt.

use serde::Serialize;

use super::UsageReport;

/// Alert raised by a report
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Alert {
    /// Predicted bill above the monthly goal
    ProjectedOverage {
        predicted: f64,
        goal: f64,
        overage: f64,
        currency: String,
    },
    /// Usage expected to enter a more expensive tier this month
    TierCrossing { day: u32, kwh_to_next_tier: f64 },
    /// Last interval rate well above the rolling baseline
    UsageSpike {
        last_rate: f64,
        baseline_rate: f64,
        percent_change: f64,
    },
    /// Current pace above the daily target that keeps the goal
    OverDailyTarget { trend: f64, daily_target: f64 },
}

impl Alert {
    /// One-line message for display
    pub fn message(&self) -> String {
        match self {
            Alert::ProjectedOverage {
                predicted,
                goal,
                overage,
                currency,
            } => format!(
                "Predicted bill {:.2} {} exceeds your goal of {:.2} {} by {:.2}.",
                predicted, currency, goal, currency, overage
            ),
            Alert::TierCrossing {
                day,
                kwh_to_next_tier,
            } => format!(
                "At this pace you enter the next price tier around day {} ({:.0} kWh left).",
                day, kwh_to_next_tier
            ),
            Alert::UsageSpike {
                last_rate,
                baseline_rate,
                percent_change,
            } => format!(
                "Usage spike: {:.2} kWh/day vs {:.2} kWh/day baseline (+{:.0}%).",
                last_rate, baseline_rate, percent_change
            ),
            Alert::OverDailyTarget {
                trend,
                daily_target,
            } => format!(
                "Current pace {:.2} kWh/day is above your daily target of {:.2} kWh/day.",
                trend, daily_target
            ),
        }
    }

    /// Icon representation for terminal display
    pub fn icon(&self) -> &'static str {
        match self {
            Alert::ProjectedOverage { .. } => "💸",
            Alert::TierCrossing { .. } => "📈",
            Alert::UsageSpike { .. } => "⚡",
            Alert::OverDailyTarget { .. } => "⚠️",
        }
    }
}

/// Generate alerts for a report against the monthly `goal`
///
/// Detects:
/// - Projected overage (predicted bill > goal > 0)
/// - Tier crossing estimated within the month
/// - Usage spike
/// - Trend above a positive daily target
pub fn generate_alerts(report: &UsageReport, goal: f64) -> Vec<Alert> {
    let mut alerts = Vec::new();

    if goal.is_finite() && goal > 0.0 && report.predicted_bill.amount > goal {
        alerts.push(Alert::ProjectedOverage {
            predicted: report.predicted_bill.amount,
            goal,
            overage: report.predicted_bill.amount - goal,
            currency: report.predicted_bill.currency.clone(),
        });
    }

    if let (Some(day), Some(kwh_to_next_tier)) = (report.tier_cross_day, report.kwh_to_next_tier) {
        alerts.push(Alert::TierCrossing {
            day,
            kwh_to_next_tier,
        });
    }

    if report.spike.is_spike {
        alerts.push(Alert::UsageSpike {
            last_rate: report.spike.last_rate,
            baseline_rate: report.spike.baseline_rate,
            percent_change: report.spike.percent_change,
        });
    }

    let target = report.budget.daily_target;
    if target > 0.0 && report.trend.trend_daily_rate > target {
        alerts.push(Alert::OverDailyTarget {
            trend: report.trend.trend_daily_rate,
            daily_target: target,
        });
    }

    alerts
}
