//! Budget inversion and budget alerts
//!
//! Finds how many kWh a monetary budget buys under progressive billing and
//! turns it into a daily allowance for the rest of the month.

use meterwise_types::TariffSchedule;
use serde::Serialize;

use crate::tariff::{bill_progressive, round2, sanitize_kwh};

/// Upper end of the bisection range, above any realistic monthly usage
pub const BUDGET_SEARCH_UPPER_KWH: f64 = 100_000.0;

/// Bisection steps (100 000 / 2^40 ≈ 1e-7 kWh resolution)
pub const BUDGET_SEARCH_ITERATIONS: usize = 40;

/// Daily allowance that keeps the month within budget
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BudgetTarget {
    /// kWh/day for the remaining days (rounded to 2 decimals)
    pub daily_target: f64,
    /// kWh left before the budget is reached (rounded to 2 decimals)
    pub remaining_kwh_allowed: f64,
    pub remaining_days: u32,
}

/// Largest monthly quantity whose progressive bill does not exceed `budget`
///
/// Bisection over `[0, 100 000]` kWh. Progressive billing is monotonic in
/// quantity for a well-formed schedule, which makes the search valid.
///
/// Returns 0 for a non-positive or non-finite budget, or a malformed schedule.
pub fn kwh_for_budget(budget: f64, schedule: &TariffSchedule) -> f64 {
    if !(budget.is_finite() && budget > 0.0) || !schedule.is_well_formed() {
        return 0.0;
    }

    let mut lo = 0.0;
    let mut hi = BUDGET_SEARCH_UPPER_KWH;

    for _ in 0..BUDGET_SEARCH_ITERATIONS {
        let mid = (lo + hi) / 2.0;
        if bill_progressive(mid, schedule).amount > budget {
            hi = mid;
        } else {
            lo = mid;
        }
    }

    lo
}

/// Daily kWh target for the rest of the month
///
/// - remaining days = days in month - day of month (≥ 0)
/// - allowed = budget kWh - consumed so far (≥ 0)
/// - target = allowed / remaining days, 0 when no days remain
pub fn daily_target_for_budget(
    budget: f64,
    schedule: &TariffSchedule,
    days_in_month: u32,
    consumed_so_far: f64,
    day_of_month: u32,
) -> BudgetTarget {
    if !(budget.is_finite() && budget > 0.0) {
        return BudgetTarget::default();
    }

    let remaining_days = days_in_month.saturating_sub(day_of_month);
    let max_month_kwh = kwh_for_budget(budget, schedule);
    let remaining_kwh_allowed = (max_month_kwh - sanitize_kwh(consumed_so_far)).max(0.0);

    let daily_target = if remaining_days > 0 {
        remaining_kwh_allowed / f64::from(remaining_days)
    } else {
        0.0
    };

    BudgetTarget {
        daily_target: round2(daily_target),
        remaining_kwh_allowed: round2(remaining_kwh_allowed),
        remaining_days,
    }
}

/// Alert level based on budget usage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    /// Usage < warning threshold
    Safe,
    /// Usage >= warning threshold
    Warning,
    /// Usage >= critical threshold
    Critical,
    /// Usage >= 100%
    Exceeded,
}

/// Warning threshold, percent of goal
pub const WARNING_THRESHOLD_PCT: f64 = 75.0;
/// Critical threshold, percent of goal
pub const CRITICAL_THRESHOLD_PCT: f64 = 90.0;

/// Month-to-date and projected spend against the goal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetStatus {
    /// Monthly goal (None = no goal configured)
    pub goal: Option<f64>,
    /// Current bill as percentage of goal (0.0-999.9, clamped for display)
    pub usage_pct: f64,
    /// Predicted bill minus goal (None if within goal or no goal)
    pub projected_overage: Option<f64>,
    /// Level derived from the predicted bill
    pub alert_level: AlertLevel,
}

impl BudgetStatus {
    /// Compare current and predicted bill amounts with `goal`
    pub fn evaluate(current_amount: f64, predicted_amount: f64, goal: f64) -> Self {
        if !(goal.is_finite() && goal > 0.0) {
            return Self {
                goal: None,
                usage_pct: 0.0,
                projected_overage: None,
                alert_level: AlertLevel::Safe,
            };
        }

        let usage_pct = (current_amount / goal * 100.0).clamp(0.0, 999.9);
        let projected_pct = predicted_amount / goal * 100.0;
        let projected_overage = (predicted_amount > goal).then(|| round2(predicted_amount - goal));

        Self {
            goal: Some(goal),
            usage_pct,
            projected_overage,
            alert_level: determine_alert_level(projected_pct),
        }
    }
}

/// Determine alert level from a usage percentage
fn determine_alert_level(pct: f64) -> AlertLevel {
    if pct >= 100.0 {
        AlertLevel::Exceeded
    } else if pct >= CRITICAL_THRESHOLD_PCT {
        AlertLevel::Critical
    } else if pct >= WARNING_THRESHOLD_PCT {
        AlertLevel::Warning
    } else {
        AlertLevel::Safe
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tariff::preset;
    use meterwise_types::TariffTier;

    fn two_tier() -> TariffSchedule {
        TariffSchedule::new(
            "MAD",
            vec![TariffTier::bounded(100.0, 0.90), TariffTier::unbounded(1.70)],
        )
    }

    #[test]
    fn test_kwh_for_budget_within_first_tier() {
        // 45 MAD at 0.90/kWh → 50 kWh
        let kwh = kwh_for_budget(45.0, &two_tier());
        assert!((kwh - 50.0).abs() < 0.01, "got {}", kwh);
    }

    #[test]
    fn test_kwh_for_budget_across_tiers() {
        // 175 MAD = 90 (first 100 kWh) + 50 × 1.70
        let kwh = kwh_for_budget(175.0, &two_tier());
        assert!((kwh - 150.0).abs() < 0.01, "got {}", kwh);
    }

    #[test]
    fn test_kwh_for_budget_never_overshoots() {
        let schedule = preset("MA").unwrap();
        for budget in [1.0, 37.5, 90.1, 250.0, 999.99] {
            let kwh = kwh_for_budget(budget, &schedule);
            assert!(bill_progressive(kwh, &schedule).amount <= budget);
        }
    }

    #[test]
    fn test_kwh_for_budget_degenerate() {
        assert_eq!(kwh_for_budget(0.0, &two_tier()), 0.0);
        assert_eq!(kwh_for_budget(-10.0, &two_tier()), 0.0);
        assert_eq!(kwh_for_budget(f64::NAN, &two_tier()), 0.0);
        assert_eq!(kwh_for_budget(100.0, &TariffSchedule::new("USD", vec![])), 0.0);
    }

    #[test]
    fn test_daily_target() {
        // US flat 0.18: 90 USD → 500 kWh; 200 consumed, 15 days left → 20/day
        let schedule = preset("US").unwrap();
        let target = daily_target_for_budget(90.0, &schedule, 30, 200.0, 15);

        assert_eq!(target.remaining_days, 15);
        // Cent rounding lets the budget stretch a few hundredths of a kWh
        assert!((target.remaining_kwh_allowed - 300.0).abs() < 0.05);
        assert!((target.daily_target - 20.0).abs() < 0.01);
    }

    #[test]
    fn test_daily_target_over_budget() {
        let schedule = preset("US").unwrap();
        let target = daily_target_for_budget(18.0, &schedule, 30, 250.0, 10);
        assert_eq!(target.remaining_kwh_allowed, 0.0);
        assert_eq!(target.daily_target, 0.0);
        assert_eq!(target.remaining_days, 20);
    }

    #[test]
    fn test_daily_target_last_day() {
        let schedule = preset("US").unwrap();
        let target = daily_target_for_budget(90.0, &schedule, 31, 10.0, 31);
        assert_eq!(target.remaining_days, 0);
        assert_eq!(target.daily_target, 0.0);
        assert!(target.remaining_kwh_allowed > 0.0);
    }

    #[test]
    fn test_daily_target_no_budget() {
        let schedule = preset("US").unwrap();
        assert_eq!(
            daily_target_for_budget(0.0, &schedule, 30, 10.0, 5),
            BudgetTarget::default()
        );
    }

    #[test]
    fn test_budget_status_levels() {
        assert_eq!(BudgetStatus::evaluate(10.0, 50.0, 100.0).alert_level, AlertLevel::Safe);
        assert_eq!(BudgetStatus::evaluate(10.0, 75.0, 100.0).alert_level, AlertLevel::Warning);
        assert_eq!(BudgetStatus::evaluate(10.0, 90.0, 100.0).alert_level, AlertLevel::Critical);

        let over = BudgetStatus::evaluate(60.0, 120.0, 100.0);
        assert_eq!(over.alert_level, AlertLevel::Exceeded);
        assert_eq!(over.projected_overage, Some(20.0));
        assert_eq!(over.usage_pct, 60.0);
    }

    #[test]
    fn test_budget_status_without_goal() {
        let status = BudgetStatus::evaluate(60.0, 120.0, 0.0);
        assert_eq!(status.goal, None);
        assert_eq!(status.alert_level, AlertLevel::Safe);
        assert!(status.projected_overage.is_none());
    }
}
