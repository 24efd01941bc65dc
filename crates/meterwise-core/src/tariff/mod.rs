//! Tiered tariff billing
//!
//! Computes the bill for a monthly energy quantity under a [`TariffSchedule`]
//! in one of two modes:
//!
//! - **Progressive**: each tier's kWh span is billed at that tier's own rate
//!   (lower-tier kWh always cost the lower rate).
//! - **Whole-tier**: the whole quantity is billed at the rate of the tier the
//!   total falls into.
//!
//! Billing never fails. Negative or non-finite quantities bill as zero, and a
//! malformed schedule (see [`TariffSchedule::validate`]) yields a zero bill.
//!
//! # Examples
//!
//! ```
//! use meterwise_core::tariff::compute_bill;
//! use meterwise_types::{TariffMode, TariffSchedule, TariffTier};
//!
//! let schedule = TariffSchedule::new(
//!     "MAD",
//!     vec![TariffTier::bounded(100.0, 0.90), TariffTier::unbounded(1.70)],
//! );
//!
//! let progressive = compute_bill(150.0, &schedule, TariffMode::Progressive);
//! assert_eq!(progressive.amount, 175.0); // 100 × 0.90 + 50 × 1.70
//!
//! let whole = compute_bill(150.0, &schedule, TariffMode::WholeTier);
//! assert_eq!(whole.amount, 255.0); // 150 × 1.70
//! ```

pub mod presets;

pub use presets::{preset, preset_codes, TARIFF_PRESETS};

use meterwise_types::{TariffMode, TariffSchedule};
use serde::Serialize;
use std::fmt;

/// Billed amount in the schedule currency
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bill {
    /// Amount rounded to cents
    pub amount: f64,
    pub currency: String,
}

impl Bill {
    fn new(amount: f64, schedule: &TariffSchedule) -> Self {
        Self {
            amount: round2(amount.max(0.0)),
            currency: schedule.currency_or_fallback().to_string(),
        }
    }

    fn zero(schedule: &TariffSchedule) -> Self {
        Self::new(0.0, schedule)
    }
}

impl fmt::Display for Bill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} {}", self.amount, self.currency)
    }
}

/// Round to 2 decimal digits
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Non-finite or negative quantities count as zero
pub(crate) fn sanitize_kwh(kwh: f64) -> f64 {
    if kwh.is_finite() {
        kwh.max(0.0)
    } else {
        0.0
    }
}

fn billable(schedule: &TariffSchedule) -> bool {
    match schedule.validate() {
        Ok(()) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Malformed tariff schedule, billing as zero");
            false
        }
    }
}

/// Bill `quantity_kwh` with the billing function selected by `mode`
pub fn compute_bill(quantity_kwh: f64, schedule: &TariffSchedule, mode: TariffMode) -> Bill {
    match mode {
        TariffMode::Progressive => bill_progressive(quantity_kwh, schedule),
        TariffMode::WholeTier => bill_whole_tier(quantity_kwh, schedule),
    }
}

/// Progressive (marginal) billing
pub fn bill_progressive(quantity_kwh: f64, schedule: &TariffSchedule) -> Bill {
    if !billable(schedule) {
        return Bill::zero(schedule);
    }

    let mut remaining = sanitize_kwh(quantity_kwh);
    let mut amount = 0.0;
    let mut lower = 0.0;

    for tier in &schedule.tiers {
        if remaining <= 0.0 {
            break;
        }
        let upper = tier.upper_bound();
        let used = remaining.min(upper - lower);
        amount += used * tier.price;
        remaining -= used;
        lower = upper;
    }

    Bill::new(amount, schedule)
}

/// Whole-tier billing: all kWh at the price of the tier reached
pub fn bill_whole_tier(quantity_kwh: f64, schedule: &TariffSchedule) -> Bill {
    if !billable(schedule) {
        return Bill::zero(schedule);
    }

    let kwh = sanitize_kwh(quantity_kwh);
    let price = schedule
        .tiers
        .iter()
        .find(|tier| kwh <= tier.upper_bound())
        .or_else(|| schedule.tiers.last())
        .map(|tier| tier.price)
        .unwrap_or(0.0);

    Bill::new(kwh * price, schedule)
}

/// Index of the tier that `quantity_kwh` falls into
pub fn current_tier(quantity_kwh: f64, schedule: &TariffSchedule) -> Option<usize> {
    if !schedule.is_well_formed() {
        return None;
    }
    let kwh = sanitize_kwh(quantity_kwh);
    schedule
        .tiers
        .iter()
        .position(|tier| kwh <= tier.upper_bound())
}

/// kWh left before the next price tier starts
///
/// Returns `None` when usage is already in the unbounded tier (there is no
/// next tier) or the schedule is malformed.
pub fn kwh_to_next_tier(current_kwh: f64, schedule: &TariffSchedule) -> Option<f64> {
    if !schedule.is_well_formed() {
        return None;
    }
    let kwh = sanitize_kwh(current_kwh);

    for tier in &schedule.tiers {
        match tier.up_to {
            None => return None,
            Some(cap) if kwh < cap => return Some(cap - kwh),
            Some(_) => {}
        }
    }
    None
}

/// Day of month on which usage is expected to cross into the next tier
///
/// `ceil(days_elapsed + kwh_to_next / trend_daily)`, clamped to
/// `[days_elapsed, days_in_month]`. `None` when the trend is not positive,
/// there is no next tier, or the crossing falls after month end.
pub fn estimate_tier_cross_day(
    trend_daily: f64,
    kwh_to_next: Option<f64>,
    days_elapsed: u32,
    days_in_month: u32,
) -> Option<u32> {
    let remaining = kwh_to_next?;
    if !(trend_daily.is_finite() && trend_daily > 0.0) || !remaining.is_finite() {
        return None;
    }

    let day = (f64::from(days_elapsed) + remaining / trend_daily).ceil();
    if day > f64::from(days_in_month) {
        return None;
    }

    Some((day as u32).max(days_elapsed).min(days_in_month))
}
