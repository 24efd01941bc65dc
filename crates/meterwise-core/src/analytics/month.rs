//! Calendar month boundaries for a reference instant

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, NaiveTime, Offset, TimeZone, Utc};
use meterwise_types::Reading;
use serde::Serialize;

/// Floor for time spans, in days, so rates never divide by zero
pub const MIN_SPAN_DAYS: f64 = 1e-6;

const MS_PER_DAY: f64 = 1000.0 * 60.0 * 60.0 * 24.0;

/// Month containing a reference instant
///
/// Boundaries are computed in the reference instant's own time zone and
/// stored as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MonthWindow {
    /// First instant of the month
    pub start: DateTime<Utc>,
    /// Last instant of the month
    pub end: DateTime<Utc>,
    /// The reference instant ("now")
    pub now: DateTime<Utc>,
    pub days_in_month: u32,
    /// 1-based day of month of `now`
    pub days_elapsed: u32,
    /// `days_in_month - days_elapsed`, never negative
    pub days_remaining: u32,
}

impl MonthWindow {
    pub fn for_instant<Tz: TimeZone>(instant: &DateTime<Tz>) -> Self {
        let tz = instant.timezone();
        let offset_secs = i64::from(instant.offset().fix().local_minus_utc());
        let local = instant.naive_local();

        let today = local.date();
        let first = today.with_day(1).unwrap_or(today);
        let next_first = first.checked_add_months(Months::new(1)).unwrap_or(first);
        let days_in_month = u32::try_from((next_first - first).num_days())
            .unwrap_or(0)
            .max(1);

        let start = local_midnight_utc(&tz, first, offset_secs);
        let end = local_midnight_utc(&tz, next_first, offset_secs) - Duration::milliseconds(1);

        let days_elapsed = today.day();

        Self {
            start,
            end,
            now: instant.with_timezone(&Utc),
            days_in_month,
            days_elapsed,
            days_remaining: days_in_month.saturating_sub(days_elapsed),
        }
    }

    /// Month window for the current local time
    pub fn current() -> Self {
        Self::for_instant(&chrono::Local::now())
    }

    /// Whether `ts` is on or after the month start
    ///
    /// Only the lower bound is checked.
    pub fn includes(&self, ts: &DateTime<Utc>) -> bool {
        *ts >= self.start
    }
}

/// Midnight of `date` in `tz`, as UTC
///
/// Falls back to the reference offset when midnight does not exist locally
/// (DST gap).
fn local_midnight_utc<Tz: TimeZone>(tz: &Tz, date: NaiveDate, offset_secs: i64) -> DateTime<Utc> {
    let naive = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&naive).earliest() {
        Some(dt) => dt.with_timezone(&Utc),
        None => Utc.from_utc_datetime(&(naive - Duration::seconds(offset_secs))),
    }
}

/// Signed span from `from` to `to`, in fractional days
pub(crate) fn days_between(from: &DateTime<Utc>, to: &DateTime<Utc>) -> f64 {
    (*to - *from).num_milliseconds() as f64 / MS_PER_DAY
}

/// In-month readings sorted by timestamp
///
/// The sort is stable, so readings sharing a timestamp keep their input order.
pub(crate) fn month_readings<'a>(readings: &'a [Reading], window: &MonthWindow) -> Vec<&'a Reading> {
    let mut sorted: Vec<&Reading> = readings.iter().collect();
    sorted.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    sorted.retain(|r| window.includes(&r.timestamp));
    sorted
}

/// Reading value with NaN/infinity treated as zero
pub(crate) fn finite_value(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}
