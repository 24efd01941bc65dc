//! CLI helpers for the meter commands
//!
//! Parsing of `--at` instants and the table / text formatters used by
//! `status`, `list`, `budget`, `what-if`, `tariff show` and `scan`.

use anyhow::{Context, Result};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use comfy_table::{Cell, Color, ContentArrangement, Row, Table};
use meterwise_core::analytics::{kwh_for_budget, AlertLevel, WhatIfScenario};
use meterwise_core::tariff::current_tier;
use meterwise_core::{BillFields, MeterCandidate, UsageReport};
use meterwise_types::{Reading, Settings, TariffSchedule};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug)]
pub enum CliError {
    /// `add` aborted at the confirmation prompt
    Declined,
    /// OCR text without any usable number
    NoMeterValue { min_digits: usize },
    Core(meterwise_core::CoreError),
    Other(anyhow::Error),
}

impl std::fmt::Display for CliError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CliError::Declined => write!(f, "Cancelled, nothing was saved"),
            CliError::NoMeterValue { min_digits } => write!(
                f,
                "No meter value with at least {} digits found in the image",
                min_digits
            ),
            CliError::Core(e) => write!(f, "{}", e),
            CliError::Other(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for CliError {}

impl From<meterwise_core::CoreError> for CliError {
    fn from(e: meterwise_core::CoreError) -> Self {
        CliError::Core(e)
    }
}

impl From<anyhow::Error> for CliError {
    fn from(e: anyhow::Error) -> Self {
        CliError::Other(e)
    }
}

// ============================================================================
// Instants
// ============================================================================

/// Parse `--at`: RFC 3339, `YYYY-MM-DD HH:MM` or `YYYY-MM-DD` (local time)
pub fn parse_instant(s: &str) -> Result<DateTime<Utc>> {
    let s = s.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }

    let naive = match NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M") {
        Ok(naive) => naive,
        Err(_) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .context("Invalid date (expected YYYY-MM-DD, YYYY-MM-DD HH:MM or RFC 3339)")?
            .and_hms_opt(0, 0, 0)
            .context("Invalid time")?,
    };

    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{} does not exist in the local time zone", s))
}

// ============================================================================
// Formatters
// ============================================================================

fn header(titles: &[&str], no_color: bool) -> Vec<Cell> {
    titles
        .iter()
        .map(|t| {
            let cell = Cell::new(t);
            if no_color {
                cell
            } else {
                cell.fg(Color::Cyan)
            }
        })
        .collect()
}

fn level_label(level: AlertLevel) -> &'static str {
    match level {
        AlertLevel::Safe => "on track",
        AlertLevel::Warning => "watch it",
        AlertLevel::Critical => "close to goal",
        AlertLevel::Exceeded => "over goal",
    }
}

/// Readings as a table (oldest first) or JSON
pub fn format_readings(readings: &[Reading], json: bool, no_color: bool) -> String {
    if json {
        return serde_json::to_string_pretty(readings).unwrap_or_else(|_| "[]".to_string());
    }

    if readings.is_empty() {
        return "No readings yet. Add one with `meterwise add <kWh>`.".to_string();
    }

    let mut sorted = readings.to_vec();
    sorted.sort_by_key(|r| r.timestamp);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&["ID", "Date", "Reading (kWh)", "Delta"], no_color));

    let mut previous: Option<f64> = None;
    for reading in &sorted {
        let date = reading
            .timestamp
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
            .to_string();
        let delta = previous
            .map(|p| format!("{:+.1}", reading.value - p))
            .unwrap_or_else(|| "-".to_string());
        previous = Some(reading.value);

        table.add_row(Row::from(vec![
            reading.id.to_string(),
            date,
            format!("{}", reading.value),
            delta,
        ]));
    }

    table.to_string()
}

/// Month overview printed by `status`
pub fn format_status(report: &UsageReport) -> String {
    let window = report.window();
    let trend = &report.trend;
    let status = &report.budget_status;

    let mut lines = vec![];
    lines.push(format!(
        "meterwise - {} (day {} of {}, {} left)",
        window.now.with_timezone(&Local).format("%B %Y"),
        window.days_elapsed,
        window.days_in_month,
        window.days_remaining
    ));
    lines.push(String::new());
    lines.push(format!("Usage so far:     {:.2} kWh", trend.usage_so_far));
    lines.push(format!("Daily trend:      {:.2} kWh/day", trend.trend_daily_rate));
    lines.push(format!(
        "Raw average:      {:.2} kWh/day",
        trend.raw_average_daily_rate
    ));
    lines.push(format!("Forecast:         {:.1} kWh", trend.forecast_usage));
    lines.push(String::new());
    lines.push(format!("Bill so far:      {}", report.current_bill));
    lines.push(format!(
        "Predicted bill:   {} ({} - {})",
        report.predicted_bill, report.band.low, report.band.high
    ));
    lines.push(format!("Tariff mode:      {}", report.tariff_mode));

    match report.kwh_to_next_tier {
        Some(kwh) => {
            let crossing = report
                .tier_cross_day
                .map(|d| format!(", reached around day {}", d))
                .unwrap_or_default();
            lines.push(format!("Next tier in:     {:.1} kWh{}", kwh, crossing));
        }
        None => lines.push("Next tier in:     - (top tier)".to_string()),
    }

    if let Some(goal) = status.goal {
        lines.push(String::new());
        lines.push(format!(
            "Goal:             {:.2} {} ({:.0}% used, {})",
            goal,
            report.current_bill.currency,
            status.usage_pct,
            level_label(status.alert_level)
        ));
        lines.push(format!(
            "Daily target:     {:.2} kWh/day for {} days",
            report.budget.daily_target, report.budget.remaining_days
        ));
    }

    if report.spike.baseline_rate > 0.0 {
        lines.push(format!(
            "Last interval:    {:.2} kWh/day ({} vs baseline)",
            report.spike.last_rate,
            report.spike.format_change()
        ));
    }

    if !report.alerts.is_empty() {
        lines.push(String::new());
        for alert in &report.alerts {
            lines.push(format!("{} {}", alert.icon(), alert.message()));
        }
    }

    if trend.sample_count < 2 {
        lines.push(String::new());
        lines.push("Add at least two readings this month for a forecast.".to_string());
    }

    lines.join("\n")
}

/// Budget breakdown printed by `budget`
pub fn format_budget(report: &UsageReport, settings: &Settings) -> String {
    let goal = settings.budget();
    let currency = report.current_bill.currency.as_str();

    if goal <= 0.0 {
        return "No monthly goal set. Use `meterwise tariff goal <amount>`.".to_string();
    }

    let allowance = kwh_for_budget(goal, &settings.tariffs);
    let mut lines = vec![];
    lines.push(format!("Monthly goal:       {:.2} {}", goal, currency));
    lines.push(format!("kWh the goal buys:  {:.1} kWh", allowance));
    lines.push(format!(
        "Used so far:        {:.2} kWh ({})",
        report.trend.usage_so_far, report.current_bill
    ));
    lines.push(format!(
        "Still allowed:      {:.2} kWh over {} days",
        report.budget.remaining_kwh_allowed, report.budget.remaining_days
    ));
    lines.push(format!(
        "Daily target:       {:.2} kWh/day (current pace {:.2})",
        report.budget.daily_target, report.trend.trend_daily_rate
    ));
    if let Some(overage) = report.budget_status.projected_overage {
        lines.push(format!(
            "Projected overage:  {:.2} {} at the current pace",
            overage, currency
        ));
    }
    lines.join("\n")
}

/// Result of `what-if`
pub fn format_what_if(scenario: &WhatIfScenario) -> String {
    [
        format!("Cutting usage by {:.0}% for the rest of the month:", scenario.reduction_pct),
        format!("  Forecast:   {:.1} kWh", scenario.predicted_usage),
        format!("  Bill:       {} (instead of {})", scenario.bill, scenario.baseline_bill),
        format!("  Savings:    {:.2} {}", scenario.savings, scenario.bill.currency),
    ]
    .join("\n")
}

/// Tier table printed by `tariff show`
pub fn format_tariff(settings: &Settings, usage_so_far: f64, no_color: bool) -> String {
    let schedule: &TariffSchedule = &settings.tariffs;
    let active = current_tier(usage_so_far, schedule);

    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header(&["Tier", "Up to (kWh)", "Price", ""], no_color));

    for (i, tier) in schedule.tiers.iter().enumerate() {
        let up_to = tier
            .up_to
            .map(|u| format!("{}", u))
            .unwrap_or_else(|| "-".to_string());
        let marker = if active == Some(i) { "<- now" } else { "" };
        table.add_row(Row::from(vec![
            (i + 1).to_string(),
            up_to,
            format!("{:.4} {}", tier.price, schedule.currency_or_fallback()),
            marker.to_string(),
        ]));
    }

    format!(
        "Country: {}   Mode: {}   Goal: {:.2} {}\n{}",
        settings.country,
        settings.tariff_mode,
        settings.budget(),
        schedule.currency_or_fallback(),
        table
    )
}

/// Result of `scan` in meter mode
pub fn format_meter_candidate(candidate: &MeterCandidate, last: Option<f64>) -> String {
    let mut out = format!("Meter value: {} kWh (read as \"{}\")", candidate.value, candidate.raw);
    if !candidate.plausible {
        if let Some(last) = last {
            out.push_str(&format!("\nWarning: below the last reading ({} kWh)", last));
        }
    }
    out
}

/// Result of `scan --bill`
pub fn format_bill_fields(fields: &BillFields) -> String {
    if fields.is_empty() {
        return "Nothing recognised on this bill.".to_string();
    }

    let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "-".to_string());
    let num = |v: Option<f64>| v.map(|n| format!("{}", n)).unwrap_or_else(|| "-".to_string());

    [
        format!("Provider:  {}", show(&fields.provider)),
        format!(
            "Period:    {} to {}",
            show(&fields.period_start),
            show(&fields.period_end)
        ),
        format!("Usage:     {} kWh", num(fields.total_kwh)),
        format!(
            "Amount:    {} {}",
            num(fields.total_amount),
            fields.currency.as_deref().unwrap_or("")
        ),
    ]
    .join("\n")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use meterwise_core::tariff::preset;
    use meterwise_types::ReadingId;

    fn april(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 0, 0, 0).unwrap()
    }

    fn sample() -> (Vec<Reading>, Settings) {
        let readings = vec![
            Reading::new(ReadingId(2), april(15), 1200.0),
            Reading::new(ReadingId(1), april(1), 1000.0),
        ];
        let settings = Settings {
            country: "MA".to_string(),
            tariffs: preset("MA").unwrap(),
            goal: 200.0,
            ..Settings::default()
        };
        (readings, settings)
    }

    #[test]
    fn test_parse_instant_rfc3339() {
        let dt = parse_instant("2025-04-15T10:30:00Z").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2025, 4, 15, 10, 30, 0).unwrap());

        let offset = parse_instant("2025-04-15T12:30:00+02:00").unwrap();
        assert_eq!(offset, dt);
    }

    #[test]
    fn test_parse_instant_local_forms() {
        let day = parse_instant("2025-04-15").unwrap();
        let expected = Local
            .with_ymd_and_hms(2025, 4, 15, 0, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(day, expected);

        assert!(parse_instant("2025-04-15 08:45").is_ok());
        assert!(parse_instant("yesterday").is_err());
        assert!(parse_instant("2025-13-01").is_err());
    }

    #[test]
    fn test_format_readings_empty() {
        let output = format_readings(&[], false, true);
        assert!(output.contains("No readings yet"));
    }

    #[test]
    fn test_format_readings_sorted_with_delta() {
        let (readings, _) = sample();
        let output = format_readings(&readings, false, true);
        let first = output.find("1000").unwrap();
        let second = output.find("1200").unwrap();
        assert!(first < second);
        assert!(output.contains("+200.0"));
    }

    #[test]
    fn test_format_readings_json() {
        let (readings, _) = sample();
        let output = format_readings(&readings, true, false);
        assert!(output.starts_with('['));
        assert!(output.contains("\"date\""));
    }

    #[test]
    fn test_format_status_contents() {
        let (readings, settings) = sample();
        let report = UsageReport::compute(&readings, &settings, &april(15));
        let output = format_status(&report);

        assert!(output.contains("April 2025"));
        assert!(output.contains("Usage so far:     200.00 kWh"));
        assert!(output.contains("MAD"));
        assert!(output.contains("over goal") || output.contains("close to goal"));
    }

    #[test]
    fn test_format_status_without_readings() {
        let (_, settings) = sample();
        let report = UsageReport::compute(&[], &settings, &april(10));
        let output = format_status(&report);
        assert!(output.contains("Add at least two readings"));
    }

    #[test]
    fn test_format_budget_without_goal() {
        let (readings, mut settings) = sample();
        settings.goal = 0.0;
        let report = UsageReport::compute(&readings, &settings, &april(15));
        assert!(format_budget(&report, &settings).contains("No monthly goal"));
    }

    #[test]
    fn test_format_tariff_marks_active_tier() {
        let (_, settings) = sample();
        let output = format_tariff(&settings, 120.0, true);
        assert!(output.contains("Country: MA"));
        assert!(output.contains("<- now"));
        assert!(output.contains("0.9010 MAD"));
    }

    #[test]
    fn test_format_bill_fields_empty() {
        assert!(format_bill_fields(&BillFields::default()).contains("Nothing recognised"));
    }

    #[test]
    fn test_cli_error_display() {
        let err = CliError::NoMeterValue { min_digits: 4 };
        assert!(err.to_string().contains("at least 4 digits"));
        assert_eq!(CliError::Declined.to_string(), "Cancelled, nothing was saved");
    }
}
