//! AI energy coach
//!
//! [`CoachSummary`] condenses a [`UsageReport`] into the formatted numbers
//! the coach sees, [`build_prompt`] turns it and the conversation into a
//! single prompt, and [`gemini::CoachClient`] sends it.

pub mod gemini;

pub use gemini::{CoachClient, GEMINI_BASE_URL, PREFERRED_MODELS};

use meterwise_types::{ChatMessage, ChatRole, Settings};
use serde::Serialize;

use crate::analytics::UsageReport;

/// Shown when a value cannot be computed
const NOT_AVAILABLE: &str = "N/A";

/// Numbers sent to the coach, already formatted for the prompt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoachSummary {
    /// kWh/day, regression trend
    pub trend_daily: String,
    /// kWh/day, average since the first reading of the month
    pub raw_average_daily: String,
    pub usage_so_far: String,
    pub days_left: u32,
    /// Predicted bill with currency, e.g. `74.57 USD`
    pub predicted_bill: String,
    /// Goal with currency, e.g. `100 USD`
    pub goal: String,
    /// kWh/day to stay within the goal, `N/A` without a goal
    pub daily_target: String,
    /// Whole kWh, or `Infinity` in the last tier
    pub kwh_to_next_tier: String,
    pub currency: String,
    pub last_rate: Option<String>,
    pub baseline_rate: Option<String>,
    pub change_pct: Option<String>,
}

impl CoachSummary {
    pub fn from_report(report: &UsageReport, settings: &Settings) -> Self {
        let currency = settings.tariffs.currency_or_fallback().to_string();
        let goal = settings.budget();

        let daily_target = if goal > 0.0 {
            format!("{:.2}", report.budget.daily_target)
        } else {
            NOT_AVAILABLE.to_string()
        };

        let kwh_to_next_tier = match report.kwh_to_next_tier {
            Some(kwh) => format!("{:.0}", kwh),
            None => "Infinity".to_string(),
        };

        // A baseline needs at least one interval before the last one
        let spike = &report.spike;
        let has_baseline = report.intervals.len() > 1;

        Self {
            trend_daily: format!("{:.2}", report.trend.trend_daily_rate),
            raw_average_daily: format!("{:.2}", report.trend.raw_average_daily_rate),
            usage_so_far: format!("{:.2}", report.trend.usage_so_far),
            days_left: report.window().days_remaining,
            predicted_bill: report.predicted_bill.to_string(),
            goal: format!("{} {}", goal, currency),
            daily_target,
            kwh_to_next_tier,
            currency,
            last_rate: has_baseline.then(|| format!("{:.2}", spike.last_rate)),
            baseline_rate: has_baseline.then(|| format!("{:.2}", spike.baseline_rate)),
            change_pct: has_baseline.then(|| format!("{:.0}", spike.percent_change)),
        }
    }
}

/// English name of a language code, for the prompt
pub fn language_name(code: &str) -> &str {
    match code.to_ascii_lowercase().as_str() {
        "en" => "English",
        "fr" => "French",
        "ar" => "Arabic",
        "es" => "Spanish",
        "de" => "German",
        _ => code,
    }
}

#[derive(Serialize)]
struct PromptTurn<'a> {
    role: ChatRole,
    text: &'a str,
}

/// Full prompt for one coach turn
///
/// `history` is the conversation including the newest user question.
pub fn build_prompt(summary: &CoachSummary, history: &[ChatMessage], language: &str) -> String {
    let language = language_name(language);
    let na = |v: &Option<String>| v.clone().unwrap_or_else(|| NOT_AVAILABLE.to_string());

    let turns: Vec<PromptTurn<'_>> = history
        .iter()
        .map(|m| PromptTurn {
            role: m.role,
            text: &m.text,
        })
        .collect();
    let conversation = serde_json::to_string(&turns).unwrap_or_else(|_| "[]".to_string());

    format!(
        r#"You are "Meterwise", an expert AI energy coach for a home electricity tracker.
User language: {language}. Answer ONLY in {language}. Keep replies concise (2-4 sentences), plain text.

Current month status:
- Daily trend (recent): {trend} kWh/day
- Avg daily so far (raw): {raw} kWh/day
- Usage so far: {usage} kWh
- Days left: {days_left}
- Predicted bill if pace continues: {predicted}
- Monthly goal: {goal}
- Daily target to stay under goal: {target} kWh
- kWh left before next price tier: {to_next}
- Currency: {currency}
- Spike detection (if present): lastRate={last} kWh/day vs baseline={baseline} kWh/day (change={change}%)

Conversation so far: {conversation}

Guidelines:
- Use the daily trend for projections and give numeric, actionable tips.
- If close to a higher tier or over daily target, warn and suggest specific actions to avoid crossing (HVAC, water heater, fridge seal, standby devices).
- If asked "why high?", suggest 2-3 likely causes based on season and common appliances.
- Encourage low-cost actions (thermostat 1-2°, off-peak usage, LEDs, shorter showers, air-dry laundry).
- No markdown, plain sentences only.
"#,
        trend = summary.trend_daily,
        raw = summary.raw_average_daily,
        usage = summary.usage_so_far,
        days_left = summary.days_left,
        predicted = summary.predicted_bill,
        goal = summary.goal,
        target = summary.daily_target,
        to_next = summary.kwh_to_next_tier,
        currency = summary.currency,
        last = na(&summary.last_rate),
        baseline = na(&summary.baseline_rate),
        change = na(&summary.change_pct),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tariff::preset;
    use chrono::{DateTime, TimeZone, Utc};
    use meterwise_types::{Reading, ReadingId};

    fn april(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 4, day, 0, 0, 0).unwrap()
    }

    fn report_and_settings() -> (UsageReport, Settings) {
        let settings = Settings {
            tariffs: preset("US").unwrap(),
            goal: 90.0,
            ..Settings::default()
        };
        let readings = vec![
            Reading::new(ReadingId(1), april(1), 1000.0),
            Reading::new(ReadingId(2), april(15), 1200.0),
        ];
        let report = UsageReport::compute(&readings, &settings, &april(15));
        (report, settings)
    }

    #[test]
    fn test_summary_formatting() {
        let (report, settings) = report_and_settings();
        let summary = CoachSummary::from_report(&report, &settings);

        assert_eq!(summary.trend_daily, "14.29");
        assert_eq!(summary.raw_average_daily, "14.29");
        assert_eq!(summary.usage_so_far, "200.00");
        assert_eq!(summary.days_left, 15);
        assert_eq!(summary.predicted_bill, "74.57 USD");
        assert_eq!(summary.goal, "90 USD");
        assert_eq!(summary.kwh_to_next_tier, "Infinity");
        assert_eq!(summary.currency, "USD");
        // Single interval: no baseline yet
        assert_eq!(summary.last_rate, None);
    }

    #[test]
    fn test_summary_spike_figures_with_history() {
        let (_, settings) = report_and_settings();
        let readings = vec![
            Reading::new(ReadingId(1), april(1), 1000.0),
            Reading::new(ReadingId(2), april(8), 1070.0),
            Reading::new(ReadingId(3), april(15), 1210.0),
        ];
        let report = UsageReport::compute(&readings, &settings, &april(15));
        let summary = CoachSummary::from_report(&report, &settings);

        assert_eq!(summary.last_rate.as_deref(), Some("20.00"));
        assert_eq!(summary.baseline_rate.as_deref(), Some("10.00"));
        assert_eq!(summary.change_pct.as_deref(), Some("100"));
    }

    #[test]
    fn test_summary_without_goal() {
        let (report, mut settings) = report_and_settings();
        settings.goal = 0.0;
        let summary = CoachSummary::from_report(&report, &settings);
        assert_eq!(summary.daily_target, "N/A");
    }

    #[test]
    fn test_prompt_contents() {
        let (report, settings) = report_and_settings();
        let summary = CoachSummary::from_report(&report, &settings);
        let mut history = ChatMessage::default_history();
        history.push(ChatMessage::user("Why is my bill so high?"));

        let prompt = build_prompt(&summary, &history, "fr");

        assert!(prompt.contains("Answer ONLY in French"));
        assert!(prompt.contains("- Usage so far: 200.00 kWh"));
        assert!(prompt.contains("- Predicted bill if pace continues: 74.57 USD"));
        assert!(prompt.contains("kWh left before next price tier: Infinity"));
        assert!(prompt.contains("lastRate=N/A"));
        assert!(prompt.contains(r#""role":"user","text":"Why is my bill so high?""#));
    }

    #[test]
    fn test_language_name_passthrough() {
        assert_eq!(language_name("EN"), "English");
        assert_eq!(language_name("pt"), "pt");
    }
}
