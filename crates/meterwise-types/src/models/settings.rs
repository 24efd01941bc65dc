//! User settings read by the forecasting engine

use super::tariff::{TariffMode, TariffSchedule};
use serde::{Deserialize, Serialize};

/// Color theme preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
    /// Follow the terminal / system preference
    #[default]
    Auto,
}

/// User configuration (from settings.json)
///
/// Every field has a default so that partial or older files still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub theme: Theme,

    /// Language code used for coach replies (e.g. "en", "fr", "ar")
    pub language: String,

    /// Country code of the selected tariff preset
    pub country: String,

    pub tariffs: TariffSchedule,

    pub tariff_mode: TariffMode,

    /// Monthly budget goal, in the tariff currency (0 = no goal)
    pub goal: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Auto,
            language: "en".to_string(),
            country: "US".to_string(),
            tariffs: TariffSchedule::flat("USD", 0.18),
            tariff_mode: TariffMode::Progressive,
            goal: 100.0,
        }
    }
}

impl Settings {
    /// Goal clamped to a usable budget (non-finite or negative → 0)
    pub fn budget(&self) -> f64 {
        if self.goal.is_finite() {
            self.goal.max(0.0)
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_settings_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "language": "fr", "tariffMode": "whole-tier" }"#).unwrap();

        assert_eq!(settings.language, "fr");
        assert_eq!(settings.tariff_mode, TariffMode::WholeTier);
        assert_eq!(settings.country, "US");
        assert_eq!(settings.goal, 100.0);
        assert_eq!(settings.theme, Theme::Auto);
    }

    #[test]
    fn test_budget_clamps_invalid_goal() {
        let mut settings = Settings::default();
        settings.goal = -5.0;
        assert_eq!(settings.budget(), 0.0);
        settings.goal = f64::NAN;
        assert_eq!(settings.budget(), 0.0);
        settings.goal = 250.0;
        assert_eq!(settings.budget(), 250.0);
    }
}
