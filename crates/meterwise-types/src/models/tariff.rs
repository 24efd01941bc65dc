//! Tiered tariff schedule and billing mode

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Currency reported when a schedule carries none
pub const FALLBACK_CURRENCY: &str = "USD";

/// One price bracket of a tariff schedule.
///
/// `up_to` is the inclusive upper bound of cumulative monthly kWh.
/// `None` stands for an unbounded last tier (serialized as `null`, since
/// JSON has no infinity).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TariffTier {
    #[serde(default)]
    pub up_to: Option<f64>,
    pub price: f64,
}

impl TariffTier {
    pub fn bounded(up_to: f64, price: f64) -> Self {
        Self {
            up_to: Some(up_to),
            price,
        }
    }

    pub fn unbounded(price: f64) -> Self {
        Self { up_to: None, price }
    }

    /// Upper bound as a number (`f64::INFINITY` for the last tier)
    pub fn upper_bound(&self) -> f64 {
        self.up_to.unwrap_or(f64::INFINITY)
    }

    pub fn is_unbounded(&self) -> bool {
        self.up_to.is_none()
    }
}

/// Ordered list of tiers with a display currency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TariffSchedule {
    pub currency: String,
    pub tiers: Vec<TariffTier>,
}

/// First violation found when validating a schedule
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TariffError {
    #[error("Tariff schedule has no tiers")]
    NoTiers,

    #[error("Tier {index}: upper bound must be positive and finite, got {bound}")]
    InvalidBound { index: usize, bound: f64 },

    #[error("Tier {index}: upper bound {bound} is not above previous bound {previous}")]
    NonAscending {
        index: usize,
        bound: f64,
        previous: f64,
    },

    #[error("Tier {index}: only the last tier may be unbounded")]
    UnboundedNotLast { index: usize },

    #[error("Last tier must be unbounded")]
    MissingUnboundedTier,

    #[error("Tier {index}: price must be finite and non-negative, got {price}")]
    InvalidPrice { index: usize, price: f64 },
}

impl TariffSchedule {
    pub fn new(currency: impl Into<String>, tiers: Vec<TariffTier>) -> Self {
        Self {
            currency: currency.into(),
            tiers,
        }
    }

    /// Single unbounded tier at `price`
    pub fn flat(currency: impl Into<String>, price: f64) -> Self {
        Self::new(currency, vec![TariffTier::unbounded(price)])
    }

    /// Check the schedule invariants
    ///
    /// Bounds must be positive and strictly increasing, prices finite and
    /// non-negative, and exactly the last tier unbounded.
    pub fn validate(&self) -> Result<(), TariffError> {
        if self.tiers.is_empty() {
            return Err(TariffError::NoTiers);
        }

        let last = self.tiers.len() - 1;
        let mut previous = 0.0;

        for (index, tier) in self.tiers.iter().enumerate() {
            if !tier.price.is_finite() || tier.price < 0.0 {
                return Err(TariffError::InvalidPrice {
                    index,
                    price: tier.price,
                });
            }

            match tier.up_to {
                None if index != last => return Err(TariffError::UnboundedNotLast { index }),
                None => {}
                Some(bound) => {
                    if !bound.is_finite() || bound <= 0.0 {
                        return Err(TariffError::InvalidBound { index, bound });
                    }
                    if bound <= previous {
                        return Err(TariffError::NonAscending {
                            index,
                            bound,
                            previous,
                        });
                    }
                    previous = bound;
                }
            }
        }

        if !self.tiers[last].is_unbounded() {
            return Err(TariffError::MissingUnboundedTier);
        }

        Ok(())
    }

    pub fn is_well_formed(&self) -> bool {
        self.validate().is_ok()
    }

    /// Schedule currency, or [`FALLBACK_CURRENCY`] when blank
    pub fn currency_or_fallback(&self) -> &str {
        let currency = self.currency.trim();
        if currency.is_empty() {
            FALLBACK_CURRENCY
        } else {
            currency
        }
    }
}

/// Billing function applied to a tariff schedule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TariffMode {
    /// Marginal pricing: each tier's span billed at that tier's rate
    #[default]
    Progressive,
    /// All usage billed at the rate of the tier reached by the total
    WholeTier,
}

impl TariffMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Progressive => "progressive",
            Self::WholeTier => "whole-tier",
        }
    }
}

impl fmt::Display for TariffMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TariffMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "progressive" => Ok(Self::Progressive),
            "whole-tier" | "whole_tier" | "wholetier" => Ok(Self::WholeTier),
            other => Err(format!(
                "Unknown tariff mode '{}' (expected progressive or whole-tier)",
                other
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_tier() -> TariffSchedule {
        TariffSchedule::new(
            "MAD",
            vec![TariffTier::bounded(100.0, 0.90), TariffTier::unbounded(1.70)],
        )
    }

    #[test]
    fn test_well_formed_schedule() {
        assert_eq!(two_tier().validate(), Ok(()));
        assert!(TariffSchedule::flat("EUR", 0.25).is_well_formed());
    }

    #[test]
    fn test_empty_schedule_rejected() {
        let schedule = TariffSchedule::new("USD", vec![]);
        assert_eq!(schedule.validate(), Err(TariffError::NoTiers));
    }

    #[test]
    fn test_non_ascending_rejected() {
        let schedule = TariffSchedule::new(
            "USD",
            vec![
                TariffTier::bounded(200.0, 0.1),
                TariffTier::bounded(150.0, 0.2),
                TariffTier::unbounded(0.3),
            ],
        );
        assert!(matches!(
            schedule.validate(),
            Err(TariffError::NonAscending { index: 1, .. })
        ));
    }

    #[test]
    fn test_unbounded_must_be_last() {
        let schedule = TariffSchedule::new(
            "USD",
            vec![TariffTier::unbounded(0.1), TariffTier::bounded(100.0, 0.2)],
        );
        assert_eq!(
            schedule.validate(),
            Err(TariffError::UnboundedNotLast { index: 0 })
        );

        let capped = TariffSchedule::new("USD", vec![TariffTier::bounded(100.0, 0.2)]);
        assert_eq!(capped.validate(), Err(TariffError::MissingUnboundedTier));
    }

    #[test]
    fn test_negative_price_rejected() {
        let schedule = TariffSchedule::flat("USD", -0.1);
        assert!(matches!(
            schedule.validate(),
            Err(TariffError::InvalidPrice { index: 0, .. })
        ));
    }

    #[test]
    fn test_unbounded_tier_serializes_as_null() {
        let json = serde_json::to_string(&two_tier()).unwrap();
        assert!(json.contains(r#""upTo":100.0"#));
        assert!(json.contains(r#""upTo":null"#));

        let back: TariffSchedule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, two_tier());
        assert_eq!(back.tiers[1].upper_bound(), f64::INFINITY);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("progressive".parse(), Ok(TariffMode::Progressive));
        assert_eq!("Whole-Tier".parse(), Ok(TariffMode::WholeTier));
        assert!("tiered".parse::<TariffMode>().is_err());
        assert_eq!(
            serde_json::to_string(&TariffMode::WholeTier).unwrap(),
            r#""whole-tier""#
        );
    }

    #[test]
    fn test_currency_fallback() {
        assert_eq!(TariffSchedule::flat("  ", 0.1).currency_or_fallback(), "USD");
        assert_eq!(two_tier().currency_or_fallback(), "MAD");
    }
}
