//! Country tariff presets
//!
//! Example residential schedules selectable from settings. Users can edit
//! the schedule afterwards; presets only seed it.
//!
//! - **MA**: ONEE-style progressive brackets (MAD)
//! - **FR**: flat EUR rate
//! - **US**: flat USD rate

use meterwise_types::{TariffSchedule, TariffTier};
use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Preset table keyed by upper-case country code
pub static TARIFF_PRESETS: Lazy<HashMap<&'static str, TariffSchedule>> = Lazy::new(|| {
    let mut m = HashMap::new();

    m.insert(
        "MA",
        TariffSchedule::new(
            "MAD",
            vec![
                TariffTier::bounded(100.0, 0.9010),
                TariffTier::bounded(150.0, 1.0740),
                TariffTier::bounded(200.0, 1.0740),
                TariffTier::bounded(300.0, 1.2827),
                TariffTier::bounded(500.0, 1.4915),
                TariffTier::unbounded(1.6994),
            ],
        ),
    );
    m.insert("FR", TariffSchedule::flat("EUR", 0.25));
    m.insert("US", TariffSchedule::flat("USD", 0.18));

    m
});

/// Preset schedule for a country code (case-insensitive)
pub fn preset(country: &str) -> Option<TariffSchedule> {
    TARIFF_PRESETS
        .get(country.trim().to_ascii_uppercase().as_str())
        .cloned()
}

/// Known preset codes, sorted
pub fn preset_codes() -> Vec<&'static str> {
    let mut codes: Vec<_> = TARIFF_PRESETS.keys().copied().collect();
    codes.sort_unstable();
    codes
}
