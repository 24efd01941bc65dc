//! Text heuristics over OCR output
//!
//! The OCR service returns raw recognised text; these functions pull a
//! meter counter value or the headline fields of a utility bill out of it.
//! Nothing here touches the network, see [`ocr_space`] for the client.

pub mod ocr_space;

pub use ocr_space::{OcrClient, DEMO_API_KEY, OCR_SPACE_URL};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Minimum digits for a meter value candidate
pub const DEFAULT_MIN_DIGITS: usize = 4;

/// Runs of digits with embedded spaces or separators (e.g. `12 345,6`)
static NUMBER_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[0-9][0-9\s.,]{3,15}").expect("valid number regex"));

static CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(MAD|DHS|DH|EUR|USD)\b|(€|\$)").expect("valid currency regex")
});

static LABELLED_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:montant total|montant|total|amount)\s*[:=]?\s*([0-9][0-9.,]*)")
        .expect("valid amount regex")
});

static KWH_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([0-9][0-9.,]*)\s*kwh\b").expect("valid kWh regex"));

static KWH_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bkwh\b\s*[:=]?\s*([0-9][0-9.,]*)").expect("valid kWh regex")
});

static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b([0-9]{1,2}[/-][0-9]{1,2}[/-][0-9]{2,4})\b").expect("valid date regex")
});

static PROVIDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(ONEE|Lydec|Redal|Veolia|EDF|ENGIE|PG&E|SUEZ)\b")
        .expect("valid provider regex")
});

/// Canonical spelling of the recognised utility providers
const PROVIDERS: &[&str] = &["ONEE", "Lydec", "Redal", "Veolia", "EDF", "ENGIE", "PG&E", "SUEZ"];

/// Normalise a number written with `.` or `,` separators
///
/// Every separator but the last is a thousands separator; the last one
/// is the decimal point. Returns None when nothing numeric is left.
pub fn normalize_number(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == ',')
        .collect();
    let kept = kept.trim_end_matches(['.', ',']);

    let normalized = match kept.rfind(['.', ',']) {
        Some(pos) => {
            let (int_part, frac_part) = kept.split_at(pos);
            let int_digits: String = int_part.chars().filter(char::is_ascii_digit).collect();
            format!("{}.{}", int_digits, &frac_part[1..])
        }
        None => kept.to_string(),
    };

    if !normalized.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Meter value recognised in OCR text
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeterCandidate {
    /// Matched text, whitespace removed
    pub raw: String,
    pub value: f64,
    /// Value is at least the previous reading
    pub plausible: bool,
}

/// Best meter counter value in `text`
///
/// Candidates are digit runs with at least `min_digits` digits. When
/// `prefer_bigger_than` is set (usually the last stored reading), the
/// largest candidate not below it wins; otherwise the largest overall.
pub fn extract_meter_value(
    text: &str,
    min_digits: usize,
    prefer_bigger_than: Option<f64>,
) -> Option<MeterCandidate> {
    let candidates: Vec<(String, f64)> = NUMBER_RUN
        .find_iter(text)
        .filter_map(|m| {
            let raw: String = m.as_str().chars().filter(|c| !c.is_whitespace()).collect();
            let digits = raw.chars().filter(char::is_ascii_digit).count();
            if digits < min_digits {
                return None;
            }
            normalize_number(&raw).map(|value| (raw, value))
        })
        .collect();

    let threshold = prefer_bigger_than.filter(|t| t.is_finite());
    let preferred = threshold.and_then(|t| largest(candidates.iter().filter(|c| c.1 >= t)));
    let (raw, value) = match preferred {
        Some(best) => best,
        None => largest(candidates.iter())?,
    };

    Some(MeterCandidate {
        plausible: threshold.map_or(true, |t| value >= t),
        raw,
        value,
    })
}

fn largest<'a>(items: impl Iterator<Item = &'a (String, f64)>) -> Option<(String, f64)> {
    items
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(raw, value)| (raw.clone(), *value))
}

/// Headline fields recognised on a utility bill
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BillFields {
    pub provider: Option<String>,
    pub period_start: Option<String>,
    pub period_end: Option<String>,
    pub total_kwh: Option<f64>,
    pub total_amount: Option<f64>,
    /// Upper-case currency marker as printed (`MAD`, `DH`, `€`, ...)
    pub currency: Option<String>,
}

impl BillFields {
    /// True when nothing was recognised
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Extract bill fields from OCR text
///
/// - currency: first of MAD/DHS/DH/EUR/USD/€/$
/// - amount: number next to the currency, else after a total/amount label
/// - kWh: number before or after `kWh`
/// - period: first two `dd/mm/yyyy`-like dates
/// - provider: known utility names
pub fn parse_bill_text(text: &str) -> BillFields {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");

    let currency = CURRENCY.captures(&flat).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .map(|m| m.as_str().to_uppercase())
    });

    let total_amount = match &currency {
        Some(cur) => amount_near_currency(&flat, cur),
        None => None,
    }
    .or_else(|| {
        LABELLED_AMOUNT
            .captures(&flat)
            .and_then(|c| normalize_number(&c[1]))
    });

    let total_kwh = KWH_AFTER
        .captures(&flat)
        .or_else(|| KWH_BEFORE.captures(&flat))
        .and_then(|c| normalize_number(&c[1]));

    let mut dates = DATE.captures_iter(&flat).map(|c| c[1].to_string());
    let period_start = dates.next();
    let period_end = dates.next();

    let provider = PROVIDER.captures(&flat).map(|c| {
        let found = &c[1];
        PROVIDERS
            .iter()
            .find(|p| p.eq_ignore_ascii_case(found))
            .map_or_else(|| found.to_string(), |p| p.to_string())
    });

    BillFields {
        provider,
        period_start,
        period_end,
        total_kwh,
        total_amount,
        currency,
    }
}

/// Number written right after or right before the currency marker
fn amount_near_currency(text: &str, currency: &str) -> Option<f64> {
    let cur = regex::escape(currency);
    let pattern = format!(
        r"(?i)(?:{cur}\s*([0-9][0-9.,]*))|(?:([0-9][0-9.,]*)\s*{cur})"
    );
    let re = Regex::new(&pattern).ok()?;
    let amount = re.captures_iter(text).find_map(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .and_then(|m| normalize_number(m.as_str()))
    });
    amount
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_number() {
        assert_eq!(normalize_number("12345"), Some(12345.0));
        assert_eq!(normalize_number("1234,5"), Some(1234.5));
        assert_eq!(normalize_number("1.234.567,8"), Some(1234567.8));
        assert_eq!(normalize_number("1,234.56"), Some(1234.56));
        assert_eq!(normalize_number("04512."), Some(4512.0));
        assert_eq!(normalize_number("..,"), None);
    }

    #[test]
    fn test_extract_meter_value_largest() {
        let text = "Serial 12-34\nkWh 0 4 5 1 2\nAB 2021";
        let best = extract_meter_value(text, DEFAULT_MIN_DIGITS, None).unwrap();
        assert_eq!(best.value, 4512.0);
        assert_eq!(best.raw, "04512");
        assert!(best.plausible);
    }

    #[test]
    fn test_extract_meter_value_ignores_short_numbers() {
        assert!(extract_meter_value("12 / 345 / 7", DEFAULT_MIN_DIGITS, None).is_none());
        assert!(extract_meter_value("", DEFAULT_MIN_DIGITS, None).is_none());
    }

    #[test]
    fn test_extract_meter_value_prefers_above_last() {
        let text = "reading 5120,4 ref 3300";
        let best = extract_meter_value(text, 4, Some(5000.0)).unwrap();
        assert_eq!(best.value, 5120.4);
        assert!(best.plausible);

        let below = extract_meter_value("3300", 4, Some(5000.0)).unwrap();
        assert_eq!(below.value, 3300.0);
        assert!(!below.plausible);
    }

    #[test]
    fn test_parse_bill_text_moroccan() {
        let text = "LYDEC Facture\nPériode 01/03/2025 - 31/03/2025\nConsommation 245 kWh\nMontant total : 312,45 DH";
        let fields = parse_bill_text(text);

        assert_eq!(fields.provider.as_deref(), Some("Lydec"));
        assert_eq!(fields.period_start.as_deref(), Some("01/03/2025"));
        assert_eq!(fields.period_end.as_deref(), Some("31/03/2025"));
        assert_eq!(fields.total_kwh, Some(245.0));
        assert_eq!(fields.currency.as_deref(), Some("DH"));
        assert_eq!(fields.total_amount, Some(312.45));
    }

    #[test]
    fn test_parse_bill_text_symbol_currency() {
        let fields = parse_bill_text("EDF\nkWh: 410\nTotal € 98,10");
        assert_eq!(fields.provider.as_deref(), Some("EDF"));
        assert_eq!(fields.currency.as_deref(), Some("€"));
        assert_eq!(fields.total_amount, Some(98.1));
        assert_eq!(fields.total_kwh, Some(410.0));
    }

    #[test]
    fn test_parse_bill_text_label_only() {
        let fields = parse_bill_text("Amount: 75.20");
        assert_eq!(fields.currency, None);
        assert_eq!(fields.total_amount, Some(75.2));
    }

    #[test]
    fn test_parse_bill_text_nothing() {
        assert!(parse_bill_text("blurry photo").is_empty());
    }
}
