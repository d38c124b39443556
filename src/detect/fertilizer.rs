use std::collections::HashSet;
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use super::result::Detection;

/// Multiplier used to turn a per-acre dose into a per-hectare dose.
pub const ACRES_PER_HECTARE: f64 = 2.47;

const RANGE_SEPARATORS: [char; 3] = ['-', '\u{2013}', '\u{2014}'];

/// One row of the fertilizer recommendation table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FertilizerRecord {
    pub name: String,
    pub quantity: String,
    pub frequency: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

/// Collapse per-detection treatments into one record per treatment name.
///
/// The first detection carrying a given name decides quantity, frequency and
/// type. Output keeps first-seen order.
pub fn dedup_treatments(detections: &[Detection]) -> Vec<FertilizerRecord> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for treatment in detections.iter().filter_map(|d| d.treatment.as_ref()) {
        if !seen.insert(treatment.name.clone()) {
            continue;
        }
        records.push(FertilizerRecord {
            name: treatment.name.clone(),
            quantity: treatment.quantity.clone(),
            frequency: treatment.frequency.clone(),
            kind: treatment.kind.clone(),
        });
    }
    records
}

fn acre_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(\d+(?:\.\d+)?(?:[-\x{2013}\x{2014}]\d+(?:\.\d+)?)?)\s*(kg|g|l|ml)\s*per\s*acre")
            .expect("acre pattern is a valid regex")
    })
}

/// Rewrite every `<amount> <unit> per acre` in `quantity` as a per-hectare dose.
///
/// Amounts may be a single number or a range (`0.5-1.0`, `0.5–1.0`); the
/// separator and the unit's spelling are kept as written. Anything that
/// doesn't match is returned untouched.
pub fn convert_to_hectare(quantity: &str) -> String {
    acre_pattern()
        .replace_all(quantity, |caps: &Captures| {
            let amount = &caps[1];
            let unit = &caps[2];
            let converted = match amount.chars().find(|c| RANGE_SEPARATORS.contains(c)) {
                Some(sep) => amount
                    .split(sep)
                    .map(|part| scale(part.trim()))
                    .collect::<Vec<_>>()
                    .join(&sep.to_string()),
                None => scale(amount),
            };
            format!("{converted} {unit} per hectare")
        })
        .into_owned()
}

fn scale(amount: &str) -> String {
    // The pattern only captures digits and dots, so parsing cannot fail.
    let value: f64 = amount.parse().unwrap_or(0.0);
    format!("{:.1}", value * ACRES_PER_HECTARE)
}
