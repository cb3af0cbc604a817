//! # Monetary Amounts
//!
//! All value on the chain is a `u128` count of base units; one whole TAG
//! is 10^18 base units. No floating point anywhere near money.
//!
//! ## The decimal-string convention
//!
//! JSON numbers stop being exact past 2^53, and u128 values sail far past
//! that. Every persisted 128-bit amount therefore serializes as a decimal
//! *string* (`"12300000000000000000"`) and is re-promoted to `u128` on
//! read. The [`serde_string`] module implements the convention; annotate
//! amount fields with `#[serde(with = "amount::serde_string")]`.

use serde::{Deserialize, Deserializer, Serializer};

use crate::config::{UNITS_PER_TAG, UNIT_DECIMALS};

/// Base-unit amount. 128 bits: enough for the full supply at 18 decimals
/// with ~10^21 of headroom.
pub type Units = u128;

/// Serde adapter enforcing the decimal-string convention for `u128`.
pub mod serde_string {
    use super::*;

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<u128>().map_err(serde::de::Error::custom)
    }
}

/// Convert whole TAG to base units. Panics on overflow, which cannot occur
/// for any amount below ~3.4 × 10^20 whole TAG.
pub fn tag_to_units(whole: u128) -> Units {
    whole * UNITS_PER_TAG
}

/// Render base units as an 18-decimal display string, e.g. `"1.500000000000000000"`.
pub fn to_display(units: Units) -> String {
    let whole = units / UNITS_PER_TAG;
    let frac = units % UNITS_PER_TAG;
    format!("{whole}.{frac:0>width$}", width = UNIT_DECIMALS as usize)
}

/// Parse an 18-decimal display string back to base units.
///
/// Accepts a bare integer (`"5"`) or a dotted form with at most 18
/// fractional digits (`"5.25"`). Anything else is `None`.
pub fn from_display(text: &str) -> Option<Units> {
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() || frac.len() > UNIT_DECIMALS as usize {
        return None;
    }
    let whole: u128 = whole.parse().ok()?;
    let frac_units: u128 = if frac.is_empty() {
        0
    } else {
        // Right-pad the fraction to 18 digits: "25" -> 250000000000000000.
        let padded = format!("{frac:0<width$}", width = UNIT_DECIMALS as usize);
        padded.parse().ok()?
    };
    whole
        .checked_mul(UNITS_PER_TAG)
        .and_then(|w| w.checked_add(frac_units))
}
