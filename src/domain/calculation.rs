//! Input parsing and cache-key canonicalisation for sum requests.

use serde_json::Value;

use super::error::DomainError;

/// Largest integer magnitude an `f64` represents exactly (2^53).
pub const MAX_EXACT_INTEGER: f64 = 9_007_199_254_740_992.0;

const KEY_SEPARATOR: char = ':';
const PLAIN_DECIMAL_MIN: f64 = 1e-6;
const PLAIN_DECIMAL_MAX: f64 = 1e21;

/// Two validated, finite operands.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputPair {
    pub num1: f64,
    pub num2: f64,
}

impl InputPair {
    pub fn new(num1: f64, num2: f64) -> Result<Self, DomainError> {
        let num1 = ensure_finite("num1", num1)?;
        let num2 = ensure_finite("num2", num2)?;
        if !(num1 + num2).is_finite() {
            return Err(DomainError::validation(
                "sum of num1 and num2 exceeds the representable range",
            ));
        }
        Ok(Self { num1, num2 })
    }

    /// Parse both operands from loosely typed JSON request fields.
    ///
    /// `None` is an absent field and is rejected. Present values go through
    /// numeric coercion; objects, unparsable strings and non-finite results
    /// are rejected.
    pub fn from_json(num1: Option<&Value>, num2: Option<&Value>) -> Result<Self, DomainError> {
        let num1 = parse_number("num1", num1)?;
        let num2 = parse_number("num2", num2)?;
        Self::new(num1, num2)
    }

    pub fn sum(&self) -> f64 {
        self.num1 + self.num2
    }

    /// Cache key for this pair: both operands in canonical form joined by `:`.
    pub fn cache_key(&self) -> String {
        format!(
            "{}{KEY_SEPARATOR}{}",
            canonical_number(self.num1),
            canonical_number(self.num2)
        )
    }
}

fn ensure_finite(field: &'static str, value: f64) -> Result<f64, DomainError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(DomainError::invalid_number(field, "value must be finite"))
    }
}

fn parse_number(field: &'static str, value: Option<&Value>) -> Result<f64, DomainError> {
    let value = value.ok_or_else(|| DomainError::invalid_number(field, "value is missing"))?;
    let parsed = coerce(value)
        .ok_or_else(|| DomainError::invalid_number(field, format!("`{value}` is not numeric")))?;
    ensure_finite(field, parsed)
}

/// Loose numeric coercion: `null` and blank strings are `0`, booleans are
/// `0`/`1`, strings may use `0x`/`0o`/`0b` integer prefixes, and an array
/// coerces through its only element. `None` means not a number.
fn coerce(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => coerce_str(raw),
        Value::Null => Some(0.0),
        Value::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
        Value::Array(items) => match items.as_slice() {
            [] => Some(0.0),
            [item] => coerce_element(item),
            _ => None,
        },
        Value::Object(_) => None,
    }
}

/// An array element is coerced through its text form, so `null` reads as
/// blank and booleans stay non-numeric.
fn coerce_element(item: &Value) -> Option<f64> {
    match item {
        Value::Null => Some(0.0),
        Value::Bool(_) | Value::Object(_) => None,
        other => coerce(other),
    }
}

fn coerce_str(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(0.0);
    }

    let radix = match trimmed.get(..2) {
        Some("0x" | "0X") => Some(16),
        Some("0o" | "0O") => Some(8),
        Some("0b" | "0B") => Some(2),
        _ => None,
    };
    match radix {
        Some(radix) => parse_radix(&trimmed[2..], radix),
        None => trimmed.parse::<f64>().ok(),
    }
}

fn parse_radix(digits: &str, radix: u32) -> Option<f64> {
    if digits.is_empty() {
        return None;
    }
    digits.chars().try_fold(0.0_f64, |acc, ch| {
        ch.to_digit(radix)
            .map(|digit| acc * f64::from(radix) + f64::from(digit))
    })
}

/// Render a finite number in the canonical form used for cache keys and values.
///
/// `-0` collapses to `0`, exact integers print without a fraction, moderate
/// magnitudes use the shortest round-trip decimal and the rest use the shortest
/// round-trip exponent form.
pub fn canonical_number(value: f64) -> String {
    let value = if value == 0.0 { 0.0 } else { value };
    let magnitude = value.abs();

    if value.fract() == 0.0 && magnitude < MAX_EXACT_INTEGER {
        format!("{}", value as i64)
    } else if (PLAIN_DECIMAL_MIN..PLAIN_DECIMAL_MAX).contains(&magnitude) {
        format!("{value}")
    } else {
        format!("{value:e}")
    }
}
