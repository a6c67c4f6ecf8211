//! Text-to-number coercion for measurement fields.
//!
//! Upstream exports are inconsistent about quoting numbers, so a fixed set of
//! fields is normalised before insert. [`Coercer::apply`] is pure: it reads
//! nothing but its arguments, which keeps per-record work safe to fan out.

use serde::Deserialize;

use crate::types::{FieldValue, Record};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NumericKind {
    /// Continuous measurement, stored as a float.
    Float,
    /// Percentage or count; only the leading digits are read.
    Integer,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoercionRule {
    pub field: String,
    pub kind: NumericKind,
}

impl CoercionRule {
    pub fn new(field: impl Into<String>, kind: NumericKind) -> Self {
        Self { field: field.into(), kind }
    }
}

/// What happened to a single record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CoercionStats {
    pub converted: usize,
    /// Fields whose text had no numeric prefix and now hold `NaN`.
    pub unparseable: usize,
}

impl std::ops::AddAssign for CoercionStats {
    fn add_assign(&mut self, rhs: Self) {
        self.converted += rhs.converted;
        self.unparseable += rhs.unparseable;
    }
}

#[derive(Debug, Clone, Default)]
pub struct Coercer {
    rules: Vec<CoercionRule>,
}

impl Coercer {
    pub fn new(rules: Vec<CoercionRule>) -> Self { Self { rules } }

    pub fn rules(&self) -> &[CoercionRule] { &self.rules }

    /// Converts every designated field that is present and textual. Absent
    /// fields stay absent and non-textual values are left alone.
    pub fn apply(&self, mut record: Record) -> (Record, CoercionStats) {
        let mut stats = CoercionStats::default();
        for rule in &self.rules {
            let Some(text) = record.get(&rule.field).and_then(FieldValue::as_text) else {
                continue;
            };
            let value = coerce_text(text, rule.kind);
            if matches!(value, FieldValue::Float(f) if f.is_nan()) {
                stats.unparseable += 1;
            } else {
                stats.converted += 1;
            }
            record.insert(rule.field.clone(), value);
        }
        (record, stats)
    }
}

/// Lenient parse: surrounding whitespace is ignored and the longest numeric
/// prefix wins (`"12.5 C"` is 12.5). No numeric prefix gives `NaN`.
///
/// Integer fields only take a sign and digits (`"65.7"` is 65, `"1e3"` is 1,
/// `".5"` has no prefix). A digit run too long for `i64` is kept as a float
/// rather than clamped.
pub fn coerce_text(text: &str, kind: NumericKind) -> FieldValue {
    let text = text.trim();
    match kind {
        NumericKind::Float => FieldValue::Float(numeric_prefix(text).unwrap_or(f64::NAN)),
        NumericKind::Integer => integer_prefix(text).unwrap_or(FieldValue::Float(f64::NAN)),
    }
}

fn integer_prefix(s: &str) -> Option<FieldValue> {
    let (negative, rest) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, rest) = match rest.get(..2) {
        Some("0x" | "0X") => (16, &rest[2..]),
        _ => (10, rest),
    };
    let end = rest.find(|c: char| !c.is_digit(radix)).unwrap_or(rest.len());
    let digits = &rest[..end];
    if digits.is_empty() {
        return None;
    }
    let signed = if negative { format!("-{}", digits) } else { digits.to_string() };
    if let Ok(value) = i64::from_str_radix(&signed, radix) {
        return Some(FieldValue::Int(value));
    }
    let magnitude = digits
        .chars()
        .filter_map(|c| c.to_digit(radix))
        .fold(0.0_f64, |acc, d| acc * f64::from(radix) + f64::from(d));
    Some(FieldValue::Float(if negative { -magnitude } else { magnitude }))
}

fn numeric_prefix(s: &str) -> Option<f64> {
    let bytes = s.as_bytes();
    let mut end = 0;
    if end < bytes.len() && (bytes[end] == b'+' || bytes[end] == b'-') {
        end += 1;
    }
    let digits_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - digits_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    // optional exponent, only taken when followed by at least one digit
    if end < bytes.len() && (bytes[end] == b'e' || bytes[end] == b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && (bytes[exp_end] == b'+' || bytes[exp_end] == b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }
    s[..end].parse::<f64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_nan(value: &FieldValue) -> bool {
        matches!(value, FieldValue::Float(f) if f.is_nan())
    }

    fn weather_coercer() -> Coercer {
        Coercer::new(vec![
            CoercionRule::new("temperature_c", NumericKind::Float),
            CoercionRule::new("humidity_percent", NumericKind::Integer),
            CoercionRule::new("wind_speed_kmh", NumericKind::Float),
            CoercionRule::new("precipitation_mm", NumericKind::Float),
        ])
    }

    #[test]
    fn textual_measurements_become_numbers() {
        let record: Record = [
            ("station_id", FieldValue::Text("A1".into())),
            ("temperature_c", FieldValue::Text("12.5".into())),
            ("humidity_percent", FieldValue::Text("65.7".into())),
            ("wind_speed_kmh", FieldValue::Text(" 30 ".into())),
        ]
        .into_iter()
        .collect();
        let (out, stats) = weather_coercer().apply(record);
        assert_eq!(out.get("temperature_c"), Some(&FieldValue::Float(12.5)));
        assert_eq!(out.get("humidity_percent"), Some(&FieldValue::Int(65)));
        assert_eq!(out.get("wind_speed_kmh"), Some(&FieldValue::Float(30.0)));
        assert_eq!(out.get("station_id"), Some(&FieldValue::Text("A1".into())));
        assert_eq!(out.get("precipitation_mm"), None);
        assert_eq!(stats, CoercionStats { converted: 3, unparseable: 0 });
    }

    #[test]
    fn numeric_values_pass_through() {
        let record: Record =
            [("temperature_c", FieldValue::Int(4)), ("humidity_percent", FieldValue::Float(50.5))]
                .into_iter()
                .collect();
        let (out, stats) = weather_coercer().apply(record.clone());
        assert_eq!(out, record);
        assert_eq!(stats, CoercionStats::default());
    }

    #[test]
    fn malformed_text_yields_nan_instead_of_failing() {
        let record: Record =
            [("precipitation_mm", FieldValue::Text("n/a".into()))].into_iter().collect();
        let (out, stats) = weather_coercer().apply(record);
        match out.get("precipitation_mm") {
            Some(FieldValue::Float(f)) => assert!(f.is_nan()),
            other => panic!("expected NaN, got {:?}", other),
        }
        assert_eq!(stats.unparseable, 1);
    }

    #[test]
    fn prefix_parsing_follows_lenient_number_rules() {
        assert_eq!(coerce_text("12.5 C", NumericKind::Float), FieldValue::Float(12.5));
        assert_eq!(coerce_text("-3", NumericKind::Integer), FieldValue::Int(-3));
        assert_eq!(coerce_text(".5", NumericKind::Float), FieldValue::Float(0.5));
        assert_eq!(coerce_text("1e3mm", NumericKind::Float), FieldValue::Float(1000.0));
        assert_eq!(coerce_text("7e", NumericKind::Float), FieldValue::Float(7.0));
        assert_eq!(coerce_text("-7.9", NumericKind::Integer), FieldValue::Int(-7));
        assert_eq!(coerce_text("1e3", NumericKind::Integer), FieldValue::Int(1));
        assert_eq!(coerce_text("0x1A", NumericKind::Integer), FieldValue::Int(26));
        assert!(is_nan(&coerce_text(".5", NumericKind::Integer)));
        assert!(is_nan(&coerce_text("-", NumericKind::Float)));
        assert!(is_nan(&coerce_text("", NumericKind::Integer)));
        assert!(is_nan(&coerce_text("0x", NumericKind::Integer)));
    }

    #[test]
    fn oversized_integers_are_not_clamped() {
        let value = coerce_text("99999999999999999999", NumericKind::Integer);
        assert!(matches!(value, FieldValue::Float(f) if f > 9.9e19));
        let max = coerce_text("9223372036854775807", NumericKind::Integer);
        assert_eq!(max, FieldValue::Int(i64::MAX));
    }

    #[test]
    fn same_input_same_output() {
        let coercer = weather_coercer();
        let record: Record =
            [("temperature_c", FieldValue::Text("21.25".into()))].into_iter().collect();
        assert_eq!(coercer.apply(record.clone()).0, coercer.apply(record).0);
    }
}
