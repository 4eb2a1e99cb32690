use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;

use crate::format::format_number;

/// Default CONVFMT/OFMT
pub const DEFAULT_NUMBER_FORMAT: &str = "%.6g";

/// A run-time value.
///
/// Run-time strings (fields, `getline`, `split` pieces, `-v` assignments,
/// external function results, string literals and concatenation results)
/// are classified once on creation: if the whole text looks like a number
/// they become [`Value::NumericString`] and take part in numeric
/// comparisons.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Never assigned: "" in string context, 0 in numeric context
    #[default]
    Uninitialized,
    Number(f64),
    String(String),
    /// Original text plus its numeric value
    NumericString(String, f64),
}

impl Value {
    /// Classify run-time text as [`Value::NumericString`] or [`Value::String`]
    pub fn from_string(s: String) -> Self {
        match parse_numeric_string(&s) {
            Some(n) => Value::NumericString(s, n),
            None => Value::String(s),
        }
    }

    #[inline]
    pub fn from_bool(b: bool) -> Self {
        Value::Number(f64::from(u8::from(b)))
    }

    /// Type a pre-assigned value: an integer, then a finite float, otherwise
    /// a plain string.
    pub fn infer(raw: &str) -> Self {
        let number = raw
            .parse::<i64>()
            .map(|n| n as f64)
            .ok()
            .or_else(|| raw.parse::<f64>().ok().filter(|n| n.is_finite()));
        match number {
            Some(n) => Value::NumericString(raw.to_string(), n),
            None => Value::String(raw.to_string()),
        }
    }

    /// Numbers and numeric strings are true when non-zero, strings when
    /// non-empty.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Uninitialized => false,
            Value::Number(n) | Value::NumericString(_, n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn to_number(&self) -> f64 {
        match self {
            Value::Uninitialized => 0.0,
            Value::Number(n) | Value::NumericString(_, n) => *n,
            Value::String(s) => parse_leading_number(s),
        }
    }

    /// String form, formatting non-integral numbers with `%.6g`
    #[inline]
    pub fn as_str(&self) -> Cow<'_, str> {
        self.to_str(DEFAULT_NUMBER_FORMAT)
    }

    /// String form, formatting non-integral numbers with `format`
    /// (CONVFMT or OFMT)
    pub fn to_str(&self, format: &str) -> Cow<'_, str> {
        match self {
            Value::Uninitialized => Cow::Borrowed(""),
            Value::Number(n) => Cow::Owned(format_number(*n, format)),
            Value::String(s) | Value::NumericString(s, _) => Cow::Borrowed(s),
        }
    }

    /// Whether this value takes the numeric side of a comparison
    #[inline]
    pub fn compares_numerically(&self) -> bool {
        !matches!(self, Value::String(_))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_str())
    }
}

/// Numeric when both sides compare numerically, otherwise by string bytes
pub fn compare_values(left: &Value, right: &Value) -> Ordering {
    if left.compares_numerically() && right.compares_numerically() {
        left.to_number()
            .partial_cmp(&right.to_number())
            .unwrap_or(Ordering::Equal)
    } else {
        left.as_str().cmp(&right.as_str())
    }
}

/// Length of the decimal number at the start of `s` (optional sign, digits
/// with an optional fraction, optional exponent). Zero if there is none.
pub(crate) fn numeric_prefix_len(s: &str) -> usize {
    let bytes = s.as_bytes();
    let digits_from = |mut i: usize| {
        while bytes.get(i).is_some_and(u8::is_ascii_digit) {
            i += 1;
        }
        i
    };

    let mut end = usize::from(matches!(bytes.first(), Some(b'+' | b'-')));
    let int_end = digits_from(end);
    let mut mantissa_digits = int_end - end;
    end = int_end;
    if bytes.get(end) == Some(&b'.') {
        let frac_end = digits_from(end + 1);
        mantissa_digits += frac_end - end - 1;
        end = frac_end;
    }
    if mantissa_digits == 0 {
        return 0;
    }

    if matches!(bytes.get(end), Some(b'e' | b'E')) {
        let sign = usize::from(matches!(bytes.get(end + 1), Some(b'+' | b'-')));
        let exp_end = digits_from(end + 1 + sign);
        if exp_end > end + 1 + sign {
            end = exp_end;
        }
    }
    end
}

/// Numeric value of the leading number in `s` after leading whitespace:
/// `"42abc"` is 42, `"abc"` is 0.
pub fn parse_leading_number(s: &str) -> f64 {
    let s = s.trim_start();
    let len = numeric_prefix_len(s);
    s[..len].parse().unwrap_or(0.0)
}

/// `Some` when all of `s`, ignoring surrounding blanks and newlines, is a
/// decimal number.
fn parse_numeric_string(s: &str) -> Option<f64> {
    let trimmed = s.trim_matches([' ', '\t', '\n']);
    let len = numeric_prefix_len(trimmed);
    if len == 0 || len != trimmed.len() {
        return None;
    }
    trimmed.parse().ok()
}
