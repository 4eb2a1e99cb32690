//! printf-style formatting shared by `printf`, `sprintf` and number-to-string
//! conversion (CONVFMT/OFMT).

use crate::value::Value;

/// Convert a number to its string form.
///
/// Integral values print without a decimal point; anything else goes through
/// `format` (normally CONVFMT or OFMT).
pub fn format_number(n: f64, format: &str) -> String {
    if n.is_nan() {
        return if n.is_sign_negative() { "-nan" } else { "nan" }.to_string();
    }
    if n.is_infinite() {
        return if n > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e16 {
        return format!("{}", n as i64);
    }
    sprintf(format, &[Value::Number(n)], format)
}

/// A parsed `%` conversion
#[derive(Debug, Default)]
struct Spec {
    left: bool,
    plus: bool,
    space: bool,
    alt: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Format `args` according to `format`.
///
/// Arguments are consumed left to right. A conversion with no argument left,
/// or an unknown conversion character, is copied to the output literally.
/// `convfmt` is used when a number is printed with `%s`.
pub fn sprintf(format: &str, args: &[Value], convfmt: &str) -> String {
    let mut result = String::with_capacity(format.len() + 16);
    let mut chars = format.char_indices().peekable();
    let mut arg_idx = 0;

    while let Some((start, ch)) = chars.next() {
        if ch != '%' {
            result.push(ch);
            continue;
        }

        if let Some(&(_, '%')) = chars.peek() {
            chars.next();
            result.push('%');
            continue;
        }

        let mut spec = Spec::default();

        while let Some(&(_, c)) = chars.peek() {
            match c {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                '0' => spec.zero = true,
                _ => break,
            }
            chars.next();
        }

        // Width
        if let Some(&(_, '*')) = chars.peek() {
            chars.next();
            let w = args.get(arg_idx).map(|v| v.to_number()).unwrap_or(0.0);
            arg_idx += 1;
            if w < 0.0 {
                spec.left = true;
            }
            spec.width = Some(w.abs() as usize);
        } else {
            spec.width = take_digits(&mut chars);
        }

        // Precision
        if let Some(&(_, '.')) = chars.peek() {
            chars.next();
            if let Some(&(_, '*')) = chars.peek() {
                chars.next();
                let p = args.get(arg_idx).map(|v| v.to_number()).unwrap_or(0.0);
                arg_idx += 1;
                spec.precision = (p >= 0.0).then_some(p as usize);
            } else {
                spec.precision = Some(take_digits(&mut chars).unwrap_or(0));
            }
        }

        let Some((conv_pos, conv)) = chars.next() else {
            result.push_str(&format[start..]);
            break;
        };
        let spec_text = &format[start..conv_pos + conv.len_utf8()];

        if conv == '%' {
            result.push_str(&pad(&spec, "", "%", false));
            continue;
        }

        if !matches!(
            conv,
            'c' | 'd' | 'i' | 'o' | 'x' | 'X' | 'u' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G' | 's'
        ) {
            result.push_str(spec_text);
            continue;
        }

        let Some(arg) = args.get(arg_idx) else {
            result.push_str(spec_text);
            continue;
        };
        arg_idx += 1;

        let formatted = match conv {
            's' => {
                let s = arg.to_str(convfmt);
                let s: String = match spec.precision {
                    Some(p) => s.chars().take(p).collect(),
                    None => s.into_owned(),
                };
                pad(&spec, "", &s, false)
            }
            'c' => {
                let s = match arg {
                    Value::Number(n) => char::from_u32(*n as u32)
                        .map(String::from)
                        .unwrap_or_default(),
                    other => other.as_str().chars().next().map(String::from).unwrap_or_default(),
                };
                pad(&spec, "", &s, false)
            }
            'd' | 'i' => format_signed(&spec, arg.to_number()),
            'o' | 'x' | 'X' | 'u' => format_unsigned(&spec, arg.to_number(), conv),
            _ => format_float(&spec, arg.to_number(), conv),
        };
        result.push_str(&formatted);
    }

    result
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::CharIndices<'_>>) -> Option<usize> {
    let mut value: Option<usize> = None;
    while let Some(&(_, c)) = chars.peek() {
        let Some(d) = c.to_digit(10) else { break };
        value = Some(value.unwrap_or(0).saturating_mul(10).saturating_add(d as usize));
        chars.next();
    }
    value
}

/// Apply width, justification and zero padding. Zeros go between the sign
/// (or radix prefix) and the digits.
fn pad(spec: &Spec, prefix: &str, body: &str, numeric: bool) -> String {
    let len = prefix.chars().count() + body.chars().count();
    let width = spec.width.unwrap_or(0);
    if len >= width {
        return format!("{}{}", prefix, body);
    }
    let fill = width - len;
    if spec.left {
        format!("{}{}{}", prefix, body, " ".repeat(fill))
    } else if spec.zero && numeric {
        format!("{}{}{}", prefix, "0".repeat(fill), body)
    } else {
        format!("{}{}{}", " ".repeat(fill), prefix, body)
    }
}

fn sign_prefix(spec: &Spec, negative: bool) -> &'static str {
    if negative {
        "-"
    } else if spec.plus {
        "+"
    } else if spec.space {
        " "
    } else {
        ""
    }
}

fn non_finite(spec: &Spec, n: f64, upper: bool) -> String {
    let body = match (n.is_nan(), upper) {
        (true, false) => "nan",
        (true, true) => "NAN",
        (false, false) => "inf",
        (false, true) => "INF",
    };
    pad(spec, sign_prefix(spec, n.is_sign_negative()), body, false)
}

fn format_signed(spec: &Spec, n: f64) -> String {
    if !n.is_finite() {
        return non_finite(spec, n, false);
    }
    let v = n.trunc() as i64;
    let mut digits = v.unsigned_abs().to_string();
    if let Some(p) = spec.precision {
        if p == 0 && v == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
        }
    }
    let numeric = spec.precision.is_none();
    pad(spec, sign_prefix(spec, v < 0), &digits, numeric)
}

fn format_unsigned(spec: &Spec, n: f64, conv: char) -> String {
    if !n.is_finite() {
        return non_finite(spec, n, conv == 'X');
    }
    let v = if n < 0.0 {
        n.trunc() as i64 as u64
    } else {
        n.trunc() as u64
    };
    let mut digits = match conv {
        'o' => format!("{:o}", v),
        'x' => format!("{:x}", v),
        'X' => format!("{:X}", v),
        _ => v.to_string(),
    };
    if let Some(p) = spec.precision {
        if p == 0 && v == 0 {
            digits.clear();
        } else if digits.len() < p {
            digits = format!("{}{}", "0".repeat(p - digits.len()), digits);
        }
    }
    let prefix = match conv {
        'x' if spec.alt && v != 0 => "0x",
        'X' if spec.alt && v != 0 => "0X",
        'o' if spec.alt && !digits.starts_with('0') => "0",
        _ => "",
    };
    pad(spec, prefix, &digits, spec.precision.is_none())
}

fn format_float(spec: &Spec, n: f64, conv: char) -> String {
    let upper = conv.is_ascii_uppercase();
    if !n.is_finite() {
        return non_finite(spec, n, upper);
    }
    let precision = spec.precision.unwrap_or(6);
    let magnitude = n.abs();
    let body = match conv {
        'f' | 'F' => fixed(magnitude, precision, spec.alt),
        'e' | 'E' => scientific(magnitude, precision, spec.alt, upper),
        _ => general(magnitude, precision, spec.alt, upper),
    };
    pad(spec, sign_prefix(spec, n < 0.0), &body, true)
}

fn fixed(x: f64, precision: usize, alt: bool) -> String {
    let mut s = format!("{:.*}", precision, x);
    if alt && precision == 0 {
        s.push('.');
    }
    s
}

/// C-style `%e`: mantissa, `e`, sign and at least two exponent digits.
fn scientific(x: f64, precision: usize, alt: bool, upper: bool) -> String {
    let (mantissa, exponent) = split_exponent(x, precision);
    let mut s = mantissa;
    if alt && precision == 0 {
        s.push('.');
    }
    let sign = if exponent < 0 { '-' } else { '+' };
    let e = if upper { 'E' } else { 'e' };
    format!("{}{}{}{:02}", s, e, sign, exponent.unsigned_abs())
}

fn split_exponent(x: f64, precision: usize) -> (String, i32) {
    let s = format!("{:.*e}", precision, x);
    match s.split_once('e') {
        Some((mantissa, exp)) => (mantissa.to_string(), exp.parse().unwrap_or(0)),
        None => (s, 0),
    }
}

/// `%g`: shortest of `%e`/`%f` per the C rules, trailing zeros removed
/// unless `#` is given.
fn general(x: f64, precision: usize, alt: bool, upper: bool) -> String {
    let p = precision.max(1);
    let exponent = if x == 0.0 { 0 } else { split_exponent(x, p - 1).1 };

    if exponent >= -4 && (exponent as i64) < p as i64 {
        let decimals = (p as i64 - 1 - exponent as i64).max(0) as usize;
        let s = fixed(x, decimals, alt);
        if alt { s } else { trim_fraction(&s).to_string() }
    } else {
        let s = scientific(x, p - 1, alt, upper);
        if alt {
            return s;
        }
        let marker = if upper { 'E' } else { 'e' };
        match s.split_once(marker) {
            Some((mantissa, exp)) => format!("{}{}{}", trim_fraction(mantissa), marker, exp),
            None => s,
        }
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}
