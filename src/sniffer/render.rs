//! printf-style rendering of rule messages
//!
//! A message may carry conversions such as `%d`, `%#x` or `%s`; each one is
//! replaced by the value the rule read from the input.

use chrono::{DateTime, Local};

use crate::magic::DateStyle;

const DATE_FORMAT: &str = "%a %b %e %H:%M:%S %Y";

/// Upper bound for a conversion's width and precision
const FIELD_LIMIT: usize = 1024;

/// Value read by a matching test, as seen by message conversions
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Value {
    None,
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Date { seconds: i64, style: DateStyle },
}

impl Value {
    fn as_i64(&self) -> i64 {
        match self {
            Value::Unsigned(value) => *value as i64,
            Value::Signed(value) => *value,
            Value::Float(value) => *value as i64,
            Value::Date { seconds, .. } => *seconds,
            Value::Bytes(bytes) => bytes.first().copied().map(i64::from).unwrap_or(0),
            Value::None => 0,
        }
    }

    fn as_u64(&self) -> u64 {
        match self {
            Value::Unsigned(value) => *value,
            other => other.as_i64() as u64,
        }
    }

    fn as_f64(&self) -> f64 {
        match self {
            Value::Float(value) => *value,
            Value::Unsigned(value) => *value as f64,
            other => other.as_i64() as f64,
        }
    }
}

#[derive(Debug, Default)]
struct Conversion {
    left: bool,
    plus: bool,
    space: bool,
    alternate: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
    kind: char,
}

/// Renders `template`, substituting every conversion with `value`
pub(crate) fn render(template: &str, value: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Conversion::default();
        let mut raw = String::from('%');
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alternate = true,
                '0' => spec.zero = true,
                _ => break,
            }
            raw.push(flag);
            chars.next();
        }
        while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width.saturating_mul(10).saturating_add(digit as usize);
            raw.push(chars.next().unwrap_or('0'));
        }
        spec.width = spec.width.min(FIELD_LIMIT);
        if chars.peek() == Some(&'.') {
            raw.push('.');
            chars.next();
            let mut precision = 0usize;
            while let Some(digit) = chars.peek().and_then(|c| c.to_digit(10)) {
                precision = precision.saturating_mul(10).saturating_add(digit as usize);
                raw.push(chars.next().unwrap_or('0'));
            }
            spec.precision = Some(precision.min(FIELD_LIMIT));
        }
        while let Some(&modifier) = chars.peek() {
            if !matches!(modifier, 'h' | 'l' | 'L' | 'q' | 'j' | 'z' | 't') {
                break;
            }
            raw.push(modifier);
            chars.next();
        }

        match chars.next() {
            Some('%') => out.push('%'),
            Some(kind @ ('d' | 'i' | 'u' | 'x' | 'X' | 'o' | 'c' | 's' | 'e' | 'E' | 'f' | 'F' | 'g' | 'G')) => {
                spec.kind = kind;
                out.push_str(&convert(&spec, value));
            }
            Some(other) => {
                out.push_str(&raw);
                out.push(other);
            }
            None => out.push_str(&raw),
        }
    }
    out
}

fn convert(spec: &Conversion, value: &Value) -> String {
    let (sign, prefix, body, numeric) = match spec.kind {
        'd' | 'i' => {
            let number = value.as_i64();
            let sign = if number < 0 {
                "-"
            } else if spec.plus {
                "+"
            } else if spec.space {
                " "
            } else {
                ""
            };
            let digits = with_precision(number.unsigned_abs().to_string(), spec.precision);
            (sign, "", digits, true)
        }
        'u' => ("", "", with_precision(value.as_u64().to_string(), spec.precision), true),
        'x' | 'X' => {
            let number = value.as_u64();
            let mut digits = with_precision(format!("{number:x}"), spec.precision);
            let mut prefix = if spec.alternate && number != 0 { "0x" } else { "" };
            if spec.kind == 'X' {
                digits = digits.to_ascii_uppercase();
                if !prefix.is_empty() {
                    prefix = "0X";
                }
            }
            ("", prefix, digits, true)
        }
        'o' => {
            let number = value.as_u64();
            let digits = with_precision(format!("{number:o}"), spec.precision);
            let prefix = if spec.alternate && !digits.starts_with('0') { "0" } else { "" };
            ("", prefix, digits, true)
        }
        'c' => {
            let byte = value.as_u64() as u8;
            ("", "", escape(&[byte]), false)
        }
        's' => {
            let mut text = match value {
                Value::Bytes(bytes) => escape(bytes),
                Value::Date { seconds, style } => format_date(*seconds, *style),
                Value::Float(number) => format_general(*number, None, false),
                Value::Signed(number) => number.to_string(),
                Value::Unsigned(number) => number.to_string(),
                Value::None => String::new(),
            };
            if let Some(precision) = spec.precision {
                text = text.chars().take(precision).collect();
            }
            ("", "", text, false)
        }
        _ => {
            let number = value.as_f64();
            let sign = if number.is_sign_negative() {
                "-"
            } else if spec.plus {
                "+"
            } else if spec.space {
                " "
            } else {
                ""
            };
            let magnitude = number.abs();
            let body = match spec.kind {
                'e' | 'E' => format_exponent(magnitude, spec.precision.unwrap_or(6)),
                'g' | 'G' => format_general(magnitude, spec.precision, spec.alternate),
                _ => format!("{:.*}", spec.precision.unwrap_or(6), magnitude),
            };
            let body = if spec.kind.is_ascii_uppercase() {
                body.to_ascii_uppercase()
            } else {
                body
            };
            (sign, "", body, true)
        }
    };

    pad(spec, sign, prefix, &body, numeric)
}

fn with_precision(digits: String, precision: Option<usize>) -> String {
    match precision {
        Some(precision) if digits.len() < precision => {
            format!("{}{}", "0".repeat(precision - digits.len()), digits)
        }
        _ => digits,
    }
}

fn pad(spec: &Conversion, sign: &str, prefix: &str, body: &str, numeric: bool) -> String {
    let len = sign.len() + prefix.len() + body.chars().count();
    let fill = spec.width.saturating_sub(len);
    if fill == 0 {
        return format!("{sign}{prefix}{body}");
    }
    if spec.left {
        format!("{sign}{prefix}{body}{}", " ".repeat(fill))
    } else if spec.zero && numeric && (spec.precision.is_none() || "eEfFgG".contains(spec.kind)) {
        format!("{sign}{prefix}{}{body}", "0".repeat(fill))
    } else {
        format!("{}{sign}{prefix}{body}", " ".repeat(fill))
    }
}

/// C-style `%e`: two-digit signed exponent
fn format_exponent(number: f64, precision: usize) -> String {
    let rust = format!("{number:.precision$e}");
    match rust.split_once('e') {
        Some((mantissa, exponent)) => {
            let exponent: i32 = exponent.parse().unwrap_or(0);
            let sign = if exponent < 0 { '-' } else { '+' };
            format!("{mantissa}e{sign}{:02}", exponent.unsigned_abs())
        }
        None => rust,
    }
}

/// C-style `%g`: shortest of `%e` and `%f`, trailing zeros removed
fn format_general(number: f64, precision: Option<usize>, alternate: bool) -> String {
    if !number.is_finite() {
        return number.to_string();
    }
    let precision = match precision {
        Some(0) => 1,
        Some(precision) => precision,
        None => 6,
    };

    let probe = format!("{:.*e}", precision - 1, number);
    let exponent: i64 = probe
        .split_once('e')
        .and_then(|(_, exponent)| exponent.parse().ok())
        .unwrap_or(0);

    let text = if exponent < -4 || exponent >= precision as i64 {
        format_exponent(number, precision - 1)
    } else {
        let decimals = (precision as i64 - 1 - exponent).max(0) as usize;
        format!("{number:.decimals$}")
    };

    if alternate {
        return text;
    }
    match text.split_once('e') {
        Some((mantissa, exponent)) => format!("{}e{exponent}", trim_fraction(mantissa)),
        None => trim_fraction(&text).to_string(),
    }
}

fn trim_fraction(text: &str) -> &str {
    if text.contains('.') {
        text.trim_end_matches('0').trim_end_matches('.')
    } else {
        text
    }
}

fn format_date(seconds: i64, style: DateStyle) -> String {
    match DateTime::from_timestamp(seconds, 0) {
        Some(utc) => match style {
            DateStyle::Utc => utc.format(DATE_FORMAT).to_string(),
            DateStyle::Local => utc.with_timezone(&Local).format(DATE_FORMAT).to_string(),
        },
        None => "*Invalid date*".to_string(),
    }
}

/// Printable ASCII passes through; anything else becomes `\ooo`
pub(crate) fn escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    for &byte in bytes {
        if (0x20..0x7f).contains(&byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("\\{byte:03o}"));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_conversions() {
        assert_eq!(render("%d x", &Value::Unsigned(640)), "640 x");
        assert_eq!(render("%02d", &Value::Unsigned(1)), "01");
        assert_eq!(render("%#x", &Value::Unsigned(1)), "0x1");
        assert_eq!(render("%X", &Value::Unsigned(0xab)), "AB");
        assert_eq!(render("%o", &Value::Unsigned(8)), "10");
        assert_eq!(render("%d", &Value::Signed(-5)), "-5");
        assert_eq!(render("%+d", &Value::Signed(5)), "+5");
        assert_eq!(render("%5d|", &Value::Unsigned(42)), "   42|");
        assert_eq!(render("%-5d|", &Value::Unsigned(42)), "42   |");
        assert_eq!(render("%ld", &Value::Unsigned(7)), "7");
    }

    #[test]
    fn test_char_and_string_conversions() {
        assert_eq!(render("version %c", &Value::Unsigned(b'7' as u64)), "version 7");
        assert_eq!(
            render("was \"%s\"", &Value::Bytes(b"a\x01b".to_vec())),
            "was \"a\\001b\""
        );
        assert_eq!(render("%.2s", &Value::Bytes(b"abcd".to_vec())), "ab");
    }

    #[test]
    fn test_float_conversions() {
        assert_eq!(render("%f", &Value::Float(1.5)), "1.500000");
        assert_eq!(render("%.1f", &Value::Float(2.34)), "2.3");
        assert_eq!(render("%e", &Value::Float(1500.0)), "1.500000e+03");
        assert_eq!(render("%g", &Value::Float(0.5)), "0.5");
        assert_eq!(render("%g", &Value::Float(1e10)), "1e+10");
    }

    #[test]
    fn test_percent_and_unknown_conversions() {
        assert_eq!(render("100%%", &Value::None), "100%");
        assert_eq!(render("50%y", &Value::None), "50%y");
        assert_eq!(render("trailing %", &Value::None), "trailing %");
    }

    #[test]
    fn test_oversized_fields_are_clamped() {
        let wide = render("%99999999999999999999d", &Value::Unsigned(7));
        assert_eq!(wide.len(), FIELD_LIMIT);
        assert!(wide.ends_with('7'));

        let precise = render("%.99999999999999999999f", &Value::Float(1.5));
        assert_eq!(precise.len(), 2 + FIELD_LIMIT);
        assert!(precise.starts_with("1.5"));

        let padded = render("%.99999999999999999999d", &Value::Unsigned(3));
        assert_eq!(padded.len(), FIELD_LIMIT);
    }

    #[test]
    fn test_utc_date() {
        let value = Value::Date {
            seconds: 0,
            style: DateStyle::Utc,
        };
        assert_eq!(render("%s", &value), "Thu Jan  1 00:00:00 1970");
    }
}
